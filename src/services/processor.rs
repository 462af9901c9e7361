//! Location event processing
//!
//! Validates a raw location report, runs it through the state store and
//! turns the outcome into the caller-facing result. Transitions fan out to
//! the structured log, the audit channel and metrics.

use crate::domain::{
    Coordinate, Error, Result, TransitionEvent, VehicleId, VehicleRecord, NO_TRANSITION,
    OUTSIDE_ZONES,
};
use crate::infra::Metrics;
use crate::io::audit_channel::AuditSender;
use crate::services::state_store::{StateUpdate, VehicleStateStore};
use crate::services::zone_set::ZoneLocator;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Caller-facing outcome of one location event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub vehicle_id: String,
    /// Zone name or "Outside of known zones"
    pub current_zone: String,
    /// Transition description or "No transition"
    pub transition: String,
}

impl ProcessResult {
    fn from_update(update: &StateUpdate) -> Self {
        Self {
            vehicle_id: update.record.vehicle_id.to_string(),
            current_zone: update
                .record
                .current_zone
                .as_ref()
                .map_or_else(|| OUTSIDE_ZONES.to_string(), |z| z.to_string()),
            transition: update
                .transition
                .as_ref()
                .map_or_else(|| NO_TRANSITION.to_string(), |e| e.transition.to_string()),
        }
    }
}

/// Processes location events against a zone set and a vehicle state store
pub struct LocationEventProcessor {
    zones: Arc<dyn ZoneLocator>,
    store: Arc<VehicleStateStore>,
    audit: Option<AuditSender>,
    metrics: Arc<Metrics>,
}

impl LocationEventProcessor {
    pub fn new(
        zones: Arc<dyn ZoneLocator>,
        store: Arc<VehicleStateStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { zones, store, audit: None, metrics }
    }

    /// Builder: forward transitions to the audit channel
    pub fn with_audit(mut self, audit: AuditSender) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Apply one location report for a vehicle
    pub fn process(&self, vehicle_id: &str, lat: f64, lon: f64) -> Result<ProcessResult> {
        let start = Instant::now();

        let coordinate = match Coordinate::new(lat, lon) {
            Ok(c) => c,
            Err(e) => {
                self.metrics.record_invalid_coordinate();
                debug!(vehicle_id = %vehicle_id, lat = %lat, lon = %lon, "invalid_coordinates");
                return Err(e);
            }
        };

        let zones = self.zones.as_ref();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.store.update_and_classify_with(vehicle_id, coordinate, zones, |id, event| {
                self.on_transition(id, event)
            })
        }));

        let update = match outcome {
            Ok(Ok(update)) => update,
            Ok(Err(e)) => {
                self.metrics.record_internal_error();
                error!(vehicle_id = %vehicle_id, error = %e, "location_processing_failed");
                return Err(Error::InternalProcessing);
            }
            Err(panic) => {
                self.metrics.record_internal_error();
                error!(
                    vehicle_id = %vehicle_id,
                    error = %panic_message(panic.as_ref()),
                    "location_processing_panicked"
                );
                return Err(Error::InternalProcessing);
            }
        };

        let result = ProcessResult::from_update(&update);
        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);

        debug!(
            vehicle_id = %result.vehicle_id,
            zone = %result.current_zone,
            transition = %result.transition,
            report_count = %update.record.report_count,
            latency_us = %latency_us,
            "location_processed"
        );

        Ok(result)
    }

    /// Runs under the vehicle's slot lock; log and audit order follow history order
    fn on_transition(&self, vehicle_id: &VehicleId, event: &TransitionEvent) {
        info!(
            vehicle_id = %vehicle_id,
            kind = %event.transition.kind_str(),
            transition = %event.transition,
            lat = %event.coordinate.lat(),
            lon = %event.coordinate.lon(),
            event_id = %event.event_id,
            "vehicle_transition"
        );
        self.metrics.record_transition(&event.transition);

        if let Some(ref audit) = self.audit {
            if audit.send_transition(vehicle_id, event) {
                self.metrics.record_audit_sent();
            } else {
                self.metrics.record_audit_dropped();
                warn!(vehicle_id = %vehicle_id, event_id = %event.event_id, "audit_record_dropped");
            }
        }
    }

    /// Current record for a vehicle
    pub fn vehicle(&self, vehicle_id: &str) -> Result<VehicleRecord> {
        self.store.get(vehicle_id).inspect_err(|_| {
            self.metrics.record_vehicle_not_found();
            warn!(vehicle_id = %vehicle_id, "vehicle_not_found");
        })
    }

    /// Transition history for a vehicle, oldest first
    pub fn history(&self, vehicle_id: &str) -> Vec<TransitionEvent> {
        self.store.history(vehicle_id)
    }

    /// All vehicles seen so far, sorted
    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        self.store.vehicle_ids()
    }

    pub fn tracked_vehicles(&self) -> usize {
        self.store.vehicle_count()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LookupError, ZoneName};
    use crate::io::audit_channel::create_audit_channel;
    use crate::services::zone_set::{ZoneDefinition, ZoneSet};

    fn square(name: &str, x0: f64, y0: f64, size: f64) -> ZoneDefinition {
        ZoneDefinition {
            name: name.to_string(),
            coordinates: vec![[x0, y0], [x0, y0 + size], [x0 + size, y0 + size], [x0 + size, y0]],
        }
    }

    fn processor() -> LocationEventProcessor {
        let zones = ZoneSet::from_definitions(vec![
            square("Depot", 0.0, 0.0, 10.0),
            square("Yard", 20.0, 20.0, 10.0),
        ])
        .unwrap();
        LocationEventProcessor::new(
            Arc::new(zones),
            Arc::new(VehicleStateStore::new()),
            Arc::new(Metrics::new()),
        )
    }

    struct FailingLocator;

    impl ZoneLocator for FailingLocator {
        fn locate(
            &self,
            _coordinate: Coordinate,
        ) -> std::result::Result<Option<ZoneName>, LookupError> {
            Err(LookupError("index unavailable".to_string()))
        }
    }

    struct PanickingLocator;

    impl ZoneLocator for PanickingLocator {
        fn locate(
            &self,
            _coordinate: Coordinate,
        ) -> std::result::Result<Option<ZoneName>, LookupError> {
            panic!("degenerate geometry")
        }
    }

    #[test]
    fn test_outside_placeholders() {
        let p = processor();
        let result = p.process("truck-1", 50.0, 50.0).unwrap();
        assert_eq!(result.vehicle_id, "truck-1");
        assert_eq!(result.current_zone, OUTSIDE_ZONES);
        assert_eq!(result.transition, NO_TRANSITION);
    }

    #[test]
    fn test_enter_move_exit() {
        let p = processor();

        let r = p.process("truck-1", 5.0, 5.0).unwrap();
        assert_eq!(r.current_zone, "Depot");
        assert_eq!(r.transition, "ENTERED Depot");

        let r = p.process("truck-1", 25.0, 25.0).unwrap();
        assert_eq!(r.current_zone, "Yard");
        assert_eq!(r.transition, "MOVED from Depot to Yard");

        let r = p.process("truck-1", 25.0, 25.0).unwrap();
        assert_eq!(r.transition, NO_TRANSITION);

        let r = p.process("truck-1", 50.0, 50.0).unwrap();
        assert_eq!(r.current_zone, OUTSIDE_ZONES);
        assert_eq!(r.transition, "EXITED Yard");

        assert_eq!(p.history("truck-1").len(), 3);
        assert_eq!(p.metrics().transitions_total(), 3);
        assert_eq!(p.metrics().events_total(), 4);
    }

    #[test]
    fn test_invalid_coordinates_leave_no_state() {
        let p = processor();
        assert!(matches!(
            p.process("truck-1", 91.0, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            p.process("truck-1", 0.0, -180.5),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            p.process("truck-1", f64::NAN, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(p.vehicle("truck-1"), Err(Error::VehicleNotFound(_))));
        assert_eq!(p.metrics().invalid_coordinates_total(), 3);
    }

    #[test]
    fn test_lookup_failure_is_internal_error() {
        let p = LocationEventProcessor::new(
            Arc::new(FailingLocator),
            Arc::new(VehicleStateStore::new()),
            Arc::new(Metrics::new()),
        );
        assert!(matches!(p.process("truck-1", 1.0, 1.0), Err(Error::InternalProcessing)));
        assert!(p.vehicle_ids().is_empty());
        assert_eq!(p.metrics().internal_errors_total(), 1);
    }

    #[test]
    fn test_panic_is_internal_error() {
        let p = LocationEventProcessor::new(
            Arc::new(PanickingLocator),
            Arc::new(VehicleStateStore::new()),
            Arc::new(Metrics::new()),
        );
        assert!(matches!(p.process("truck-1", 1.0, 1.0), Err(Error::InternalProcessing)));
        assert!(matches!(p.vehicle("truck-1"), Err(Error::VehicleNotFound(_))));

        // Processor stays usable after a caught panic
        assert!(matches!(p.process("truck-2", 1.0, 1.0), Err(Error::InternalProcessing)));
        assert_eq!(p.metrics().internal_errors_total(), 2);
    }

    #[test]
    fn test_transitions_reach_audit_channel() {
        let (sender, mut rx) = create_audit_channel(8, "site-1".to_string());
        let p = processor().with_audit(sender);

        p.process("truck-1", 5.0, 5.0).unwrap();
        p.process("truck-1", 5.0, 6.0).unwrap();
        p.process("truck-1", 50.0, 50.0).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.kind, "entered");
        assert_eq!(first.zone.as_deref(), Some("Depot"));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, "exited");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_audit_order_matches_history() {
        const N: usize = 24;
        let zones: Vec<ZoneDefinition> =
            (0..N).map(|i| square(&format!("Z{i}"), i as f64 * 2.0, 0.0, 1.0)).collect();
        let (sender, mut rx) = create_audit_channel(N, "site-1".to_string());
        let p = LocationEventProcessor::new(
            Arc::new(ZoneSet::from_definitions(zones).unwrap()),
            Arc::new(VehicleStateStore::new()),
            Arc::new(Metrics::new()),
        )
        .with_audit(sender);

        std::thread::scope(|s| {
            for i in 0..N {
                let p = &p;
                s.spawn(move || {
                    p.process("shared", 0.5, i as f64 * 2.0 + 0.5).unwrap();
                });
            }
        });

        let mut audited = Vec::with_capacity(N);
        while let Ok(record) = rx.try_recv() {
            audited.push(record.event_id);
        }
        let history: Vec<String> = p.history("shared").into_iter().map(|e| e.event_id).collect();
        assert_eq!(history.len(), N);
        assert_eq!(audited, history);
    }

    #[test]
    fn test_full_audit_channel_does_not_fail_processing() {
        let (sender, _rx) = create_audit_channel(1, "site-1".to_string());
        let p = processor().with_audit(sender);

        p.process("truck-1", 5.0, 5.0).unwrap();
        let r = p.process("truck-1", 25.0, 25.0).unwrap();
        assert_eq!(r.transition, "MOVED from Depot to Yard");
        assert_eq!(p.metrics().audit_dropped_total(), 1);
    }

    #[test]
    fn test_vehicle_read_side() {
        let p = processor();
        p.process("truck-b", 5.0, 5.0).unwrap();
        p.process("truck-a", 50.0, 50.0).unwrap();

        let record = p.vehicle("truck-b").unwrap();
        assert_eq!(record.current_zone, Some(ZoneName::new("Depot")));
        assert_eq!(record.report_count, 1);

        let ids: Vec<String> = p.vehicle_ids().into_iter().map(|v| v.0).collect();
        assert_eq!(ids, vec!["truck-a".to_string(), "truck-b".to_string()]);
        assert_eq!(p.tracked_vehicles(), 2);

        assert!(p.vehicle("truck-c").is_err());
        assert!(p.history("truck-c").is_empty());
    }
}
