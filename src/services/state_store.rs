//! Per-vehicle state and transition history
//!
//! Each vehicle owns a slot guarded by its own mutex. The outer map lock is
//! only held long enough to find or insert a slot, so updates for different
//! vehicles never wait on each other's classification work.
//!
//! Key behaviors:
//! - Read-classify-write for one vehicle runs entirely under its slot mutex
//! - Record and history are published together, readers never see one without the other
//! - Transition hooks run under the slot mutex, so their order matches history order
//! - Zone lookup runs before the slot is created, so a failed lookup leaves no trace
//! - Records are never removed during the process lifetime

use crate::domain::types::epoch_ms;
use crate::domain::{
    Coordinate, Error, LookupError, Result, TransitionEvent, VehicleId, VehicleRecord, ZoneName,
};
use crate::services::classifier::classify;
use crate::services::zone_set::ZoneLocator;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a single update
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// Record as published after this update
    pub record: VehicleRecord,
    /// Zone before this update (None for a first sighting or when outside)
    pub previous_zone: Option<ZoneName>,
    /// Transition appended to history, if any
    pub transition: Option<TransitionEvent>,
}

#[derive(Debug, Default)]
struct VehicleSlot {
    record: Option<VehicleRecord>,
    history: Vec<TransitionEvent>,
}

/// Concurrent vehicle state store
#[derive(Default)]
pub struct VehicleStateStore {
    slots: RwLock<FxHashMap<VehicleId, Arc<Mutex<VehicleSlot>>>>,
}

impl VehicleStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the zone for `coordinate`, classify against the vehicle's
    /// previous zone and publish the new record (and history entry)
    pub fn update_and_classify(
        &self,
        vehicle_id: &str,
        coordinate: Coordinate,
        zones: &dyn ZoneLocator,
    ) -> std::result::Result<StateUpdate, LookupError> {
        self.update_and_classify_with(vehicle_id, coordinate, zones, |_, _| {})
    }

    /// Same as [`update_and_classify`](Self::update_and_classify), calling
    /// `on_transition` while the vehicle's slot is still locked
    ///
    /// The hook must not block; it runs inside the per-vehicle critical section.
    pub fn update_and_classify_with<F>(
        &self,
        vehicle_id: &str,
        coordinate: Coordinate,
        zones: &dyn ZoneLocator,
        on_transition: F,
    ) -> std::result::Result<StateUpdate, LookupError>
    where
        F: FnOnce(&VehicleId, &TransitionEvent),
    {
        let current_zone = zones.locate(coordinate)?;

        let slot = self.slot(vehicle_id);
        let mut slot = slot.lock();

        let previous = slot.record.as_ref();
        let previous_zone = previous.and_then(|r| r.current_zone.clone());
        let report_count = previous.map_or(0, |r| r.report_count) + 1;

        let ts = epoch_ms();
        let transition = classify(previous_zone.as_ref(), current_zone.as_ref())
            .map(|t| TransitionEvent::new(t, coordinate, ts));

        if let Some(ref event) = transition {
            slot.history.push(event.clone());
        }

        let record = VehicleRecord {
            vehicle_id: VehicleId::from(vehicle_id),
            current_zone,
            last_coordinate: coordinate,
            last_transition: transition.clone(),
            report_count,
            updated_at: ts,
        };
        slot.record = Some(record.clone());

        if let Some(ref event) = transition {
            on_transition(&record.vehicle_id, event);
        }

        Ok(StateUpdate { record, previous_zone, transition })
    }

    /// Current record for a vehicle
    pub fn get(&self, vehicle_id: &str) -> Result<VehicleRecord> {
        self.existing_slot(vehicle_id)
            .and_then(|slot| {
                let slot = slot.lock();
                slot.record.clone()
            })
            .ok_or_else(|| Error::VehicleNotFound(VehicleId::from(vehicle_id)))
    }

    /// Transition history in the order transitions were applied; empty if unseen
    pub fn history(&self, vehicle_id: &str) -> Vec<TransitionEvent> {
        match self.existing_slot(vehicle_id) {
            Some(slot) => {
                let slot = slot.lock();
                slot.history.clone()
            }
            None => Vec::new(),
        }
    }

    /// All vehicles with a published record, sorted
    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        let slots: Vec<(VehicleId, Arc<Mutex<VehicleSlot>>)> =
            self.slots.read().iter().map(|(id, slot)| (id.clone(), slot.clone())).collect();

        let mut ids: Vec<VehicleId> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().record.is_some())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Number of vehicles ever seen
    pub fn vehicle_count(&self) -> usize {
        self.slots.read().len()
    }

    fn existing_slot(&self, vehicle_id: &str) -> Option<Arc<Mutex<VehicleSlot>>> {
        self.slots.read().get(vehicle_id).cloned()
    }

    /// Find or create the slot for a vehicle
    fn slot(&self, vehicle_id: &str) -> Arc<Mutex<VehicleSlot>> {
        if let Some(slot) = self.existing_slot(vehicle_id) {
            return slot;
        }

        let mut slots = self.slots.write();
        slots
            .entry(VehicleId::from(vehicle_id))
            .or_insert_with(|| {
                debug!(vehicle_id = %vehicle_id, "vehicle_registered");
                Arc::new(Mutex::new(VehicleSlot::default()))
            })
            .clone()
    }
}
