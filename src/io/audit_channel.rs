//! Typed channel for transition audit records
//!
//! Provides a non-blocking way to hand transitions to the audit writer.
//! Uses a bounded mpsc channel to prevent unbounded memory growth; when the
//! writer falls behind, records are dropped rather than stalling requests.

use crate::domain::{Transition, TransitionEvent, VehicleId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One line of the transition audit log
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Site identifier
    pub site: String,
    /// History entry id (UUIDv7)
    pub event_id: String,
    pub vehicle_id: String,
    /// entered, exited or moved
    pub kind: &'static str,
    /// Human readable form, e.g. "MOVED from A to B"
    pub transition: String,
    /// Zone after the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_zone: Option<String>,
    pub lat: f64,
    pub lon: f64,
    /// Timestamp (epoch ms)
    pub ts: u64,
}

impl AuditRecord {
    pub fn from_event(site: &str, vehicle_id: &VehicleId, event: &TransitionEvent) -> Self {
        let (from_zone, to_zone) = match &event.transition {
            Transition::Entered { zone } => (None, Some(zone.to_string())),
            Transition::Exited { zone } => (Some(zone.to_string()), None),
            Transition::Moved { from, to } => (Some(from.to_string()), Some(to.to_string())),
        };

        Self {
            site: site.to_string(),
            event_id: event.event_id.clone(),
            vehicle_id: vehicle_id.to_string(),
            kind: event.transition.kind_str(),
            transition: event.transition.to_string(),
            zone: event.zone.as_ref().map(|z| z.to_string()),
            from_zone,
            to_zone,
            lat: event.coordinate.lat(),
            lon: event.coordinate.lon(),
            ts: event.ts,
        }
    }
}

/// Sender handle for audit records
#[derive(Clone)]
pub struct AuditSender {
    tx: mpsc::Sender<AuditRecord>,
    site_id: String,
}

impl AuditSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<AuditRecord>, site_id: String) -> Self {
        Self { tx, site_id }
    }

    /// Queue one transition for the audit log
    ///
    /// Returns false when the record was dropped (channel full or writer gone).
    pub fn send_transition(&self, vehicle_id: &VehicleId, event: &TransitionEvent) -> bool {
        let record = AuditRecord::from_event(&self.site_id, vehicle_id, event);
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }
}

/// Create an audit channel with the given buffer size
pub fn create_audit_channel(
    buffer_size: usize,
    site_id: String,
) -> (AuditSender, mpsc::Receiver<AuditRecord>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (AuditSender::new(tx, site_id), rx)
}
