//! Shared types for the zone tracker

use crate::domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Placeholder returned to callers when a vehicle is in no zone
pub const OUTSIDE_ZONES: &str = "Outside of known zones";

/// Placeholder returned to callers when an event produced no transition
pub const NO_TRANSITION: &str = "No transition";

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Newtype wrapper for vehicle identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl VehicleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VehicleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VehicleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Zone name, cheap to clone since every record and history entry carries one
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneName(Arc<str>);

impl ZoneName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZoneName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A validated WGS84 position
///
/// Construct with [`Coordinate::new`]; the fields are only readable so an
/// out-of-range value can never reach the zone lookup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    pub const LAT_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;
    pub const LON_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

    /// Validate and build a coordinate. Bounds are inclusive; NaN is rejected.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if Self::LAT_RANGE.contains(&lat) && Self::LON_RANGE.contains(&lon) {
            Ok(Self { lat, lon })
        } else {
            Err(Error::InvalidCoordinate { lat, lon })
        }
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// Kind of zone change between two consecutive location events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Entered { zone: ZoneName },
    Exited { zone: ZoneName },
    Moved { from: ZoneName, to: ZoneName },
}

impl Transition {
    /// Short machine-readable kind, used in audit records and metrics
    pub fn kind_str(&self) -> &'static str {
        match self {
            Transition::Entered { .. } => "entered",
            Transition::Exited { .. } => "exited",
            Transition::Moved { .. } => "moved",
        }
    }

    /// Zone the vehicle is in after this transition
    pub fn resulting_zone(&self) -> Option<&ZoneName> {
        match self {
            Transition::Entered { zone } => Some(zone),
            Transition::Exited { .. } => None,
            Transition::Moved { to, .. } => Some(to),
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Entered { zone } => write!(f, "ENTERED {zone}"),
            Transition::Exited { zone } => write!(f, "EXITED {zone}"),
            Transition::Moved { from, to } => write!(f, "MOVED from {from} to {to}"),
        }
    }
}

/// One entry of a vehicle's transition history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    /// UUIDv7, sortable by creation time
    pub event_id: String,
    pub transition: Transition,
    /// Zone after the transition (None on exit)
    pub zone: Option<ZoneName>,
    pub coordinate: Coordinate,
    /// Epoch ms
    pub ts: u64,
}

impl TransitionEvent {
    pub fn new(transition: Transition, coordinate: Coordinate, ts: u64) -> Self {
        let zone = transition.resulting_zone().cloned();
        Self { event_id: new_uuid_v7(), transition, zone, coordinate, ts }
    }
}

/// Latest known classification for one vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub vehicle_id: VehicleId,
    pub current_zone: Option<ZoneName>,
    pub last_coordinate: Coordinate,
    /// Transition produced by the most recent event, if that event produced one
    pub last_transition: Option<TransitionEvent>,
    /// Number of location events applied to this vehicle
    pub report_count: u64,
    /// Epoch ms of the most recent event
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds_inclusive() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_coordinate_out_of_range() {
        assert!(matches!(
            Coordinate::new(90.0001, 0.0),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            Coordinate::new(0.0, 180.0001),
            Err(Error::InvalidCoordinate { .. })
        ));
        assert!(Coordinate::new(-90.0001, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.0001).is_err());
    }

    #[test]
    fn test_coordinate_rejects_nan() {
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NAN).is_err());
        assert!(Coordinate::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_transition_display() {
        let a = ZoneName::new("A");
        let b = ZoneName::new("B");
        assert_eq!(Transition::Entered { zone: a.clone() }.to_string(), "ENTERED A");
        assert_eq!(Transition::Exited { zone: b.clone() }.to_string(), "EXITED B");
        assert_eq!(Transition::Moved { from: a, to: b }.to_string(), "MOVED from A to B");
    }

    #[test]
    fn test_transition_event_resulting_zone() {
        let coord = Coordinate::new(1.0, 2.0).unwrap();
        let entered = TransitionEvent::new(Transition::Entered { zone: "A".into() }, coord, 1);
        assert_eq!(entered.zone, Some(ZoneName::new("A")));

        let exited = TransitionEvent::new(Transition::Exited { zone: "A".into() }, coord, 2);
        assert_eq!(exited.zone, None);

        let moved = TransitionEvent::new(
            Transition::Moved { from: "A".into(), to: "B".into() },
            coord,
            3,
        );
        assert_eq!(moved.zone, Some(ZoneName::new("B")));
        assert_ne!(entered.event_id, moved.event_id);
    }

    #[test]
    fn test_transition_serializes_tagged() {
        let t = Transition::Moved { from: "A".into(), to: "B".into() };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"], "moved");
        assert_eq!(json["from"], "A");
        assert_eq!(json["to"], "B");
    }
}
