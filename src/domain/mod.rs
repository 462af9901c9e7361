//! Domain models - core types and error taxonomy
//!
//! This module contains the canonical data types used throughout the system:
//! - `Coordinate` - validated lat/lon position
//! - `Transition` - entered / exited / moved between zones
//! - `TransitionEvent` - one history entry
//! - `VehicleRecord` - latest known state of one vehicle
//! - `Error` - error kinds surfaced to callers

pub mod error;
pub mod types;

// Re-export commonly used types at module level
pub use error::{Error, LookupError, Result};
pub use types::{
    Coordinate, Transition, TransitionEvent, VehicleId, VehicleRecord, ZoneName, NO_TRANSITION,
    OUTSIDE_ZONES,
};
