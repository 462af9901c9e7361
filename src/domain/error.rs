//! Error types for the zone tracker

use crate::domain::types::VehicleId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Zone tracker error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Latitude or longitude outside the valid WGS84 range
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// No location event has been seen for this vehicle
    #[error("vehicle not found: {0}")]
    VehicleNotFound(VehicleId),

    /// Zone definitions are malformed; fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unexpected failure while updating state; the cause is logged, not carried
    #[error("internal processing error")]
    InternalProcessing,
}

/// Failure reported by a zone lookup backend
#[derive(Debug, Clone, thiserror::Error)]
#[error("zone lookup failed: {0}")]
pub struct LookupError(pub String);
