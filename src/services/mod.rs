//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `zone_set` - Named polygons and point-in-zone lookup
//! - `classifier` - Transition classification between zone readings
//! - `state_store` - Per-vehicle state and transition history
//! - `processor` - Location event orchestration

pub mod classifier;
pub mod processor;
pub mod state_store;
pub mod zone_set;

// Re-export commonly used types
pub use classifier::classify;
pub use processor::{LocationEventProcessor, ProcessResult};
pub use state_store::{StateUpdate, VehicleStateStore};
pub use zone_set::{Zone, ZoneDefinition, ZoneLocator, ZoneSet};
