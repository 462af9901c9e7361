//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `http` - HTTP API server (hyper)
//! - `audit_channel` - Typed channel for transition audit records
//! - `audit` - Transition audit output to file (JSONL format)
//! - `prometheus` - Prometheus text formatting for /metrics

pub mod audit;
pub mod audit_channel;
pub mod http;
pub mod prometheus;

// Re-export commonly used types
pub use audit::AuditWriter;
pub use audit_channel::{create_audit_channel, AuditRecord, AuditSender};
pub use http::{serve, start_http_server, AppState};
