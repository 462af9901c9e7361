//! Transition audit - writes transition records to file
//!
//! Records are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::infra::Metrics;
use crate::io::audit_channel::AuditRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Audit writer for transitions
pub struct AuditWriter {
    file_path: String,
    metrics: Arc<Metrics>,
}

impl AuditWriter {
    pub fn new(file_path: &str, metrics: Arc<Metrics>) -> Self {
        info!(file_path = %file_path, "audit_initialized");
        Self { file_path: file_path.to_string(), metrics }
    }

    /// Drain the audit channel until shutdown or until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<AuditRecord>, mut shutdown: watch::Receiver<bool>) {
        info!(file_path = %self.file_path, "audit_writer_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let mut drained = 0usize;
                        while let Ok(record) = rx.try_recv() {
                            self.write_record(&record);
                            drained += 1;
                        }
                        info!(drained = %drained, "audit_writer_shutdown");
                        return;
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(record) => {
                            self.write_record(&record);
                        }
                        None => {
                            info!("audit_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Write one record to the audit file
    /// Returns true if successful, false otherwise
    pub fn write_record(&self, record: &AuditRecord) -> bool {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %record.event_id, error = %e, "audit_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                self.metrics.record_audit_written();
                true
            }
            Err(e) => {
                error!(
                    event_id = %record.event_id,
                    vehicle_id = %record.vehicle_id,
                    error = %e,
                    "audit_write_failed"
                );
                false
            }
        }
    }

    /// Append a line to the audit file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "audit_written");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coordinate, Transition, TransitionEvent, VehicleId, ZoneName};
    use crate::io::audit_channel::create_audit_channel;
    use std::fs;
    use tempfile::tempdir;

    fn entered_record(vehicle: &str, zone: &str) -> AuditRecord {
        let event = TransitionEvent::new(
            Transition::Entered { zone: ZoneName::new(zone) },
            Coordinate::new(5.0, 5.0).unwrap(),
            1_700_000_000_000,
        );
        AuditRecord::from_event("test-site", &VehicleId::from(vehicle), &event)
    }

    #[test]
    fn test_write_record() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let metrics = Arc::new(Metrics::new());
        let writer = AuditWriter::new(file_path.to_str().unwrap(), metrics.clone());

        let record = entered_record("truck-1", "Depot");
        assert!(writer.write_record(&record));
        assert_eq!(metrics.audit_written_total(), 1);

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["vehicle_id"], "truck-1");
        assert_eq!(parsed["kind"], "entered");
        assert_eq!(parsed["transition"], "ENTERED Depot");
        assert_eq!(parsed["zone"], "Depot");
        assert_eq!(parsed["site"], "test-site");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("transitions.jsonl");
        let writer = AuditWriter::new(nested_path.to_str().unwrap(), Arc::new(Metrics::new()));

        assert!(writer.write_record(&entered_record("truck-1", "Depot")));
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let writer = AuditWriter::new(file_path.to_str().unwrap(), Arc::new(Metrics::new()));
        let record = entered_record("truck-1", "Depot");
        writer.write_record(&record);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains(&record.event_id));
    }

    #[test]
    fn test_unwritable_path_fails() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let metrics = Arc::new(Metrics::new());
        let writer = AuditWriter::new(dir.path().to_str().unwrap(), metrics.clone());

        assert!(!writer.write_record(&entered_record("truck-1", "Depot")));
        assert_eq!(metrics.audit_written_total(), 0);
    }

    #[tokio::test]
    async fn test_run_drains_on_shutdown() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let writer = AuditWriter::new(file_path.to_str().unwrap(), Arc::new(Metrics::new()));

        let (sender, rx) = create_audit_channel(16, "test-site".to_string());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let event = TransitionEvent::new(
            Transition::Entered { zone: ZoneName::new("Depot") },
            Coordinate::new(1.0, 1.0).unwrap(),
            1,
        );
        for i in 0..5 {
            assert!(sender.send_transition(&VehicleId(format!("truck-{i}")), &event));
        }

        let handle = tokio::spawn(writer.run(rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_dropped() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let writer = AuditWriter::new(file_path.to_str().unwrap(), Arc::new(Metrics::new()));

        let (sender, rx) = create_audit_channel(16, "test-site".to_string());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(writer.run(rx, shutdown_rx));
        let event = TransitionEvent::new(
            Transition::Exited { zone: ZoneName::new("Depot") },
            Coordinate::new(1.0, 1.0).unwrap(),
            1,
        );
        assert!(sender.send_transition(&VehicleId::from("truck-1"), &event));
        drop(sender);
        handle.await.unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
