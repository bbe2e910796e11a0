use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Background task that persists audit events.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every [`AuditHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                subject: envelope.event.subject().map(String::from),
                backend: envelope.event.backend().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!(error = %e, event_type = %record.event_type, "Failed to write audit event");
            }
        }

        tracing::info!("Audit writer shutting down");
    }
}

/// Create the handle/writer pair.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; it exits once all
/// handle clones are gone, after flushing what was already sent.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter};

    struct MockStore {
        records: Mutex<Vec<AuditRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn get_records(&self) -> Vec<AuditRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditStore for MockStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.should_fail {
                return Err(AuditError::Database("Mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            let mut stored = record.clone();
            stored.id = id;
            records.push(stored);
            Ok(id)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn setup(store: &Arc<MockStore>) -> (AuditHandle, tokio::task::JoinHandle<()>) {
        let store_dyn: Arc<dyn AuditStore> = Arc::clone(store) as Arc<dyn AuditStore>;
        let (handle, writer) = create_audit_system(store_dyn, 100);
        (handle, tokio::spawn(writer.run()))
    }

    #[tokio::test]
    async fn test_writer_extracts_subject_and_backend() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = setup(&store);

        handle
            .emit(AuditEvent::ItemDispatched {
                fingerprint: "fp-1".to_string(),
                backend: "seedbox".to_string(),
                attempts: 2,
            })
            .await;
        drop(handle);
        writer.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "item_dispatched");
        assert_eq!(records[0].subject.as_deref(), Some("fp-1"));
        assert_eq!(records[0].backend.as_deref(), Some("seedbox"));
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::failing());
        let (handle, writer) = setup(&store);

        handle
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;
        drop(handle);

        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles_to_drop() {
        let store = Arc::new(MockStore::new());
        let (main_handle, writer) = setup(&store);
        let supervisor_handle = main_handle.clone();

        supervisor_handle
            .emit(AuditEvent::GovernorModeChanged {
                from: "normal".to_string(),
                to: "warning".to_string(),
                ratio: Some(1.05),
            })
            .await;
        main_handle
            .emit(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;

        drop(main_handle);
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(supervisor_handle);
        let result = tokio::time::timeout(tokio::time::Duration::from_secs(1), writer).await;
        assert!(result.is_ok(), "Writer should exit after all handles dropped");

        let records = store.get_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "governor_mode_changed");
        assert_eq!(records[1].event_type, "service_stopped");
    }
}
