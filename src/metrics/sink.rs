// src/metrics/sink.rs

//! Fire-and-forget front end of the metrics ledger.
//!
//! `record` only pushes onto an unbounded channel; a single background
//! writer task drains it and appends to the store on the blocking pool.
//! Store failures are logged and the record is dropped.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::errors::{PlaygateError, Result};
use crate::metrics::aggregate::MetricsSummary;
use crate::metrics::record::MetricRecord;
use crate::metrics::store::MetricsStore;

enum SinkMessage {
    Record(MetricRecord),
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle shared by every runner and session.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
    store: Arc<dyn MetricsStore>,
}

impl fmt::Debug for MetricsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsSink")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MetricsSink {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn MetricsStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(rx, Arc::clone(&store)));
        Self { tx, store }
    }

    /// Queue a record. Never blocks and never fails the caller.
    pub fn record(&self, record: MetricRecord) {
        debug!(
            target_name = %record.target,
            action = %record.action,
            outcome = %record.outcome,
            duration_secs = record.duration_seconds,
            "queueing metric record"
        );
        if self.tx.send(SinkMessage::Record(record)).is_err() {
            warn!("metrics writer is gone; dropping record");
        }
    }

    /// Wait until every record queued before this call reached the store.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(SinkMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Read-side reducer over the whole ledger.
    pub async fn aggregate(&self) -> Result<MetricsSummary> {
        self.flush().await;
        let store = Arc::clone(&self.store);
        let records = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| PlaygateError::Metrics(format!("metrics load task failed: {e}")))??;
        Ok(MetricsSummary::from_records(&records))
    }
}

async fn writer_loop(mut rx: mpsc::UnboundedReceiver<SinkMessage>, store: Arc<dyn MetricsStore>) {
    debug!("metrics writer started");

    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Record(record) => {
                let store = Arc::clone(&store);
                let joined = tokio::task::spawn_blocking(move || {
                    let res = store.append(&record);
                    (record, res)
                })
                .await;

                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((record, Err(e))) => {
                        warn!(
                            target_name = %record.target,
                            action = %record.action,
                            error = %e,
                            "failed to persist metric record; dropping it"
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "metrics append task panicked; dropping record");
                    }
                }
            }
            SinkMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    info!("metrics writer finished (all handles dropped)");
}
