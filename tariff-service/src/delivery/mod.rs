//! Batched delivery with partial-failure retries.
//!
//! Items go out in fixed-size batches, one batch at a time. When a sink
//! rejects part of a batch only the rejected entries are sent again; accepted
//! entries are never resubmitted.

mod http_queue;

use std::{collections::HashSet, fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::retry::{retry_with_state, RetryPolicy};

pub use http_queue::{FailedEntry, HttpQueueSink, QueueBatchResponse, QueueEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<T> {
    pub id: String,
    pub dedup_key: String,
    pub payload: T,
}

impl<T> WorkItem<T> {
    /// Number `(dedup_key, payload)` pairs as `msg-0`, `msg-1`, ...
    pub fn sequence<I>(items: I) -> Vec<WorkItem<T>>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (dedup_key, payload))| WorkItem {
                id: format!("msg-{i}"),
                dedup_key,
                payload,
            })
            .collect()
    }
}

/// What a sink did with a batch. An empty `rejected_ids` means every entry
/// was accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkResponse {
    pub rejected_ids: Vec<String>,
    pub reason: Option<String>,
}

impl SinkResponse {
    pub fn accepted() -> Self {
        Self::default()
    }

    pub fn rejected(ids: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            rejected_ids: ids,
            reason: Some(reason.into()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("{0}")]
    Exhausted(String),
}

#[async_trait::async_trait]
pub trait DeliverySink<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Prefix used when reporting entries that never got through.
    fn label(&self) -> &str {
        "Rejected entries"
    }

    /// A transport `Err` counts as the whole batch being rejected.
    async fn send_batch(&self, batch: &[WorkItem<T>]) -> Result<SinkResponse, DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Pause between batches.
    pub pacing: Option<Duration>,
}

impl DeliveryOptions {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            retry: RetryPolicy::default(),
            pacing: None,
        }
    }
}

struct BatchFailure {
    dedup_keys: Vec<String>,
    reason: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} entries pending)", self.reason, self.dedup_keys.len())
    }
}

pub async fn deliver<T, K>(items: Vec<WorkItem<T>>, options: &DeliveryOptions, sink: &K) -> Result<(), DeliveryError>
where
    T: Clone + Send + Sync,
    K: DeliverySink<T> + ?Sized,
{
    let batch_size = options.batch_size.max(1);
    let batches: Vec<Vec<WorkItem<T>>> = items.chunks(batch_size).map(|c| c.to_vec()).collect();
    let count = batches.len();

    for (index, batch) in batches.into_iter().enumerate() {
        tracing::debug!(batch = index + 1, of = count, entries = batch.len(), "delivering batch");
        deliver_batch(batch, options, sink).await?;

        if let Some(pacing) = options.pacing.filter(|_| index + 1 < count) {
            tokio::time::sleep(pacing).await;
        }
    }

    Ok(())
}

async fn deliver_batch<T, K>(batch: Vec<WorkItem<T>>, options: &DeliveryOptions, sink: &K) -> Result<(), DeliveryError>
where
    T: Clone + Send + Sync,
    K: DeliverySink<T> + ?Sized,
{
    let result = retry_with_state(&options.retry, "deliver batch", batch, move |batch: Vec<WorkItem<T>>| async move {
        metrics::counter!("delivery_batches_sent_total").increment(1);

        let response = match sink.send_batch(&batch).await {
            Ok(response) => response,
            Err(e) => {
                let dedup_keys = batch.iter().map(|w| w.dedup_key.clone()).collect();
                return Err((batch, BatchFailure { dedup_keys, reason: e.to_string() }));
            }
        };

        let rejected: HashSet<&str> = response.rejected_ids.iter().map(String::as_str).collect();
        let (residual, accepted): (Vec<WorkItem<T>>, Vec<WorkItem<T>>) =
            batch.into_iter().partition(|w| rejected.contains(w.id.as_str()));
        metrics::counter!("delivery_entries_accepted_total").increment(accepted.len() as u64);

        if residual.is_empty() {
            if !rejected.is_empty() {
                tracing::warn!(rejected = rejected.len(), "sink rejected ids that were not in the batch");
            }
            return Ok(());
        }

        let dedup_keys = residual.iter().map(|w| w.dedup_key.clone()).collect();
        let reason = response.reason.unwrap_or_else(|| sink.label().to_string());
        Err((residual, BatchFailure { dedup_keys, reason }))
    })
    .await;

    result.map_err(|failure| {
        metrics::counter!("delivery_exhausted_total").increment(1);
        tracing::error!(reason = %failure.reason, pending = failure.dedup_keys.len(), "batch delivery exhausted its retries");
        let label = sink.label();
        let keys = failure.dedup_keys.join(", ");
        if failure.reason == label {
            DeliveryError::Exhausted(format!("Batch retry triggered: {label}: {keys}"))
        } else {
            DeliveryError::Exhausted(format!("Batch retry triggered: {label}: {keys} ({})", failure.reason))
        }
    })
}
