use std::{net::SocketAddr, sync::Arc, time::SystemTime};

use axum::{extract::State, routing::post, Json, Router};
use futures::StreamExt;
use tariff_client::domain::DailyTariffQuote;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    delivery::{FailedEntry, QueueBatchResponse, QueueEntry},
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source, StoredKeys},
};

pub const QUEUE_PATH: &str = "/queue/daily-tariff";

#[derive(Clone)]
pub struct QueueState {
    tx: mpsc::Sender<Envelope<DailyTariffQuote>>,
    stored: StoredKeys,
}

/// Receives batches of daily tariff messages over HTTP and feeds them to the
/// pipeline through a bounded channel.
#[derive(Clone)]
pub struct HttpQueueSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<DailyTariffQuote>>>>>,
    stored: StoredKeys,
}

impl HttpQueueSource {
    /// Source plus the state its HTTP handler needs.
    pub fn channel(capacity: usize) -> (Self, QueueState) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stored = StoredKeys::default();
        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
            stored: stored.clone(),
        };
        (source, QueueState { tx, stored })
    }

    /// Keys the sink must record once a message's rows are stored.
    pub fn stored_keys(&self) -> StoredKeys {
        self.stored.clone()
    }

    pub fn router(state: QueueState) -> Router {
        Router::new().route(QUEUE_PATH, post(enqueue)).with_state(state)
    }

    pub async fn bind(bind_addr: &str, channel_capacity: usize) -> Result<Self, PipelineError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind queue listener: {e}")))?;

        let (source, state) = Self::channel(channel_capacity);
        let app = Self::router(state);

        tracing::info!(%addr, path = QUEUE_PATH, "queue source listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "queue source server error");
            }
        });

        Ok(source)
    }
}

#[async_trait::async_trait]
impl Source<DailyTariffQuote> for HttpQueueSource {
    async fn stream(&self) -> EnvelopeStream<DailyTariffQuote> {
        let stream: EnvelopeStream<DailyTariffQuote> = match self.receiver.lock().await.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok)),
            None => Box::pin(futures::stream::once(async {
                Err(PipelineError::Source("queue stream already taken".to_string()))
            })),
        };
        stream
    }
}

async fn enqueue(State(state): State<QueueState>, Json(entries): Json<Vec<QueueEntry>>) -> Json<QueueBatchResponse> {
    metrics::counter!("queue_requests_total").increment(1);
    Json(accept_batch(&state, entries))
}

/// Enqueue each entry without waiting. Entries whose dedup key is already
/// stored are acknowledged and dropped. A key that is only in flight is
/// enqueued again; the store upserts on the same keys.
pub fn accept_batch(state: &QueueState, entries: Vec<QueueEntry>) -> QueueBatchResponse {
    let mut failed = Vec::new();

    for entry in entries {
        if state.stored.contains(&entry.dedup_key) {
            tracing::debug!(dedup_key = %entry.dedup_key, "duplicate message dropped");
            metrics::counter!("queue_duplicates_total").increment(1);
            continue;
        }

        let payload: DailyTariffQuote = match serde_json::from_str(&entry.body) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "undecodable message body");
                failed.push(FailedEntry {
                    id: entry.id,
                    code: "InvalidMessageContents".to_string(),
                });
                continue;
            }
        };

        let env = Envelope {
            message_id: entry.id.clone(),
            dedup_key: entry.dedup_key.clone(),
            payload,
            received_at: SystemTime::now(),
        };

        match state.tx.try_send(env) {
            Ok(()) => metrics::counter!("queue_messages_accepted_total").increment(1),
            Err(TrySendError::Full(_)) => failed.push(FailedEntry {
                id: entry.id,
                code: "QueueFull".to_string(),
            }),
            Err(TrySendError::Closed(_)) => failed.push(FailedEntry {
                id: entry.id,
                code: "QueueClosed".to_string(),
            }),
        }
    }

    if !failed.is_empty() {
        metrics::counter!("queue_messages_failed_total").increment(failed.len() as u64);
    }
    QueueBatchResponse { failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tariff_client::domain::{ConsumptionInterval, QuoteDraft, RateWindow, TariffCandidate, TariffId};
    use time::macros::{date, datetime};

    fn entry(id: &str, dedup_key: &str) -> QueueEntry {
        let quote = QuoteDraft::new(
            date!(2025-03-01),
            TariffCandidate::by_id(TariffId::Go),
            "E-1R-GO-VAR-22-10-14-A",
            "GO-VAR-22-10-14",
        )
        .with_standing_charge(27.0)
        .with_rates(vec![RateWindow::new(
            datetime!(2025-03-01 00:00 UTC),
            datetime!(2025-03-02 00:00 UTC),
            20.0,
        )])
        .with_consumption(vec![ConsumptionInterval::new(datetime!(2025-03-01 00:30 UTC), 500.0)])
        .complete()
        .unwrap();

        QueueEntry {
            id: id.to_string(),
            group_id: "tariff-switcher".to_string(),
            dedup_key: dedup_key.to_string(),
            body: serde_json::to_string(&quote).unwrap(),
        }
    }

    #[tokio::test]
    async fn full_channel_reports_queue_full_per_entry() {
        let (source, state) = HttpQueueSource::channel(1);

        let resp = accept_batch(&state, vec![entry("msg-0", "2025-03-01"), entry("msg-1", "2025-03-02")]);
        assert_eq!(
            resp.failed,
            vec![FailedEntry {
                id: "msg-1".into(),
                code: "QueueFull".into()
            }]
        );

        let mut stream = source.stream().await;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.message_id, "msg-0");
        assert_eq!(first.payload.tariff_id, TariffId::Go);

        let resp = accept_batch(&state, vec![entry("msg-1", "2025-03-02")]);
        assert!(resp.failed.is_empty());
    }

    #[tokio::test]
    async fn redeliveries_of_stored_keys_are_acknowledged_and_dropped() {
        let (source, state) = HttpQueueSource::channel(8);

        accept_batch(&state, vec![entry("msg-0", "2025-03-01")]);
        source.stored_keys().record("2025-03-01");
        let resp = accept_batch(&state, vec![entry("msg-0", "2025-03-01")]);
        assert!(resp.failed.is_empty());

        drop(state);
        let received: Vec<_> = source.stream().await.collect().await;
        assert_eq!(received.len(), 1);
    }

    #[tokio::test]
    async fn keys_not_yet_stored_are_enqueued_again() {
        let (source, state) = HttpQueueSource::channel(8);

        accept_batch(&state, vec![entry("msg-0", "2025-03-01")]);
        accept_batch(&state, vec![entry("msg-0", "2025-03-01")]);

        drop(state);
        let received: Vec<_> = source.stream().await.collect().await;
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn closed_channel_and_bad_bodies_are_reported() {
        let (source, state) = HttpQueueSource::channel(8);
        drop(source);

        let mut bad = entry("msg-1", "2025-03-02");
        bad.body = "{}".to_string();

        let resp = accept_batch(&state, vec![entry("msg-0", "2025-03-01"), bad]);
        assert_eq!(resp.failed[0].code, "QueueClosed");
        assert_eq!(resp.failed[1].code, "InvalidMessageContents");
    }

    #[tokio::test]
    async fn stream_can_only_be_taken_once() {
        let (source, _state) = HttpQueueSource::channel(1);
        let _first = source.stream().await;

        let mut second = source.stream().await;
        assert!(matches!(second.next().await, Some(Err(PipelineError::Source(_)))));
    }
}
