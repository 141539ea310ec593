use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{DeliveryError, DeliverySink, SinkResponse, WorkItem};

/// One message on the daily-tariff queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub group_id: String,
    pub dedup_key: String,
    /// JSON-encoded payload.
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueBatchResponse {
    #[serde(default)]
    pub failed: Vec<FailedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub id: String,
    pub code: String,
}

/// Publishes work items to the queue ingestion endpoint.
pub struct HttpQueueSink {
    http: Client,
    url: String,
    group_id: String,
}

impl HttpQueueSink {
    pub fn new(url: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            group_id: group_id.into(),
        }
    }

    fn encode<T: Serialize>(&self, batch: &[WorkItem<T>]) -> Result<Vec<QueueEntry>, DeliveryError> {
        batch
            .iter()
            .map(|w| {
                Ok(QueueEntry {
                    id: w.id.clone(),
                    group_id: self.group_id.clone(),
                    dedup_key: w.dedup_key.clone(),
                    body: serde_json::to_string(&w.payload).map_err(|e| DeliveryError::Encode(e.to_string()))?,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl<T> DeliverySink<T> for HttpQueueSink
where
    T: Serialize + Send + Sync,
{
    fn label(&self) -> &str {
        "Failed queue messages"
    }

    async fn send_batch(&self, batch: &[WorkItem<T>]) -> Result<SinkResponse, DeliveryError> {
        let entries = self.encode(batch)?;

        let resp = self
            .http
            .post(&self.url)
            .json(&entries)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Transport(format!("Request failed with status {}", status.as_u16())));
        }

        let body: QueueBatchResponse = resp
            .json()
            .await
            .map_err(|e| DeliveryError::Transport(format!("invalid queue response: {e}")))?;

        if body.failed.is_empty() {
            return Ok(SinkResponse::accepted());
        }

        let codes: Vec<String> = body.failed.iter().map(|f| format!("{}={}", f.id, f.code)).collect();
        Ok(SinkResponse::rejected(
            body.failed.into_iter().map(|f| f.id).collect(),
            format!("queue rejected {}", codes.join(", ")),
        ))
    }
}
