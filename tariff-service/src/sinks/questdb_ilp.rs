use std::net::SocketAddr;

use tariff_client::domain::{UsageRecord, UsageRow};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Mutex};

use crate::delivery::{DeliveryError, DeliverySink, SinkResponse, WorkItem};

/// Escape measurement/tag keys/tag values/field keys for ILP.
///
/// ILP requires escaping commas, spaces and equals with a backslash.
fn ilp_escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    ilp_escape_ident(key, out);
    out.push('=');
    ilp_escape_ident(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

/// One ILP line for a `daily_usage` row, without the trailing newline.
pub fn write_usage_line(row: &UsageRow, out: &mut String) {
    out.push_str("daily_usage");

    push_tag(out, "record_date", &row.partition_key());
    push_tag(out, "record_key", &row.sort_key());
    push_tag(out, "kind", row.kind());

    let mut first = true;
    match &row.record {
        UsageRecord::HalfHour {
            consumption_wh,
            cost_pence,
            ..
        } => {
            out.push(' ');
            push_field_f64(out, &mut first, "consumption_wh", *consumption_wh);
            push_field_f64(out, &mut first, "cost_pence", *cost_pence);
        }
        UsageRecord::TariffCost {
            tariff_id,
            tariff_name,
            cost_pence,
            standing_charge,
        } => {
            push_tag(out, "tariff_id", tariff_id.as_str());
            push_tag(out, "tariff_name", tariff_name);
            out.push(' ');
            push_field_f64(out, &mut first, "cost_pence", *cost_pence);
            push_field_f64(out, &mut first, "standing_charge", *standing_charge);
        }
        UsageRecord::DailyTotal { consumption_wh } => {
            out.push(' ');
            push_field_f64(out, &mut first, "consumption_wh", *consumption_wh);
        }
    }

    // timestamp (nanos)
    out.push(' ');
    out.push_str(&row.ts().unix_timestamp_nanos().to_string());
}

/// Writes usage rows to QuestDB's ILP TCP endpoint over one reused
/// connection. A failed write drops the connection; the next batch
/// reconnects.
pub struct IlpUsageStore {
    addr: SocketAddr,
    conn: Mutex<Option<TcpStream>>,
}

impl IlpUsageStore {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            conn: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<TcpStream, DeliveryError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| DeliveryError::Transport(format!("failed to connect to QuestDB ILP: {e}")))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn encode_batch(batch: &[WorkItem<UsageRow>]) -> Vec<u8> {
        // Heuristic capacity: ~120 bytes per line.
        let mut s = String::with_capacity(batch.len().saturating_mul(120));
        for item in batch {
            write_usage_line(&item.payload, &mut s);
            s.push('\n');
        }
        s.into_bytes()
    }
}

#[async_trait::async_trait]
impl DeliverySink<UsageRow> for IlpUsageStore {
    async fn send_batch(&self, batch: &[WorkItem<UsageRow>]) -> Result<SinkResponse, DeliveryError> {
        if batch.is_empty() {
            return Ok(SinkResponse::accepted());
        }

        let payload = Self::encode_batch(batch);
        let mut conn = self.conn.lock().await;

        let mut stream = match conn.take() {
            Some(stream) => stream,
            None => self.connect().await?,
        };

        match stream.write_all(&payload).await {
            Ok(()) => {
                *conn = Some(stream);
                metrics::counter!("questdb_ingested_records_total").increment(batch.len() as u64);
                metrics::counter!("questdb_ilp_bytes_total").increment(payload.len() as u64);
                Ok(SinkResponse::accepted())
            }
            Err(e) => {
                tracing::warn!(error = %e, "QuestDB ILP write failed, dropping connection");
                metrics::counter!("questdb_ilp_sink_errors_total").increment(1);
                Err(DeliveryError::Transport(format!("ilp write failed: {e}")))
            }
        }
    }
}
