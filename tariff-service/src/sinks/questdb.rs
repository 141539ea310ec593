use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use tariff_client::domain::{UsageRecord, UsageRow};

use crate::delivery::{DeliveryError, DeliverySink, SinkResponse, WorkItem};

/// Column values of one `daily_usage` row; kinds leave unused columns null.
#[derive(Debug, Default, PartialEq)]
struct UsageColumns<'a> {
    tariff_id: Option<&'a str>,
    tariff_name: Option<&'a str>,
    consumption_wh: Option<f64>,
    cost_pence: Option<f64>,
    standing_charge: Option<f64>,
}

fn columns(row: &UsageRow) -> UsageColumns<'_> {
    match &row.record {
        UsageRecord::HalfHour {
            consumption_wh,
            cost_pence,
            ..
        } => UsageColumns {
            consumption_wh: Some(*consumption_wh),
            cost_pence: Some(*cost_pence),
            ..Default::default()
        },
        UsageRecord::TariffCost {
            tariff_id,
            tariff_name,
            cost_pence,
            standing_charge,
        } => UsageColumns {
            tariff_id: Some(tariff_id.as_str()),
            tariff_name: Some(tariff_name),
            cost_pence: Some(*cost_pence),
            standing_charge: Some(*standing_charge),
            ..Default::default()
        },
        UsageRecord::DailyTotal { consumption_wh } => UsageColumns {
            consumption_wh: Some(*consumption_wh),
            ..Default::default()
        },
    }
}

/// Writes usage rows to QuestDB over the Postgres wire protocol. The table
/// is deduplicated on `(ts, record_key)`, so re-sent rows overwrite.
pub struct QuestDbUsageStore {
    pool: PgPool,
}

impl QuestDbUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_batch(&self, batch: &[WorkItem<UsageRow>]) -> Result<(), sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO daily_usage (ts, record_date, record_key, kind, tariff_id, tariff_name, consumption_wh, cost_pence, standing_charge) ",
        );

        builder.push_values(batch, |mut b, item| {
            let row = &item.payload;
            let c = columns(row);
            b.push_bind(row.ts())
                .push_bind(row.partition_key())
                .push_bind(row.sort_key())
                .push_bind(row.kind())
                .push_bind(c.tariff_id.map(str::to_string))
                .push_bind(c.tariff_name.map(str::to_string))
                .push_bind(c.consumption_wh)
                .push_bind(c.cost_pence)
                .push_bind(c.standing_charge);
        });

        builder.build().execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl DeliverySink<UsageRow> for QuestDbUsageStore {
    async fn send_batch(&self, batch: &[WorkItem<UsageRow>]) -> Result<SinkResponse, DeliveryError> {
        if batch.is_empty() {
            return Ok(SinkResponse::accepted());
        }

        match self.insert_batch(batch).await {
            Ok(()) => {
                metrics::counter!("questdb_ingested_records_total").increment(batch.len() as u64);
                Ok(SinkResponse::accepted())
            }
            Err(e) => {
                tracing::warn!(error = %e, rows = batch.len(), "questdb insert failed");
                metrics::counter!("questdb_sink_errors_total").increment(1);
                Err(DeliveryError::Transport(e.to_string()))
            }
        }
    }
}
