use std::time::SystemTime;

use futures::StreamExt;
use tariff_client::domain::{DailyTariffQuote, UsageRecord, UsageRow};

use crate::{
    delivery::{deliver, DeliveryError, DeliveryOptions, DeliverySink, SinkResponse, WorkItem},
    pipeline::{Envelope, PipelineError, Sink, StoredKeys},
    reconcile::{match_rates, round4, total_cost, BoundaryRule, MatchingRateError},
    sinks::{IlpUsageStore, QuestDbUsageStore},
};

/// Rows for one quote: a half-hour row per reading, the tariff's daily cost
/// and the day's total consumption. Costed under [`BoundaryRule::Inclusive`].
pub fn build_usage_rows(quote: &DailyTariffQuote) -> Result<Vec<UsageRow>, MatchingRateError> {
    let costed = match_rates(&quote.consumption, &quote.rate_windows, BoundaryRule::Inclusive)?;
    let daily_cost = total_cost(&costed, quote.standing_charge);
    let daily_wh_total = round4(costed.iter().map(|c| c.interval.consumption_delta_wh).sum());

    let mut rows: Vec<UsageRow> = costed
        .into_iter()
        .map(|c| UsageRow {
            date: quote.date,
            record: UsageRecord::HalfHour {
                read_at: c.interval.read_at,
                consumption_wh: c.interval.consumption_delta_wh,
                cost_pence: c.unit_cost_pence,
            },
        })
        .collect();

    rows.push(UsageRow {
        date: quote.date,
        record: UsageRecord::TariffCost {
            tariff_id: quote.tariff_id,
            tariff_name: quote.tariff_name.clone(),
            cost_pence: daily_cost,
            standing_charge: quote.standing_charge,
        },
    });
    rows.push(UsageRow {
        date: quote.date,
        record: UsageRecord::DailyTotal {
            consumption_wh: daily_wh_total,
        },
    });

    Ok(rows)
}

/// Where usage rows are written.
pub enum UsageStore {
    Pgwire(QuestDbUsageStore),
    Ilp(IlpUsageStore),
}

#[async_trait::async_trait]
impl DeliverySink<UsageRow> for UsageStore {
    fn label(&self) -> &str {
        "Failed usage rows"
    }

    async fn send_batch(&self, batch: &[WorkItem<UsageRow>]) -> Result<SinkResponse, DeliveryError> {
        match self {
            Self::Pgwire(s) => s.send_batch(batch).await,
            Self::Ilp(s) => s.send_batch(batch).await,
        }
    }
}

/// Turns each validated quote into usage rows and delivers them to a store.
///
/// A quote that cannot be costed or stored is logged and left unrecorded, so
/// the queue accepts its redelivery. The sink keeps consuming either way.
pub struct DailyUsageSink<S> {
    store: S,
    delivery: DeliveryOptions,
    stored: StoredKeys,
}

impl<S> DailyUsageSink<S> {
    pub fn new(store: S, delivery: DeliveryOptions) -> Self {
        Self {
            store,
            delivery,
            stored: StoredKeys::default(),
        }
    }

    /// Share the set the queue source checks for redeliveries.
    pub fn with_stored_keys(mut self, stored: StoredKeys) -> Self {
        self.stored = stored;
        self
    }
}

#[async_trait::async_trait]
impl<S> Sink<DailyTariffQuote> for DailyUsageSink<S>
where
    S: DeliverySink<UsageRow> + 'static,
{
    async fn run<St>(&self, mut input: St) -> Result<(), PipelineError>
    where
        St: futures::Stream<Item = Result<Envelope<DailyTariffQuote>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "skipping rejected message");
                    continue;
                }
            };

            let rows = match build_usage_rows(&env.payload) {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(message_id = %env.message_id, dedup_key = %env.dedup_key, error = %e, "skipping uncostable quote");
                    metrics::counter!("usage_quotes_skipped_total").increment(1);
                    continue;
                }
            };

            let count = rows.len();
            let items = WorkItem::sequence(rows.into_iter().map(|r| (r.dedup_key(), r)));
            if let Err(e) = deliver(items, &self.delivery, &self.store).await {
                tracing::error!(message_id = %env.message_id, dedup_key = %env.dedup_key, error = %e, "usage delivery failed");
                metrics::counter!("usage_quotes_failed_total").increment(1);
                continue;
            }

            self.stored.record(env.dedup_key.clone());
            metrics::counter!("usage_rows_written_total").increment(count as u64);
            if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
                metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
            }
            tracing::info!(date = %env.payload.date, rows = count, "daily usage stored");
        }

        Ok(())
    }
}
