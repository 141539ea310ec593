//! Entry points run by the binaries. Each returns a [`Response`]; errors are
//! reported once, here.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tariff_client::domain::{DailyTariffQuote, TariffAgreement};
use time::Date;

use crate::{
    clock::{dates_until_yesterday, parse_iso_date, Clock, SystemClock},
    config::AppConfig,
    decision::{SwitchOptions, TariffSwitcher},
    delivery::{deliver, DeliveryOptions, DeliverySink, HttpQueueSink, WorkItem},
    enrich::{EnrichOptions, Enricher, MeterRef},
    error::SwitcherError,
    notify::{EmailNotifier, LogNotifier, Notifier},
    reconcile::{match_rates, total_cost, BoundaryRule},
    response::{respond, Response},
    upstream::{Account, ApiError, EnergyApi, OctopusClient},
};

/// Collaborators and tuning shared by every job.
#[derive(Clone)]
pub struct JobContext {
    pub api: Arc<dyn EnergyApi>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub queue: Arc<dyn DeliverySink<DailyTariffQuote>>,
    pub enrich: EnrichOptions,
    pub switch: SwitchOptions,
    pub queue_delivery: DeliveryOptions,
}

impl JobContext {
    /// Production wiring: the Octopus client, email (or log-only) notices and
    /// the HTTP queue.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = match &cfg.email {
            Some(email) => Arc::new(EmailNotifier::new(email)?),
            None => Arc::new(LogNotifier),
        };

        Ok(Self {
            api: Arc::new(OctopusClient::new(&cfg.octopus)?),
            notifier,
            clock: Arc::new(SystemClock),
            queue: Arc::new(HttpQueueSink::new(cfg.queue.url.clone(), cfg.queue.group_id.clone())),
            enrich: cfg.enrich_options(),
            switch: cfg.switch_options(),
            queue_delivery: cfg.queue_delivery(),
        })
    }
}

fn meter_from_account(account: &Account) -> Result<MeterRef, SwitcherError> {
    let agreement = account
        .electricity_agreements
        .first()
        .ok_or_else(|| ApiError::Schema("account has no active electricity agreement".to_string()))?;
    let meter = agreement
        .meters
        .first()
        .ok_or_else(|| ApiError::Schema("agreement has no meter".to_string()))?;

    Ok(MeterRef {
        mpan: agreement.mpan.clone(),
        serial_number: meter.serial_number.clone(),
    })
}

fn require_date(from: Option<&str>) -> Result<Date, SwitcherError> {
    let raw = from
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| SwitcherError::Validation("Missing start date".to_string()))?;
    parse_iso_date(raw)
}

async fn agreements_and_meter(ctx: &JobContext) -> Result<(Vec<TariffAgreement>, MeterRef), SwitcherError> {
    let (agreements, account) = tokio::try_join!(ctx.api.past_agreements(), ctx.api.account())?;
    Ok((agreements, meter_from_account(&account)?))
}

async fn publish_dates(ctx: &JobContext, dates: &[Date]) -> Result<usize, SwitcherError> {
    let (agreements, meter) = agreements_and_meter(ctx).await?;
    let quotes = Enricher::new(ctx.api.clone(), ctx.enrich.clone())
        .enrich(dates, &agreements, &meter)
        .await?;

    let items = WorkItem::sequence(quotes.into_values().map(|q| (q.date.to_string(), q)));
    let count = items.len();
    deliver(items, &ctx.queue_delivery, ctx.queue.as_ref()).await?;

    tracing::info!(messages = count, "published daily tariff data");
    Ok(count)
}

pub async fn switch_tariff(ctx: &JobContext) -> Response {
    let switcher = TariffSwitcher::new(
        ctx.api.clone(),
        ctx.notifier.clone(),
        ctx.clock.clone(),
        ctx.switch.clone(),
    );
    respond(switcher.run().await.map(|d| Response::ok(d.message)))
}

/// Publish one message per date from `from` through yesterday.
pub async fn publish_tariff_history(ctx: &JobContext, from: Option<&str>) -> Response {
    let run = async {
        let start = require_date(from)?;
        let dates = dates_until_yesterday(start, ctx.clock.today());
        tracing::info!(from = %start, dates = dates.len(), "publishing tariff history");

        publish_dates(ctx, &dates).await?;
        Ok::<_, SwitcherError>(Response::ok(format!(
            "Backfill data from {start} successfully generated and sent to the queue"
        )))
    };
    respond(run.await)
}

pub async fn publish_yesterdays_tariff(ctx: &JobContext) -> Response {
    let run = async {
        let yesterday = ctx
            .clock
            .today()
            .previous_day()
            .ok_or_else(|| SwitcherError::Validation("no previous day".to_string()))?;

        publish_dates(ctx, &[yesterday]).await?;
        Ok::<_, SwitcherError>(Response::ok(format!(
            "Yesterday's data successfully generated and sent to the queue: {yesterday}"
        )))
    };
    respond(run.await)
}

/// Cost every date from `from` through yesterday against the tariff that was
/// active on it.
pub async fn backfill_costs(ctx: &JobContext, from: Option<&str>) -> Response {
    let run = async {
        let start = require_date(from)?;
        let dates = dates_until_yesterday(start, ctx.clock.today());
        let (agreements, meter) = agreements_and_meter(ctx).await?;

        let quotes = Enricher::new(ctx.api.clone(), ctx.enrich.clone())
            .enrich(&dates, &agreements, &meter)
            .await?;

        let mut data = Map::new();
        for (date, quote) in &quotes {
            let costed = match_rates(&quote.consumption, &quote.rate_windows, BoundaryRule::Inclusive)?;
            let cost = total_cost(&costed, quote.standing_charge);
            tracing::info!(%date, tariff = %quote.tariff_name, cost_pence = cost, "daily cost");
            data.insert(date.to_string(), json!({ "cost": cost }));
        }

        Ok::<_, SwitcherError>(Response::ok_with_data("Backfill complete", Value::Object(data)))
    };
    respond(run.await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_date_is_required_and_validated() {
        assert!(matches!(require_date(None), Err(SwitcherError::Validation(_))));
        assert!(matches!(require_date(Some("  ")), Err(SwitcherError::Validation(_))));
        assert!(matches!(require_date(Some("2025-13-01")), Err(SwitcherError::Validation(_))));
        assert_eq!(require_date(Some("2025-03-01")).unwrap().to_string(), "2025-03-01");
    }
}
