use anyhow::Result;
use tariff_service::{config::AppConfig, jobs, observability, JobContext};

/// `publish_tariff_history [YYYY-MM-DD]`
///
/// Publishes every date from the given date (or `BACKFILL_FROM_DATE`) through
/// yesterday. With neither, publishes yesterday only.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let ctx = JobContext::from_config(&cfg)?;

    let from = std::env::args().nth(1).or_else(|| cfg.backfill_from_date.clone());
    let response = match from.as_deref() {
        Some(from) => jobs::publish_tariff_history(&ctx, Some(from)).await,
        None => jobs::publish_yesterdays_tariff(&ctx).await,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
