use anyhow::Result;
use tariff_service::{config::AppConfig, jobs, observability, JobContext};

/// `backfill_costs <YYYY-MM-DD>`: daily cost of every date since the given
/// one (or `BACKFILL_FROM_DATE`) on the tariff active at the time.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let ctx = JobContext::from_config(&cfg)?;

    let from = std::env::args().nth(1).or_else(|| cfg.backfill_from_date.clone());
    let response = jobs::backfill_costs(&ctx, from.as_deref()).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
