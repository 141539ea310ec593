use anyhow::Result;
use tariff_service::{config::AppConfig, jobs, metrics_server, observability, JobContext};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let ctx = JobContext::from_config(&cfg)?;
    let response = jobs::switch_tariff(&ctx).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
