use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use tariff_client::domain::DailyTariffQuote;
use tariff_service::{
    config::{AppConfig, StoreKind},
    metrics_server,
    observability,
    pipeline::Pipeline,
    sinks::{DailyUsageSink, IlpUsageStore, QuestDbUsageStore, UsageStore},
    sources::HttpQueueSource,
    transform,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = match cfg.store.kind {
        StoreKind::Pgwire => {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.questdb.max_connections)
                .connect(&cfg.questdb.uri)
                .await?;
            UsageStore::Pgwire(QuestDbUsageStore::new(pool))
        }
        StoreKind::Ilp => {
            let addr: SocketAddr = cfg
                .questdb
                .ilp_tcp_addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid questdb.ilp_tcp_addr: {e}"))?;
            UsageStore::Ilp(IlpUsageStore::new(addr))
        }
    };

    let source = HttpQueueSource::bind(&cfg.queue.http_bind_addr, cfg.queue.channel_capacity).await?;
    let stored = source.stored_keys();

    let pipeline: Pipeline<_, DailyTariffQuote, _> = Pipeline {
        source,
        transforms: vec![Arc::new(transform::QuoteValidation)],
        sink: DailyUsageSink::new(store, cfg.store_delivery()).with_stored_keys(stored),
    };

    tracing::info!(store = ?cfg.store.kind, "daily tariff processor started");
    pipeline.run().await?;

    Ok(())
}
