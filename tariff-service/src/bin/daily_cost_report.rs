use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tariff_client::db::{daily_costs, half_hourly_usage};
use tariff_service::{clock::parse_iso_date, config::AppConfig, observability, reconcile::pence_to_pounds};

/// `daily_cost_report <from> <to> [--detail]`
///
/// Prints the stored tariff cost per day between two dates, inclusive, and
/// optionally the half-hourly rows behind each day.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (from, to) = match (args.first(), args.get(1)) {
        (Some(from), Some(to)) => (parse_iso_date(from)?, parse_iso_date(to)?),
        _ => anyhow::bail!("usage: daily_cost_report <from YYYY-MM-DD> <to YYYY-MM-DD> [--detail]"),
    };
    let detail = args.iter().any(|a| a == "--detail");

    let cfg = AppConfig::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(cfg.questdb.max_connections)
        .connect(&cfg.questdb.uri)
        .await
        .context("connecting to QuestDB")?;

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
    let rows = daily_costs(&pool, from, to).await?;
    tracing::info!(%from, %to, rows = rows.len(), "loaded stored tariff costs");

    for row in rows {
        let date = row.ts.date();
        println!(
            "{date}  {:<16} {:>8}  (standing {:.4}p)",
            row.tariff_name,
            pence_to_pounds(row.cost_pence),
            row.standing_charge
        );

        if detail {
            for hh in half_hourly_usage(&pool, date).await? {
                println!(
                    "    {:<12} {:>8.1} Wh {:>9.4}p",
                    hh.record_key, hh.consumption_wh, hh.cost_pence
                );
            }
        }
    }

    Ok(())
}
