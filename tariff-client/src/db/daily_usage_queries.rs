use anyhow::Result;
use sqlx::PgPool;
use time::{Date, OffsetDateTime, Time};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyTariffCost {
    pub ts: OffsetDateTime,
    pub record_date: String,
    pub tariff_id: String,
    pub tariff_name: String,
    pub cost_pence: f64,
    pub standing_charge: f64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HalfHourUsage {
    pub ts: OffsetDateTime,
    pub record_key: String,
    pub consumption_wh: f64,
    pub cost_pence: f64,
}

fn midnight(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

/// Tariff cost rows for every stored date in `[start, end]`.
pub async fn daily_costs(pool: &PgPool, start: Date, end: Date) -> Result<Vec<DailyTariffCost>> {
    let rows = sqlx::query_as::<_, DailyTariffCost>(
        r#"
        SELECT
            ts,
            record_date,
            tariff_id,
            tariff_name,
            cost_pence,
            standing_charge
        FROM daily_usage
        WHERE kind = 'tariff'
          AND ts >= $1
          AND ts <  $2
        ORDER BY ts
        "#,
    )
    .bind(midnight(start))
    .bind(midnight(end.next_day().unwrap_or(end)))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Half-hourly usage rows for a single date, in reading order.
pub async fn half_hourly_usage(pool: &PgPool, date: Date) -> Result<Vec<HalfHourUsage>> {
    let rows = sqlx::query_as::<_, HalfHourUsage>(
        r#"
        SELECT
            ts,
            record_key,
            consumption_wh,
            cost_pence
        FROM daily_usage
        WHERE kind = 'usage'
          AND record_date = $1
        ORDER BY ts
        "#,
    )
    .bind(format!("DATE#{date}"))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
