use time::{Date, OffsetDateTime, Time};

use super::tariff::TariffId;

/// What a stored row holds, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageRecord {
    HalfHour {
        read_at: OffsetDateTime,
        consumption_wh: f64,
        cost_pence: f64,
    },
    TariffCost {
        tariff_id: TariffId,
        tariff_name: String,
        cost_pence: f64,
        standing_charge: f64,
    },
    DailyTotal {
        consumption_wh: f64,
    },
}

/// One row of the `daily_usage` table, keyed by the semantic date it
/// describes.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRow {
    pub date: Date,
    pub record: UsageRecord,
}

impl UsageRow {
    pub fn partition_key(&self) -> String {
        format!("DATE#{}", self.date)
    }

    pub fn sort_key(&self) -> String {
        match &self.record {
            UsageRecord::HalfHour { read_at, .. } => {
                let utc = read_at.to_offset(time::UtcOffset::UTC);
                format!("USAGE#{:02}:{:02}", utc.hour(), utc.minute())
            }
            UsageRecord::TariffCost { tariff_id, .. } => format!("TARIFF#{tariff_id}"),
            UsageRecord::DailyTotal { .. } => "TOTAL".to_string(),
        }
    }

    pub fn dedup_key(&self) -> String {
        format!("{}::{}", self.partition_key(), self.sort_key())
    }

    pub fn kind(&self) -> &'static str {
        match self.record {
            UsageRecord::HalfHour { .. } => "usage",
            UsageRecord::TariffCost { .. } => "tariff",
            UsageRecord::DailyTotal { .. } => "total",
        }
    }

    /// Designated timestamp: the reading time for half hours, UTC midnight
    /// of the date otherwise.
    pub fn ts(&self) -> OffsetDateTime {
        match &self.record {
            UsageRecord::HalfHour { read_at, .. } => *read_at,
            _ => self.date.with_time(Time::MIDNIGHT).assume_utc(),
        }
    }
}
