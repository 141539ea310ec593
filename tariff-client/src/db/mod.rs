pub mod daily_usage_queries;

pub use daily_usage_queries::{daily_costs, half_hourly_usage, DailyTariffCost, HalfHourUsage};
