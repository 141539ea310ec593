pub mod daily_usage;
pub mod questdb;
pub mod questdb_ilp;

pub use daily_usage::{build_usage_rows, DailyUsageSink, UsageStore};
pub use questdb::QuestDbUsageStore;
pub use questdb_ilp::IlpUsageStore;
