mod agreement;
mod consumption;
mod quote;
mod rates;
mod tariff;
mod usage;

pub use agreement::TariffAgreement;
pub use consumption::{epoch_ms, ConsumptionInterval};
pub use quote::{DailyTariffQuote, QuoteDraft, QuoteError};
pub use rates::RateWindow;
pub use tariff::{TariffCandidate, TariffId, TARIFFS};
pub use usage::{UsageRecord, UsageRow};
