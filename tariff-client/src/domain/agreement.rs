use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A historical or current electricity agreement on the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffAgreement {
    pub tariff_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    /// `None` for an open-ended agreement.
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
}

impl TariffAgreement {
    /// Start inclusive, end exclusive.
    pub fn covers(&self, instant: OffsetDateTime) -> bool {
        self.valid_from <= instant && self.valid_to.map_or(true, |to| instant < to)
    }
}
