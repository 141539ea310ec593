use serde::{Deserialize, Serialize};
use time::Date;

use super::consumption::ConsumptionInterval;
use super::rates::RateWindow;
use super::tariff::{TariffCandidate, TariffId};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("missing standing charge for {0}")]
    MissingStandingCharge(Date),
    #[error("no rate windows for {0}")]
    EmptyRates(Date),
    #[error("no consumption for {0}")]
    EmptyConsumption(Date),
}

/// Everything needed to cost one day of usage against the tariff that was
/// active on that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTariffQuote {
    pub date: Date,
    pub tariff_id: TariffId,
    pub tariff_name: String,
    pub tariff_code: String,
    pub product_code: String,
    pub standing_charge: f64,
    pub rate_windows: Vec<RateWindow>,
    pub consumption: Vec<ConsumptionInterval>,
}

/// A quote under construction. Only [`QuoteDraft::complete`] produces a
/// [`DailyTariffQuote`].
#[derive(Debug, Clone)]
pub struct QuoteDraft {
    pub date: Date,
    pub tariff: &'static TariffCandidate,
    pub tariff_code: String,
    pub product_code: String,
    standing_charge: Option<f64>,
    rate_windows: Vec<RateWindow>,
    consumption: Vec<ConsumptionInterval>,
}

impl QuoteDraft {
    pub fn new(
        date: Date,
        tariff: &'static TariffCandidate,
        tariff_code: impl Into<String>,
        product_code: impl Into<String>,
    ) -> Self {
        Self {
            date,
            tariff,
            tariff_code: tariff_code.into(),
            product_code: product_code.into(),
            standing_charge: None,
            rate_windows: Vec::new(),
            consumption: Vec::new(),
        }
    }

    pub fn with_standing_charge(mut self, pence_per_day: f64) -> Self {
        self.standing_charge = Some(pence_per_day);
        self
    }

    pub fn with_rates(mut self, rates: Vec<RateWindow>) -> Self {
        self.rate_windows = rates;
        self
    }

    pub fn with_consumption(mut self, consumption: Vec<ConsumptionInterval>) -> Self {
        self.consumption = consumption;
        self
    }

    pub fn complete(self) -> Result<DailyTariffQuote, QuoteError> {
        let standing_charge = self
            .standing_charge
            .ok_or(QuoteError::MissingStandingCharge(self.date))?;
        if self.rate_windows.is_empty() {
            return Err(QuoteError::EmptyRates(self.date));
        }
        if self.consumption.is_empty() {
            return Err(QuoteError::EmptyConsumption(self.date));
        }

        Ok(DailyTariffQuote {
            date: self.date,
            tariff_id: self.tariff.id,
            tariff_name: self.tariff.display_name.to_string(),
            tariff_code: self.tariff_code,
            product_code: self.product_code,
            standing_charge,
            rate_windows: self.rate_windows,
            consumption: self.consumption,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn cosy() -> &'static TariffCandidate {
        TariffCandidate::by_id(TariffId::Cosy)
    }

    fn rates() -> Vec<RateWindow> {
        vec![RateWindow::new(
            datetime!(2025-03-01 00:00 UTC),
            datetime!(2025-03-02 00:00 UTC),
            24.5,
        )]
    }

    #[test]
    fn complete_requires_both_series() {
        let draft = QuoteDraft::new(date!(2025-03-01), cosy(), "E-1R-COSY-22-12-08-A", "COSY-22-12-08")
            .with_standing_charge(40.0)
            .with_rates(rates());

        assert_eq!(
            draft.clone().complete().unwrap_err(),
            QuoteError::EmptyConsumption(date!(2025-03-01))
        );

        let quote = draft
            .with_consumption(vec![ConsumptionInterval::new(
                datetime!(2025-03-01 00:00 UTC),
                120.0,
            )])
            .complete()
            .unwrap();
        assert_eq!(quote.tariff_id, TariffId::Cosy);
        assert_eq!(quote.tariff_name, "Cosy Octopus");
        assert_eq!(quote.product_code, "COSY-22-12-08");
    }

    #[test]
    fn complete_rejects_missing_rates_and_standing_charge() {
        let bare = QuoteDraft::new(date!(2025-03-01), cosy(), "E-1R-COSY-22-12-08-A", "COSY-22-12-08");
        assert_eq!(
            bare.clone().complete().unwrap_err(),
            QuoteError::MissingStandingCharge(date!(2025-03-01))
        );
        assert_eq!(
            bare.with_standing_charge(1.0).complete().unwrap_err(),
            QuoteError::EmptyRates(date!(2025-03-01))
        );
    }

    #[test]
    fn quote_serializes_tariff_id_lowercase_and_iso_date() {
        let quote = QuoteDraft::new(date!(2025-03-01), cosy(), "E-1R-COSY-22-12-08-A", "COSY-22-12-08")
            .with_standing_charge(40.0)
            .with_rates(rates())
            .with_consumption(vec![ConsumptionInterval::new(
                datetime!(2025-03-01 00:00 UTC),
                120.0,
            )])
            .complete()
            .unwrap();

        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["tariff_id"], "cosy");
        assert_eq!(json["date"], "2025-03-01");

        let back: DailyTariffQuote = serde_json::from_value(json).unwrap();
        assert_eq!(back, quote);
    }
}
