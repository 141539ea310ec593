//! Resolves the tariff that was active on each date and fetches what is
//! needed to cost that day.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tariff_client::domain::{DailyTariffQuote, QuoteDraft, TariffAgreement, TariffCandidate};
use time::{Date, Time};

use crate::{
    error::SwitcherError,
    retry::{retry, RetryPolicy},
    upstream::{ApiError, EnergyApi, UnitRatesSelector},
};

static PRODUCT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:E-\dR-)(.*?)(?:-[A-Z])?$").expect("product code pattern is valid"));

/// First agreement covering UTC midnight of `date`.
pub fn find_agreement_for_date(agreements: &[TariffAgreement], date: Date) -> Result<&TariffAgreement, SwitcherError> {
    let midnight = date.with_time(Time::MIDNIGHT).assume_utc();
    agreements
        .iter()
        .find(|a| a.covers(midnight))
        .ok_or(SwitcherError::NoMatchingAgreement(date))
}

/// `E-1R-COSY-22-12-08-A` -> `COSY-22-12-08`
pub fn product_code_from_tariff_code(tariff_code: &str) -> Result<String, SwitcherError> {
    PRODUCT_CODE
        .captures(tariff_code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SwitcherError::Validation(format!("No product code found from tariff code: {tariff_code}")))
}

/// The meter that consumption is read from.
#[derive(Debug, Clone)]
pub struct MeterRef {
    pub mpan: String,
    pub serial_number: String,
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub batch_size: usize,
    pub pacing: Duration,
    pub retry: RetryPolicy,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pacing: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

pub struct Enricher {
    api: Arc<dyn EnergyApi>,
    options: EnrichOptions,
}

impl Enricher {
    pub fn new(api: Arc<dyn EnergyApi>, options: EnrichOptions) -> Self {
        Self { api, options }
    }

    /// Resolve drafts for every date, then fetch standing charge, unit rates
    /// and consumption chunk by chunk.
    pub async fn enrich(
        &self,
        dates: &[Date],
        agreements: &[TariffAgreement],
        meter: &MeterRef,
    ) -> Result<BTreeMap<Date, DailyTariffQuote>, SwitcherError> {
        let drafts = dates
            .iter()
            .map(|&date| {
                let agreement = find_agreement_for_date(agreements, date)?;
                let product_code = product_code_from_tariff_code(&agreement.tariff_code)?;
                let tariff = TariffCandidate::for_tariff_code(&agreement.tariff_code).ok_or_else(|| {
                    SwitcherError::UnknownTariff {
                        tariff_code: agreement.tariff_code.clone(),
                    }
                })?;
                Ok(QuoteDraft::new(date, tariff, agreement.tariff_code.clone(), product_code))
            })
            .collect::<Result<Vec<_>, SwitcherError>>()?;

        let mut quotes = BTreeMap::new();
        let chunk_size = self.options.batch_size.max(1);
        let chunks: Vec<&[QuoteDraft]> = drafts.chunks(chunk_size).collect();

        for (index, chunk) in chunks.iter().enumerate() {
            tracing::info!(chunk = index + 1, of = chunks.len(), dates = chunk.len(), "enriching dates");

            let completed = try_join_all(chunk.iter().map(|draft| self.fill(draft, meter))).await?;
            for quote in completed {
                quotes.insert(quote.date, quote);
            }

            if index + 1 < chunks.len() && !self.options.pacing.is_zero() {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        metrics::counter!("enrich_dates_total").increment(quotes.len() as u64);
        Ok(quotes)
    }

    async fn fill(&self, draft: &QuoteDraft, meter: &MeterRef) -> Result<DailyTariffQuote, SwitcherError> {
        let date = draft.date;
        let selector = UnitRatesSelector::Codes {
            product_code: draft.product_code.clone(),
            tariff_code: draft.tariff_code.clone(),
        };

        let (api, selector) = (&self.api, &selector);
        let (standing_charge, rates, consumption) = retry(&self.options.retry, "enrich date", move || async move {
            tokio::try_join!(
                api.standing_charge(&draft.product_code, &draft.tariff_code, date),
                api.unit_rates(selector, date),
                api.consumption(&meter.mpan, &meter.serial_number, date),
            )
        })
        .await?;

        let quote = draft
            .clone()
            .with_standing_charge(standing_charge)
            .with_rates(rates)
            .with_consumption(consumption)
            .complete()
            .map_err(|e| ApiError::Schema(e.to_string()))?;
        Ok(quote)
    }
}
