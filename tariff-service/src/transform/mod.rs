use crate::pipeline::{Envelope, PipelineError, Transform};
use tariff_client::domain::{DailyTariffQuote, TariffCandidate};
use time::{Duration, Time};

/// Pure validation of a `DailyTariffQuote` message.
///
/// Rules:
/// - the tariff code must resolve to the tariff id it was published with.
/// - standing charge must be non-negative.
/// - rates and consumption must both be present.
/// - every rate window must end after it starts.
/// - every reading must fall within the quote's UTC day, end inclusive.
pub fn validate_quote(env: Envelope<DailyTariffQuote>) -> Result<Envelope<DailyTariffQuote>, PipelineError> {
    let q = &env.payload;

    match TariffCandidate::for_tariff_code(&q.tariff_code) {
        Some(c) if c.id == q.tariff_id => {}
        _ => {
            return Err(PipelineError::Transform(format!(
                "tariff code {} does not match tariff {}",
                q.tariff_code, q.tariff_id
            )))
        }
    }

    if q.standing_charge.is_nan() || q.standing_charge < 0.0 {
        return Err(PipelineError::Transform("standing charge must be non-negative".to_string()));
    }

    if q.rate_windows.is_empty() || q.consumption.is_empty() {
        return Err(PipelineError::Transform(format!("empty series for {}", q.date)));
    }

    if let Some(w) = q.rate_windows.iter().find(|w| w.valid_to <= w.valid_from) {
        return Err(PipelineError::Transform(format!(
            "rate window {} to {} is empty or reversed",
            w.valid_from, w.valid_to
        )));
    }

    let day_start = q.date.with_time(Time::MIDNIGHT).assume_utc();
    let day_end = day_start + Duration::DAY;
    if let Some(stray) = q
        .consumption
        .iter()
        .find(|c| c.read_at < day_start || c.read_at > day_end)
    {
        return Err(PipelineError::Transform(format!(
            "reading at {} is outside {}",
            stray.read_at, q.date
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct QuoteValidation;

#[async_trait::async_trait]
impl Transform<DailyTariffQuote, DailyTariffQuote> for QuoteValidation {
    async fn apply(
        &self,
        input: Envelope<DailyTariffQuote>,
    ) -> Result<Envelope<DailyTariffQuote>, PipelineError> {
        let message_id = input.message_id.clone();
        match validate_quote(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                tracing::warn!(%message_id, error = %e, "quote rejected");
                metrics::counter!("validation_quote_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
