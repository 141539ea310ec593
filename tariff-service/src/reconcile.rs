//! Cost reconciliation: matching consumption intervals to rate windows.
//!
//! All figures are pence. Every per-interval cost and every total is rounded
//! to 4 decimal places; 2-decimal rounding is only for display.

use tariff_client::domain::{ConsumptionInterval, RateWindow};
use time::format_description::well_known::Rfc3339;

/// Which end of a rate window a reading may sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRule {
    /// `valid_from <= t <= valid_to`
    Inclusive,
    /// `valid_from < t <= valid_to`
    StartExclusive,
}

impl BoundaryRule {
    fn contains(&self, window: &RateWindow, t_ms: i64) -> bool {
        let after_start = match self {
            BoundaryRule::Inclusive => window.valid_from_ms <= t_ms,
            BoundaryRule::StartExclusive => window.valid_from_ms < t_ms,
        };
        after_start && t_ms <= window.valid_to_ms
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Unable to find matching rate for: {timestamp}")]
pub struct MatchingRateError {
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CostedInterval {
    pub interval: ConsumptionInterval,
    pub unit_cost_pence: f64,
}

/// Round half up at the 4th decimal place.
pub fn round4(x: f64) -> f64 {
    (x * 1e4 + 0.5).floor() / 1e4
}

pub fn round2(x: f64) -> f64 {
    (x * 1e2 + 0.5).floor() / 1e2
}

/// `47.0` -> `"£0.47"`
pub fn pence_to_pounds(pence: f64) -> String {
    format!("£{:.2}", round2(pence / 100.0))
}

/// Cost each interval at the first window that contains its reading.
///
/// Fails on the first interval without a window; no partial result is
/// returned.
pub fn match_rates(
    consumption: &[ConsumptionInterval],
    rates: &[RateWindow],
    rule: BoundaryRule,
) -> Result<Vec<CostedInterval>, MatchingRateError> {
    consumption
        .iter()
        .map(|interval| {
            let window = rates
                .iter()
                .find(|w| rule.contains(w, interval.read_at_ms))
                .ok_or_else(|| MatchingRateError {
                    timestamp: interval
                        .read_at
                        .format(&Rfc3339)
                        .unwrap_or_else(|_| interval.read_at_ms.to_string()),
                })?;

            Ok(CostedInterval {
                interval: interval.clone(),
                unit_cost_pence: round4(interval.consumption_kwh() * window.unit_cost_pence_per_kwh),
            })
        })
        .collect()
}

pub fn total_cost(costed: &[CostedInterval], standing_charge: f64) -> f64 {
    let sum: f64 = costed.iter().map(|c| c.unit_cost_pence).sum();
    round4(standing_charge + sum)
}

/// Daily cost from already-priced deltas, e.g. smart meter telemetry.
pub fn daily_cost_in_pence(unit_costs: &[f64], standing_charge: f64) -> f64 {
    round4(standing_charge + unit_costs.iter().sum::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn at_ms(ms: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000).unwrap()
    }

    fn consumption() -> Vec<ConsumptionInterval> {
        [
            (1740702600000, 133.0),
            (1740704400000, 89.0),
            (1740706200000, 87.0),
            (1740708000000, 69.0),
            (1740709800000, 74.0),
            (1740711600000, 74.0),
            (1740713400000, 73.0),
            (1740715200000, 85.0),
            (1740717000000, 71.0),
            (1740718800000, 85.0),
            (1740720600000, 70.0),
            (1740722400000, 756.0),
            (1740724200000, 152.0),
            (1740726000000, 75.0),
            (1740727800000, 127.0),
            (1740729600000, 138.0),
            (1740731400000, 114.0),
            (1740733200000, 122.0),
            (1740735000000, 155.0),
            (1740736800000, 234.0),
            (1740738600000, 117.0),
            (1740740400000, 106.0),
            (1740742200000, 11.0),
        ]
        .into_iter()
        .map(|(ms, wh)| ConsumptionInterval::new(at_ms(ms), wh))
        .collect()
    }

    fn rates() -> Vec<RateWindow> {
        [
            (1740780000000, 1740787200000, 13.23168),
            (1740769200000, 1740780000000, 26.98143),
            (1740758400000, 1740769200000, 40.47225),
            (1740747600000, 1740758400000, 13.23168),
            (1740726000000, 1740747600000, 26.98143),
            (1740715200000, 1740726000000, 13.23168),
            (1740700800000, 1740715200000, 26.98143),
        ]
        .into_iter()
        .map(|(from, to, p)| RateWindow::new(at_ms(from), at_ms(to), p))
        .collect()
    }

    const STANDING: f64 = 48.7881;

    #[test]
    fn inclusive_rule_prices_boundary_readings_at_the_earlier_window() {
        let costed = match_rates(&consumption(), &rates(), BoundaryRule::Inclusive).unwrap();
        assert_eq!(costed.len(), 23);
        // 04:00 sits on the boundary of 00-04 and 04-07; the 00-04 window is
        // listed after 04-07 upstream, so 04-07 wins under first match.
        assert_eq!(costed[7].unit_cost_pence, round4(0.085 * 13.23168));
        assert_eq!(total_cost(&costed, STANDING), 113.4298);
    }

    #[test]
    fn start_exclusive_rule_prices_boundary_readings_at_the_closing_window() {
        let costed = match_rates(&consumption(), &rates(), BoundaryRule::StartExclusive).unwrap();
        assert_eq!(costed[7].unit_cost_pence, round4(0.085 * 26.98143));
        assert_eq!(total_cost(&costed, STANDING), 113.5673);
    }

    #[test]
    fn unmatched_reading_aborts_the_whole_calculation() {
        let late_only = vec![rates().remove(0)];
        let err = match_rates(&consumption(), &late_only, BoundaryRule::Inclusive).unwrap_err();
        assert_eq!(err.to_string(), "Unable to find matching rate for: 2025-02-28T00:30:00Z");

        let last = vec![consumption().pop().unwrap()];
        let err = match_rates(&last, &late_only, BoundaryRule::StartExclusive).unwrap_err();
        assert_eq!(err.timestamp, "2025-02-28T11:30:00Z");
    }

    #[test]
    fn daily_cost_adds_standing_charge_and_rounds() {
        assert_eq!(daily_cost_in_pence(&[1.0, 2.0, 3.0, 20.0], 100.0), 126.0);
        assert_eq!(daily_cost_in_pence(&[], 2.0), 2.0);
        assert_eq!(daily_cost_in_pence(&[1.02, 2.2444244244, 3.22332323], 100.0), 106.4877);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round4(1.00005), 1.0001);
        assert_eq!(round4(2.44442), 2.4444);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(pence_to_pounds(47.0), "£0.47");
        assert_eq!(pence_to_pounds(80.0), "£0.80");
        assert_eq!(pence_to_pounds(113.4298), "£1.13");
    }
}
