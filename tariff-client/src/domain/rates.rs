use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::consumption::epoch_ms;

/// A period during which a fixed per-kWh unit cost applies.
///
/// Upstream windows are expected to be contiguous and non-overlapping for a
/// given tariff and day, but nothing enforces that; callers match first-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RateWindowWire")]
pub struct RateWindow {
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_to: OffsetDateTime,
    pub valid_from_ms: i64,
    pub valid_to_ms: i64,
    pub unit_cost_pence_per_kwh: f64,
}

impl RateWindow {
    pub fn new(valid_from: OffsetDateTime, valid_to: OffsetDateTime, unit_cost_pence_per_kwh: f64) -> Self {
        Self {
            valid_from,
            valid_to,
            valid_from_ms: epoch_ms(valid_from),
            valid_to_ms: epoch_ms(valid_to),
            unit_cost_pence_per_kwh,
        }
    }
}

/// Decoded form of a window. The epoch fields are always derived from the
/// timestamps, never trusted from the payload.
#[derive(Deserialize)]
struct RateWindowWire {
    #[serde(with = "time::serde::rfc3339")]
    valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    valid_to: OffsetDateTime,
    unit_cost_pence_per_kwh: f64,
}

impl From<RateWindowWire> for RateWindow {
    fn from(w: RateWindowWire) -> Self {
        Self::new(w.valid_from, w.valid_to, w.unit_cost_pence_per_kwh)
    }
}
