use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Milliseconds since the Unix epoch, used for fast window comparisons.
pub fn epoch_ms(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// A single metered reading: energy used between `read_at` and the next reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConsumptionWire")]
pub struct ConsumptionInterval {
    #[serde(with = "time::serde::rfc3339")]
    pub read_at: OffsetDateTime,
    pub read_at_ms: i64,
    pub consumption_delta_wh: f64,
}

impl ConsumptionInterval {
    pub fn new(read_at: OffsetDateTime, consumption_delta_wh: f64) -> Self {
        Self {
            read_at,
            read_at_ms: epoch_ms(read_at),
            consumption_delta_wh,
        }
    }

    pub fn consumption_kwh(&self) -> f64 {
        self.consumption_delta_wh / 1000.0
    }
}

#[derive(Deserialize)]
struct ConsumptionWire {
    #[serde(with = "time::serde::rfc3339")]
    read_at: OffsetDateTime,
    consumption_delta_wh: f64,
}

impl From<ConsumptionWire> for ConsumptionInterval {
    fn from(w: ConsumptionWire) -> Self {
        Self::new(w.read_at, w.consumption_delta_wh)
    }
}
