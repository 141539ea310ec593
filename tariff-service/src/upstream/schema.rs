//! Wire shapes of upstream responses and their conversion to domain types.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use tariff_client::domain::{ConsumptionInterval, RateWindow, TariffAgreement};
use time::OffsetDateTime;

use super::{Account, ApiError, ElectricityAgreement, Meter, TelemetryReading};

pub const SCRUBBED_KEYS: [&str; 8] = [
    "moved_in_at",
    "moved_out_at",
    "address_line_1",
    "address_line_2",
    "address_line_3",
    "town",
    "county",
    "postcode",
];

/// Replace the value of every `keys` entry, at any depth, with `[SCRUBBED]`.
pub fn scrub_keys(value: &mut Value, keys: &[&str]) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if keys.contains(&k.as_str()) {
                    *v = Value::String("[SCRUBBED]".to_string());
                } else {
                    scrub_keys(v, keys);
                }
            }
        }
        Value::Array(items) => {
            for v in items {
                scrub_keys(v, keys);
            }
        }
        _ => {}
    }
}

/// Numbers that may arrive as JSON strings.
fn number_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn non_empty<T>(items: Vec<T>, what: &str) -> Result<Vec<T>, ApiError> {
    if items.is_empty() {
        Err(ApiError::Schema(format!("no {what} in response")))
    } else {
        Ok(items)
    }
}

// ---- GraphQL ----

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorMessage {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub obtain_kraken_token: TokenWire,
}

#[derive(Debug, Deserialize)]
pub struct TokenWire {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub account: AccountWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountWire {
    pub electricity_agreements: Vec<AgreementWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementWire {
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
    pub meter_point: MeterPointWire,
    pub tariff: AgreementTariffWire,
}

#[derive(Debug, Deserialize)]
pub struct MeterPointWire {
    pub mpan: String,
    pub meters: Vec<MeterWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterWire {
    pub serial_number: String,
    pub smart_devices: Vec<SmartDeviceWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartDeviceWire {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementTariffWire {
    pub product_code: String,
    pub tariff_code: String,
    pub standing_charge: f64,
}

impl TryFrom<AccountData> for Account {
    type Error = ApiError;

    fn try_from(data: AccountData) -> Result<Self, Self::Error> {
        let agreements = non_empty(data.account.electricity_agreements, "electricity agreements")?;

        let electricity_agreements = agreements
            .into_iter()
            .map(|a| {
                let meters = non_empty(a.meter_point.meters, "meters")?
                    .into_iter()
                    .map(|m| {
                        Ok(Meter {
                            serial_number: m.serial_number,
                            device_ids: non_empty(m.smart_devices, "smart devices")?
                                .into_iter()
                                .map(|d| d.device_id)
                                .collect(),
                        })
                    })
                    .collect::<Result<Vec<_>, ApiError>>()?;

                Ok(ElectricityAgreement {
                    valid_from: a.valid_from,
                    valid_to: a.valid_to,
                    mpan: a.meter_point.mpan,
                    meters,
                    product_code: a.tariff.product_code,
                    tariff_code: a.tariff.tariff_code,
                    standing_charge: a.tariff.standing_charge,
                })
            })
            .collect::<Result<Vec<_>, ApiError>>()?;

        Ok(Account { electricity_agreements })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryData {
    pub smart_meter_telemetry: Vec<TelemetryWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryWire {
    #[serde(with = "time::serde::rfc3339")]
    pub read_at: OffsetDateTime,
    #[serde(deserialize_with = "number_from_any")]
    pub consumption_delta: f64,
    #[serde(deserialize_with = "number_from_any")]
    pub cost_delta_with_tax: f64,
}

impl TelemetryData {
    pub fn into_readings(self) -> Result<Vec<TelemetryReading>, ApiError> {
        Ok(non_empty(self.smart_meter_telemetry, "telemetry")?
            .into_iter()
            .map(|t| TelemetryReading {
                read_at: t.read_at,
                consumption_delta_wh: t.consumption_delta,
                cost_delta_with_tax: t.cost_delta_with_tax,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsData {
    pub terms_and_conditions_for_product: TermsWire,
}

#[derive(Debug, Deserialize)]
pub struct TermsWire {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingData {
    pub start_onboarding_process: OnboardingWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingWire {
    pub onboarding_process: Option<IdWire>,
    pub product_enrolment: IdWire,
    #[serde(default)]
    pub possible_errors: Option<Vec<PossibleError>>,
}

#[derive(Debug, Deserialize)]
pub struct IdWire {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PossibleError {
    pub message: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTermsData {
    pub accept_terms_and_conditions: AcceptTermsWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTermsWire {
    pub accepted_version: String,
}

// ---- REST ----

#[derive(Debug, Deserialize)]
pub struct Paged<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct UnitRateWire {
    pub value_inc_vat: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_to: OffsetDateTime,
}

impl Paged<UnitRateWire> {
    pub fn into_rate_windows(self) -> Result<Vec<RateWindow>, ApiError> {
        Ok(non_empty(self.results, "unit rates")?
            .into_iter()
            .map(|r| RateWindow::new(r.valid_from, r.valid_to, r.value_inc_vat))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct StandingChargeWire {
    pub value_inc_vat: f64,
}

#[derive(Debug, Deserialize)]
pub struct ConsumptionWire {
    /// kWh
    pub consumption: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub interval_start: OffsetDateTime,
}

impl Paged<ConsumptionWire> {
    pub fn into_intervals(self) -> Result<Vec<ConsumptionInterval>, ApiError> {
        Ok(non_empty(self.results, "consumption")?
            .into_iter()
            .map(|c| ConsumptionInterval::new(c.interval_start, c.consumption * 1000.0))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountRestWire {
    pub properties: Vec<PropertyWire>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyWire {
    #[serde(default)]
    pub electricity_meter_points: Vec<MeterPointAgreementsWire>,
}

#[derive(Debug, Deserialize)]
pub struct MeterPointAgreementsWire {
    pub agreements: Vec<PastAgreementWire>,
}

#[derive(Debug, Deserialize)]
pub struct PastAgreementWire {
    pub tariff_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_from: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_to: Option<OffsetDateTime>,
}

impl AccountRestWire {
    /// Agreements of the first electricity meter point on the first property.
    pub fn into_agreements(self) -> Result<Vec<TariffAgreement>, ApiError> {
        let point = self
            .properties
            .into_iter()
            .next()
            .and_then(|p| p.electricity_meter_points.into_iter().next())
            .ok_or_else(|| ApiError::Schema("no electricity meter point on account".to_string()))?;

        Ok(non_empty(point.agreements, "agreements")?
            .into_iter()
            .map(|a| TariffAgreement {
                tariff_code: a.tariff_code,
                valid_from: a.valid_from,
                valid_to: a.valid_to,
            })
            .collect())
    }
}
