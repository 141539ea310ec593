//! Boundary to the energy supplier's API.

mod octopus;
pub mod schema;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tariff_client::domain::{ConsumptionInterval, RateWindow, TariffAgreement};
use time::{Date, OffsetDateTime};

pub use octopus::OctopusClient;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request failed with status {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Schema(String),
    #[error("upstream returned errors: {0}")]
    GraphQl(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub electricity_agreements: Vec<ElectricityAgreement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectricityAgreement {
    pub valid_from: OffsetDateTime,
    pub valid_to: Option<OffsetDateTime>,
    pub mpan: String,
    pub meters: Vec<Meter>,
    pub product_code: String,
    pub tariff_code: String,
    pub standing_charge: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meter {
    pub serial_number: String,
    pub device_ids: Vec<String>,
}

/// One half-hour of smart meter telemetry, already priced upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryReading {
    pub read_at: OffsetDateTime,
    pub consumption_delta_wh: f64,
    pub cost_delta_with_tax: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Import,
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

pub fn find_link<'a>(links: &'a [Link], rel: &str) -> Option<&'a str> {
    links.iter().find(|l| l.rel == rel).map(|l| l.href.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub display_name: String,
    pub direction: Direction,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductDetails {
    /// Keyed by region, e.g. `_A`.
    pub single_register_electricity_tariffs: HashMap<String, RegionTariffs>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionTariffs {
    pub direct_debit_monthly: Option<RegionTariff>,
    pub varying: Option<RegionTariff>,
}

impl RegionTariffs {
    pub fn preferred(&self) -> Option<&RegionTariff> {
        self.direct_debit_monthly.as_ref().or(self.varying.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionTariff {
    pub standing_charge_inc_vat: f64,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Where to read unit rates from.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitRatesSelector {
    Codes { product_code: String, tariff_code: String },
    Url(String),
}

#[async_trait::async_trait]
pub trait EnergyApi: Send + Sync {
    /// The account's active electricity agreements.
    async fn account(&self) -> Result<Account, ApiError>;

    /// Every agreement the account has held, newest and oldest alike.
    async fn past_agreements(&self) -> Result<Vec<TariffAgreement>, ApiError>;

    async fn telemetry(&self, device_id: &str, date: Date) -> Result<Vec<TelemetryReading>, ApiError>;

    async fn products(&self) -> Result<Vec<Product>, ApiError>;

    async fn product_details(&self, url: &str) -> Result<ProductDetails, ApiError>;

    async fn unit_rates(&self, selector: &UnitRatesSelector, date: Date) -> Result<Vec<RateWindow>, ApiError>;

    /// Pence per day, rounded to 4 places.
    async fn standing_charge(&self, product_code: &str, tariff_code: &str, date: Date) -> Result<f64, ApiError>;

    async fn consumption(&self, mpan: &str, serial_number: &str, date: Date) -> Result<Vec<ConsumptionInterval>, ApiError>;

    /// Current terms version for a product as `major.minor`.
    async fn terms_version(&self, product_code: &str) -> Result<String, ApiError>;

    /// Returns the product enrolment id.
    async fn start_onboarding(&self, mpan: &str, product_code: &str, change_date: Date) -> Result<String, ApiError>;

    /// Returns the accepted version as reported upstream.
    async fn accept_terms(&self, enrolment_id: &str, version_major: u32, version_minor: u32) -> Result<String, ApiError>;
}
