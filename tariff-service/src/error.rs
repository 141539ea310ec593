use time::Date;

use crate::{delivery::DeliveryError, notify::NotifyError, reconcile::MatchingRateError, upstream::ApiError};

#[derive(thiserror::Error, Debug)]
pub enum SwitcherError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    MatchingRate(#[from] MatchingRateError),
    #[error("No matching tariff for: {tariff_code}")]
    UnknownTariff { tariff_code: String },
    #[error("{0}")]
    UnknownProduct(String),
    #[error("Unable to find matching tariff for date: {0}")]
    NoMatchingAgreement(Date),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("Unable to verify new agreement after multiple retries. Please check your account and emails.")]
    AgreementVerification,
}

impl SwitcherError {
    pub fn status_code(&self) -> u16 {
        match self {
            SwitcherError::Validation(_) => 400,
            SwitcherError::Api(ApiError::Schema(_)) => 400,
            _ => 500,
        }
    }
}
