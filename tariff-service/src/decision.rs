//! Daily tariff decision: price today's usage on every tariff and switch
//! when another one is worth it.

use std::{sync::Arc, time::Duration};

use tariff_client::domain::{ConsumptionInterval, TariffCandidate, TariffId, TARIFFS};
use time::UtcOffset;

use crate::{
    clock::Clock,
    error::SwitcherError,
    notify::{Notification, NotificationKind, Notifier},
    reconcile::{daily_cost_in_pence, match_rates, pence_to_pounds, round4, total_cost, BoundaryRule},
    upstream::{find_link, ApiError, Direction, EnergyApi, UnitRatesSelector},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TariffCost {
    pub id: TariffId,
    pub display_name: String,
    pub cost_pence: f64,
}

#[derive(Debug, Clone)]
pub struct SwitchOptions {
    pub dry_run: bool,
    /// Savings at or below this many pence are not worth a switch.
    pub min_saving_pence: f64,
    pub settle_delay: Duration,
    pub verify_attempts: u32,
    pub verify_delay: Duration,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            min_saving_pence: 2.0,
            settle_delay: Duration::from_secs(60),
            verify_attempts: 3,
            verify_delay: Duration::from_secs(20),
        }
    }
}

/// What the account is on right now.
#[derive(Debug, Clone)]
pub struct CurrentTariff {
    pub tariff: &'static TariffCandidate,
    pub tariff_code: String,
    pub product_code: String,
    pub standing_charge: f64,
    pub region_code: char,
    pub mpan: String,
    pub serial_number: String,
    pub device_id: String,
}

#[derive(Debug, Clone)]
pub struct PotentialTariff {
    pub product_code: String,
    pub standing_charge: f64,
    pub cost_pence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyCheapest,
    NotWorthSwitching,
    Switch,
}

impl Outcome {
    fn notification_kind(&self) -> NotificationKind {
        match self {
            Outcome::AlreadyCheapest => NotificationKind::AlreadyOnCheapest,
            Outcome::NotWorthSwitching => NotificationKind::NotWorthSwitching,
            Outcome::Switch => NotificationKind::CheaperTariffExists,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub outcome: Outcome,
    pub message: String,
    pub tariffs_by_cost: Vec<TariffCost>,
    pub notification: Notification,
}

/// Stable sort by cost with `current` placed first, so it wins ties.
pub fn rank_tariffs(current: TariffCost, others: Vec<TariffCost>) -> Vec<TariffCost> {
    let mut all = Vec::with_capacity(others.len() + 1);
    all.push(current);
    all.extend(others);
    all.sort_by(|a, b| a.cost_pence.total_cmp(&b.cost_pence));
    all
}

pub fn decide(tariffs_by_cost: &[TariffCost], current: &TariffCost, min_saving_pence: f64) -> Outcome {
    match tariffs_by_cost.first() {
        None => Outcome::AlreadyCheapest,
        Some(cheapest) if cheapest.id == current.id => Outcome::AlreadyCheapest,
        Some(cheapest) if current.cost_pence - cheapest.cost_pence <= min_saving_pence => Outcome::NotWorthSwitching,
        Some(_) => Outcome::Switch,
    }
}

/// `"3.1"` -> `(3, 1)`
pub fn parse_terms_version(version: &str) -> Result<(u32, u32), SwitcherError> {
    let mut parts = version.split('.').map(|p| p.trim().parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => Ok((major, minor)),
        _ => Err(ApiError::Schema(format!("Missing versions in terms & conditions: {version}")).into()),
    }
}

pub struct TariffSwitcher {
    api: Arc<dyn EnergyApi>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    options: SwitchOptions,
}

impl TariffSwitcher {
    pub fn new(
        api: Arc<dyn EnergyApi>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: SwitchOptions,
    ) -> Self {
        Self {
            api,
            notifier,
            clock,
            options,
        }
    }

    pub async fn current_tariff(&self) -> Result<CurrentTariff, SwitcherError> {
        let account = self.api.account().await?;
        let agreement = account
            .electricity_agreements
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Schema("account has no active electricity agreement".to_string()))?;
        let meter = agreement
            .meters
            .first()
            .ok_or_else(|| ApiError::Schema("agreement has no meter".to_string()))?;
        let device_id = meter
            .device_ids
            .first()
            .ok_or_else(|| ApiError::Schema("meter has no smart device".to_string()))?
            .clone();
        let serial_number = meter.serial_number.clone();

        let tariff = TariffCandidate::for_tariff_code(&agreement.tariff_code).ok_or_else(|| {
            SwitcherError::UnknownTariff {
                tariff_code: agreement.tariff_code.clone(),
            }
        })?;
        let region_code = agreement
            .tariff_code
            .chars()
            .last()
            .ok_or_else(|| ApiError::Schema("empty tariff code".to_string()))?;

        Ok(CurrentTariff {
            tariff,
            region_code,
            standing_charge: round4(agreement.standing_charge),
            tariff_code: agreement.tariff_code,
            product_code: agreement.product_code,
            mpan: agreement.mpan,
            serial_number,
            device_id,
        })
    }

    /// Price `candidate` against `consumption` using today's published rates.
    pub async fn potential_tariff(
        &self,
        candidate: &TariffCandidate,
        region_code: char,
        consumption: &[ConsumptionInterval],
    ) -> Result<PotentialTariff, SwitcherError> {
        let products = self.api.products().await?;
        let product = products
            .iter()
            .find(|p| p.display_name == candidate.display_name && p.direction == Direction::Import)
            .ok_or_else(|| {
                SwitcherError::UnknownProduct(format!("Unable to find valid product using: {}", candidate.display_name))
            })?;
        tracing::info!(tariff = candidate.display_name, product = %product.code, "found matching product");

        let self_link = find_link(&product.links, "self")
            .ok_or_else(|| SwitcherError::UnknownProduct("Unable to find self link for product".to_string()))?;
        let details = self.api.product_details(self_link).await?;

        let region_key = format!("_{region_code}");
        let region = details
            .single_register_electricity_tariffs
            .get(&region_key)
            .ok_or_else(|| SwitcherError::UnknownProduct(format!("Region code not found in product: {region_key}")))?;
        let terms = region.preferred().ok_or_else(|| {
            SwitcherError::UnknownProduct(format!(
                "Standing charge including VAT not found for region: {region_key}."
            ))
        })?;
        let rates_link = find_link(&terms.links, "standard_unit_rates").ok_or_else(|| {
            SwitcherError::UnknownProduct(format!("Standard unit rates link not found for region: {region_key}"))
        })?;

        let rates = self
            .api
            .unit_rates(&UnitRatesSelector::Url(rates_link.to_string()), self.clock.today())
            .await?;
        let standing_charge = round4(terms.standing_charge_inc_vat);
        let costed = match_rates(consumption, &rates, BoundaryRule::StartExclusive)?;

        Ok(PotentialTariff {
            product_code: product.code.clone(),
            standing_charge,
            cost_pence: total_cost(&costed, standing_charge),
        })
    }

    pub async fn run(&self) -> Result<Decision, SwitcherError> {
        let today = self.clock.today();
        let current = self.current_tariff().await?;
        tracing::info!(tariff = current.tariff.display_name, region = %current.region_code, "current tariff");

        let telemetry = self.api.telemetry(&current.device_id, today).await?;
        let unit_costs: Vec<f64> = telemetry.iter().map(|t| t.cost_delta_with_tax).collect();
        let current_cost = TariffCost {
            id: current.tariff.id,
            display_name: current.tariff.display_name.to_string(),
            cost_pence: daily_cost_in_pence(&unit_costs, current.standing_charge),
        };

        let consumption: Vec<ConsumptionInterval> = telemetry
            .iter()
            .map(|t| ConsumptionInterval::new(t.read_at, t.consumption_delta_wh))
            .collect();

        let mut others = Vec::new();
        let mut product_codes = Vec::new();
        for candidate in TARIFFS.iter().filter(|t| t.id != current.tariff.id) {
            let potential = self.potential_tariff(candidate, current.region_code, &consumption).await?;
            tracing::info!(tariff = candidate.display_name, cost_pence = potential.cost_pence, "potential cost");
            product_codes.push((candidate.id, potential.product_code));
            others.push(TariffCost {
                id: candidate.id,
                display_name: candidate.display_name.to_string(),
                cost_pence: potential.cost_pence,
            });
        }

        let tariffs_by_cost = rank_tariffs(current_cost.clone(), others);
        let outcome = decide(&tariffs_by_cost, &current_cost, self.options.min_saving_pence);
        let cheapest = tariffs_by_cost.first().cloned().unwrap_or_else(|| current_cost.clone());

        let mut message = match outcome {
            Outcome::AlreadyCheapest => format!(
                "You are already on the cheapest tariff: {} - {}",
                current_cost.display_name,
                pence_to_pounds(current_cost.cost_pence)
            ),
            Outcome::NotWorthSwitching => format!(
                "Not worth switching to {} from {}",
                cheapest.display_name, current_cost.display_name
            ),
            Outcome::Switch => format!(
                "Going to switch to {} - {} from {} - {}",
                cheapest.display_name,
                pence_to_pounds(cheapest.cost_pence),
                current_cost.display_name,
                pence_to_pounds(current_cost.cost_pence)
            ),
        };

        if outcome == Outcome::Switch && !self.options.dry_run {
            let product_code = product_codes
                .iter()
                .find(|(id, _)| *id == cheapest.id)
                .map(|(_, code)| code.as_str())
                .ok_or_else(|| SwitcherError::UnknownProduct(format!("No product code for {}", cheapest.display_name)))?;
            self.switch_to(&current, product_code).await?;
        }

        let notification = Notification::build(outcome.notification_kind(), &tariffs_by_cost, &current_cost);
        if self.options.dry_run {
            message = format!("DRY RUN: {message}");
        } else {
            self.notifier.send(&notification).await?;
        }

        tracing::info!(outcome = ?outcome, "{message}");
        metrics::counter!("switch_decisions_total").increment(1);

        Ok(Decision {
            outcome,
            message,
            tariffs_by_cost,
            notification,
        })
    }

    async fn switch_to(&self, current: &CurrentTariff, product_code: &str) -> Result<(), SwitcherError> {
        let today = self.clock.today();
        let enrolment_id = self.api.start_onboarding(&current.mpan, product_code, today).await?;
        tracing::info!(product = product_code, enrolment = %enrolment_id, "onboarding started");

        tokio::time::sleep(self.options.settle_delay).await;

        let version = self.api.terms_version(product_code).await?;
        let (major, minor) = parse_terms_version(&version)?;
        let accepted = self.api.accept_terms(&enrolment_id, major, minor).await?;
        tracing::info!(accepted = %accepted, "terms accepted");

        self.verify_new_agreement().await
    }

    /// The first agreement must start today in the clock's offset.
    async fn verify_new_agreement(&self) -> Result<(), SwitcherError> {
        let now = self.clock.now();
        let offset: UtcOffset = now.offset();
        let attempts = self.options.verify_attempts.max(1);

        for attempt in 1..=attempts {
            let account = self.api.account().await?;
            let verified = account
                .electricity_agreements
                .first()
                .map(|a| a.valid_from.to_offset(offset).date() == now.date())
                .unwrap_or(false);

            if verified {
                tracing::info!(attempt, "new agreement verified");
                return Ok(());
            }

            tracing::warn!(attempt, "new agreement not visible yet");
            if attempt < attempts {
                tokio::time::sleep(self.options.verify_delay).await;
            }
        }

        Err(SwitcherError::AgreementVerification)
    }
}
