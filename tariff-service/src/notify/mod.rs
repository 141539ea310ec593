pub mod email;

use std::fmt::Write as _;

use crate::{decision::TariffCost, reconcile::pence_to_pounds};

pub use email::EmailNotifier;

const SUBJECT_PREFIX: &str = "Octopus Tariff Switcher: ";

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send email: {0}")]
    Send(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    CheaperTariffExists,
    AlreadyOnCheapest,
    NotWorthSwitching,
}

impl NotificationKind {
    fn title(&self) -> &'static str {
        match self {
            NotificationKind::CheaperTariffExists => "Cheaper Tariff Found",
            NotificationKind::AlreadyOnCheapest => "You are already on the cheapest tariff",
            NotificationKind::NotWorthSwitching => "Not worth switching tariff",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Plain-text summary of a decision run. `tariffs_by_cost` is cheapest
    /// first.
    pub fn build(kind: NotificationKind, tariffs_by_cost: &[TariffCost], current: &TariffCost) -> Self {
        let title = kind.title();
        let cheapest = tariffs_by_cost.first().unwrap_or(current);

        let mut body = String::new();
        let _ = writeln!(body, "{title}.\n");
        let _ = writeln!(body, "{:<24}{}", "Tariff", "Cost");
        for tariff in tariffs_by_cost {
            let _ = writeln!(body, "{:<24}{}", tariff.display_name, pence_to_pounds(tariff.cost_pence));
        }
        body.push('\n');

        match kind {
            NotificationKind::CheaperTariffExists => {
                let _ = writeln!(
                    body,
                    "You are currently on {}. I have automatically switched to {} as it is cheaper.",
                    current.display_name, cheapest.display_name
                );
                let _ = writeln!(
                    body,
                    "You will pay {} versus {}, saving {}.",
                    pence_to_pounds(cheapest.cost_pence),
                    pence_to_pounds(current.cost_pence),
                    pence_to_pounds(current.cost_pence - cheapest.cost_pence)
                );
            }
            NotificationKind::AlreadyOnCheapest => {
                let _ = writeln!(
                    body,
                    "You are currently on {}. It isn't worth switching as the other tariffs are more expensive.",
                    current.display_name
                );
            }
            NotificationKind::NotWorthSwitching => {
                let _ = writeln!(
                    body,
                    "You are currently on {}. It isn't worth switching to the other tariffs as the saving is too little.",
                    current.display_name
                );
            }
        }

        Self {
            kind,
            subject: format!("{SUBJECT_PREFIX}{title}"),
            body,
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Used when no `[email]` section is configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(subject = %notification.subject, "email not configured, notification logged only");
        Ok(())
    }
}
