#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tariff_client::domain::{ConsumptionInterval, DailyTariffQuote, RateWindow, TariffAgreement};
use tariff_service::{
    clock::FixedClock,
    decision::SwitchOptions,
    delivery::{DeliveryError, DeliveryOptions, DeliverySink, SinkResponse, WorkItem},
    enrich::EnrichOptions,
    notify::{Notification, Notifier, NotifyError},
    upstream::{
        Account, ApiError, Direction, ElectricityAgreement, EnergyApi, Link, Meter, Product, ProductDetails,
        RegionTariff, RegionTariffs, TelemetryReading, UnitRatesSelector,
    },
    JobContext,
};
use time::{Date, Duration, OffsetDateTime, Time};

pub const MPAN: &str = "1900000000001";
pub const AGILE_CODE: &str = "E-1R-AGILE-24-10-01-C";

/// A priced alternative: catalogue product plus region terms and rates.
#[derive(Clone)]
pub struct Offer {
    pub display_name: &'static str,
    pub product_code: &'static str,
    pub standing_charge: f64,
    pub unit_rate: f64,
}

/// In-memory supplier API. Every call is recorded by name.
pub struct FakeApi {
    pub today: Date,
    pub current_standing_charge: f64,
    pub telemetry: Vec<TelemetryReading>,
    pub offers: Vec<Offer>,
    /// Whether the switched agreement shows up after onboarding.
    pub switch_becomes_visible: bool,
    pub history_standing_charge: f64,
    pub history_unit_rate: f64,
    /// The next consumption fetch for this date fails once.
    pub fail_consumption_once: Mutex<Option<Date>>,
    pub calls: Mutex<Vec<String>>,
    switched: Mutex<bool>,
}

impl FakeApi {
    pub fn new(today: Date) -> Self {
        Self {
            today,
            current_standing_charge: 40.0,
            telemetry: Vec::new(),
            offers: Vec::new(),
            switch_becomes_visible: true,
            history_standing_charge: 40.0,
            history_unit_rate: 20.0,
            fail_consumption_once: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            switched: Mutex::new(false),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, name: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(name)).collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn offer_for_url(&self, url: &str) -> Option<&Offer> {
        self.offers.iter().find(|o| url.contains(o.product_code))
    }
}

pub fn midnight(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

/// Two half-hour readings of `wh` starting at `first` (offset from midnight).
pub fn readings(date: Date, first: Duration, wh: f64) -> Vec<ConsumptionInterval> {
    let start = midnight(date) + first;
    vec![
        ConsumptionInterval::new(start, wh),
        ConsumptionInterval::new(start + Duration::minutes(30), wh),
    ]
}

#[async_trait::async_trait]
impl EnergyApi for FakeApi {
    async fn account(&self) -> Result<Account, ApiError> {
        self.record("account".to_string());

        let switched = *self.switched.lock().unwrap() && self.switch_becomes_visible;
        let valid_from = if switched {
            midnight(self.today)
        } else {
            midnight(self.today) - Duration::days(400)
        };

        Ok(Account {
            electricity_agreements: vec![ElectricityAgreement {
                valid_from,
                valid_to: None,
                mpan: MPAN.to_string(),
                meters: vec![Meter {
                    serial_number: "21L0000001".to_string(),
                    device_ids: vec!["00-11-22-33".to_string()],
                }],
                product_code: "AGILE-24-10-01".to_string(),
                tariff_code: AGILE_CODE.to_string(),
                standing_charge: self.current_standing_charge,
            }],
        })
    }

    async fn past_agreements(&self) -> Result<Vec<TariffAgreement>, ApiError> {
        self.record("past_agreements".to_string());
        Ok(vec![TariffAgreement {
            tariff_code: AGILE_CODE.to_string(),
            valid_from: midnight(self.today) - Duration::days(400),
            valid_to: None,
        }])
    }

    async fn telemetry(&self, device_id: &str, date: Date) -> Result<Vec<TelemetryReading>, ApiError> {
        self.record(format!("telemetry {device_id} {date}"));
        Ok(self.telemetry.clone())
    }

    async fn products(&self) -> Result<Vec<Product>, ApiError> {
        self.record("products".to_string());

        let mut products = Vec::new();
        for o in &self.offers {
            // Export twins share the display name and must be skipped.
            products.push(Product {
                code: format!("OUTGOING-{}", o.product_code),
                display_name: o.display_name.to_string(),
                direction: Direction::Export,
                links: vec![],
            });
            products.push(Product {
                code: o.product_code.to_string(),
                display_name: o.display_name.to_string(),
                direction: Direction::Import,
                links: vec![Link {
                    href: format!("https://api.test/v1/products/{}/", o.product_code),
                    rel: "self".to_string(),
                }],
            });
        }
        Ok(products)
    }

    async fn product_details(&self, url: &str) -> Result<ProductDetails, ApiError> {
        self.record(format!("product_details {url}"));
        let offer = self.offer_for_url(url).ok_or(ApiError::Status(404))?;

        let terms = RegionTariff {
            standing_charge_inc_vat: offer.standing_charge,
            links: vec![Link {
                href: format!("https://api.test/v1/products/{}/standard-unit-rates/", offer.product_code),
                rel: "standard_unit_rates".to_string(),
            }],
        };
        Ok(ProductDetails {
            single_register_electricity_tariffs: HashMap::from([(
                "_C".to_string(),
                RegionTariffs {
                    direct_debit_monthly: None,
                    varying: Some(terms),
                },
            )]),
        })
    }

    async fn unit_rates(&self, selector: &UnitRatesSelector, date: Date) -> Result<Vec<RateWindow>, ApiError> {
        let rate = match selector {
            UnitRatesSelector::Url(url) => {
                self.record(format!("unit_rates {url} {date}"));
                self.offer_for_url(url).ok_or(ApiError::Status(404))?.unit_rate
            }
            UnitRatesSelector::Codes { tariff_code, .. } => {
                self.record(format!("unit_rates {tariff_code} {date}"));
                self.history_unit_rate
            }
        };

        Ok(vec![RateWindow::new(
            midnight(date),
            midnight(date) + Duration::DAY,
            rate,
        )])
    }

    async fn standing_charge(&self, _product_code: &str, tariff_code: &str, date: Date) -> Result<f64, ApiError> {
        self.record(format!("standing_charge {tariff_code} {date}"));
        Ok(self.history_standing_charge)
    }

    async fn consumption(&self, mpan: &str, _serial_number: &str, date: Date) -> Result<Vec<ConsumptionInterval>, ApiError> {
        self.record(format!("consumption {mpan} {date}"));

        let mut fail = self.fail_consumption_once.lock().unwrap();
        if *fail == Some(date) {
            *fail = None;
            return Err(ApiError::Status(503));
        }
        Ok(readings(date, Duration::ZERO, 500.0))
    }

    async fn terms_version(&self, product_code: &str) -> Result<String, ApiError> {
        self.record(format!("terms_version {product_code}"));
        Ok("3.1".to_string())
    }

    async fn start_onboarding(&self, mpan: &str, product_code: &str, change_date: Date) -> Result<String, ApiError> {
        self.record(format!("start_onboarding {mpan} {product_code} {change_date}"));
        *self.switched.lock().unwrap() = true;
        Ok("enrol-1".to_string())
    }

    async fn accept_terms(&self, enrolment_id: &str, version_major: u32, version_minor: u32) -> Result<String, ApiError> {
        self.record(format!("accept_terms {enrolment_id} {version_major}.{version_minor}"));
        Ok(format!("{version_major}.{version_minor}"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Queue stand-in. `reject` lists, per call, the ids to fail; `"*"` fails
/// the whole batch. Calls past the end of the script accept everything.
pub struct RecordingQueue {
    pub batches: Mutex<Vec<Vec<(String, String)>>>,
    pub reject: Vec<Vec<&'static str>>,
    pub reject_forever: bool,
}

impl RecordingQueue {
    pub fn accepting() -> Self {
        Self::scripted(vec![])
    }

    pub fn scripted(reject: Vec<Vec<&'static str>>) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            reject,
            reject_forever: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            reject_forever: true,
            ..Self::accepting()
        }
    }

    pub fn batches(&self) -> Vec<Vec<(String, String)>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DeliverySink<DailyTariffQuote> for RecordingQueue {
    fn label(&self) -> &str {
        "Failed queue messages"
    }

    async fn send_batch(&self, batch: &[WorkItem<DailyTariffQuote>]) -> Result<SinkResponse, DeliveryError> {
        let mut batches = self.batches.lock().unwrap();
        batches.push(batch.iter().map(|w| (w.id.clone(), w.dedup_key.clone())).collect());

        let script = if self.reject_forever {
            Some(vec!["*"])
        } else {
            self.reject.get(batches.len() - 1).cloned()
        };
        let rejected: Vec<String> = match script {
            Some(ids) if ids.contains(&"*") => batch.iter().map(|w| w.id.clone()).collect(),
            Some(ids) => batch
                .iter()
                .filter(|w| ids.contains(&w.id.as_str()))
                .map(|w| w.id.clone())
                .collect(),
            None => vec![],
        };

        if rejected.is_empty() {
            Ok(SinkResponse::accepted())
        } else {
            Ok(SinkResponse::rejected(rejected, "Failed queue messages"))
        }
    }
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub notifier: Arc<RecordingNotifier>,
    pub queue: Arc<RecordingQueue>,
    pub ctx: JobContext,
}

pub fn harness(api: FakeApi, now: OffsetDateTime, queue: RecordingQueue, switch: SwitchOptions) -> Harness {
    let api = Arc::new(api);
    let notifier = Arc::new(RecordingNotifier::default());
    let queue = Arc::new(queue);

    let ctx = JobContext {
        api: api.clone(),
        notifier: notifier.clone(),
        clock: Arc::new(FixedClock(now)),
        queue: queue.clone(),
        enrich: EnrichOptions::default(),
        switch,
        queue_delivery: DeliveryOptions::with_batch_size(10),
    };

    Harness {
        api,
        notifier,
        queue,
        ctx,
    }
}
