use reqwest::{header::AUTHORIZATION, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tariff_client::domain::{ConsumptionInterval, RateWindow, TariffAgreement};
use time::Date;

use super::{
    schema::{
        scrub_keys, AcceptTermsData, AccountData, AccountRestWire, ConsumptionWire, GraphQlResponse, OnboardingData,
        Paged, StandingChargeWire, TelemetryData, TermsData, TokenData, UnitRateWire, SCRUBBED_KEYS,
    },
    Account, ApiError, EnergyApi, Product, ProductDetails, TelemetryReading, UnitRatesSelector,
};
use crate::{cache::ReferenceCache, clock::day_bounds, config::OctopusConfig, reconcile::round4};

const OBTAIN_TOKEN: &str = r#"
mutation ObtainKrakenToken($input: ObtainJSONWebTokenInput!) {
  obtainKrakenToken(input: $input) {
    token
  }
}"#;

const ACCOUNT: &str = r#"
query Account($accountNumber: String!) {
  account(accountNumber: $accountNumber) {
    electricityAgreements(active: true) {
      validFrom
      validTo
      meterPoint {
        meters(includeInactive: false) {
          serialNumber
          smartDevices {
            deviceId
          }
        }
        mpan
      }
      tariff {
        ... on HalfHourlyTariff {
          productCode
          tariffCode
          standingCharge
        }
      }
    }
  }
}"#;

const TELEMETRY: &str = r#"
query smartMeterTelemetry($deviceId: String!, $start: DateTime, $end: DateTime, $grouping: TelemetryGrouping) {
  smartMeterTelemetry(deviceId: $deviceId, start: $start, end: $end, grouping: $grouping) {
    readAt
    consumptionDelta
    costDeltaWithTax
  }
}"#;

const TERMS_VERSION: &str = r#"
query TermsAndConditionsForProduct($productCode: String!) {
  termsAndConditionsForProduct(productCode: $productCode) {
    name
    version
  }
}"#;

const START_ONBOARDING: &str = r#"
mutation StartOnboardingProcess($input: StartSmartOnboardingProcessInput) {
  startOnboardingProcess(input: $input) {
    onboardingProcess {
      id
    }
    productEnrolment {
      id
    }
    possibleErrors {
      message
      code
    }
  }
}"#;

const ACCEPT_TERMS: &str = r#"
mutation AcceptTermsAndConditions($input: AcceptTermsAndConditionsInput!) {
  acceptTermsAndConditions(input: $input) {
    acceptedVersion
  }
}"#;

/// `EnergyApi` over the Octopus Energy REST and GraphQL endpoints.
pub struct OctopusClient {
    http: Client,
    base_url: String,
    api_key: String,
    account_number: String,
    cache: ReferenceCache,
}

impl OctopusClient {
    pub fn new(cfg: &OctopusConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        let mut base_url = cfg.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            api_key: cfg.api_key.clone(),
            account_number: cfg.account_number.clone(),
            cache: ReferenceCache::default(),
        })
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    fn graphql_url(&self) -> String {
        format!("{}graphql/", self.base_url)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("upstream_request_failures_total").increment(1);
            return Err(ApiError::Status(status.as_u16()));
        }
        resp.json::<T>().await.map_err(|e| ApiError::Schema(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, token: Option<&str>) -> Result<T, ApiError> {
        let mut req = self.http.get(url);
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, token);
        }
        self.send_json(req).await
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        tracing::debug!(operation, "graphql request");

        let mut req = self
            .http
            .post(self.graphql_url())
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = token {
            req = req.header(AUTHORIZATION, token);
        }

        let resp: GraphQlResponse<T> = self.send_json(req).await?;
        if !resp.errors.is_empty() {
            let messages: Vec<String> = resp.errors.into_iter().map(|e| e.message).collect();
            return Err(ApiError::GraphQl(messages.join("; ")));
        }
        resp.data
            .ok_or_else(|| ApiError::Schema(format!("{operation}: response has no data")))
    }

    async fn token(&self) -> Result<String, ApiError> {
        self.cache
            .token
            .get_or_try_init(|| async {
                tracing::info!("obtaining API token");
                let data: TokenData = self
                    .graphql(
                        "ObtainKrakenToken",
                        OBTAIN_TOKEN,
                        json!({ "input": { "APIKey": self.api_key } }),
                        None,
                    )
                    .await?;
                Ok(data.obtain_kraken_token.token)
            })
            .await
    }

    fn period_params(date: Date) -> [(&'static str, String); 2] {
        let (from, to) = day_bounds(date);
        [("period_from", from), ("period_to", to)]
    }
}

#[async_trait::async_trait]
impl EnergyApi for OctopusClient {
    async fn account(&self) -> Result<Account, ApiError> {
        let token = self.token().await?;
        let data: AccountData = self
            .graphql(
                "Account",
                ACCOUNT,
                json!({ "accountNumber": self.account_number }),
                Some(&token),
            )
            .await?;

        let account = Account::try_from(data)?;
        tracing::info!(agreements = account.electricity_agreements.len(), "received account info");
        Ok(account)
    }

    async fn past_agreements(&self) -> Result<Vec<TariffAgreement>, ApiError> {
        let token = self.token().await?;
        let url = format!("{}accounts/{}/", self.base_url, self.account_number);

        let mut raw: Value = self.get(&url, Some(&token)).await?;
        scrub_keys(&mut raw, &SCRUBBED_KEYS);
        tracing::debug!(account = %raw, "received past agreements");

        let wire: AccountRestWire = serde_json::from_value(raw).map_err(|e| ApiError::Schema(e.to_string()))?;
        wire.into_agreements()
    }

    async fn telemetry(&self, device_id: &str, date: Date) -> Result<Vec<TelemetryReading>, ApiError> {
        let token = self.token().await?;
        let (start, end) = day_bounds(date);
        let data: TelemetryData = self
            .graphql(
                "smartMeterTelemetry",
                TELEMETRY,
                json!({ "deviceId": device_id, "start": start, "end": end, "grouping": "HALF_HOURLY" }),
                Some(&token),
            )
            .await?;

        tracing::info!(%date, "received half hourly telemetry");
        data.into_readings()
    }

    async fn products(&self) -> Result<Vec<Product>, ApiError> {
        self.cache
            .products
            .get_or_try_init(|| async {
                let url = format!(
                    "{}products/?brand=OCTOPUS_ENERGY&is_business=false&is_variable=true&is_prepay=false",
                    self.base_url
                );
                tracing::info!("fetching product catalogue");
                let page: Paged<Product> = self.get(&url, None).await?;
                Ok(page.results)
            })
            .await
    }

    async fn product_details(&self, url: &str) -> Result<ProductDetails, ApiError> {
        tracing::info!(url, "fetching product details");
        self.get(url, None).await
    }

    async fn unit_rates(&self, selector: &UnitRatesSelector, date: Date) -> Result<Vec<RateWindow>, ApiError> {
        let link = match selector {
            UnitRatesSelector::Codes { product_code, tariff_code } => format!(
                "{}products/{product_code}/electricity-tariffs/{tariff_code}/standard-unit-rates/",
                self.base_url
            ),
            UnitRatesSelector::Url(url) => url.clone(),
        };

        tracing::info!(url = %link, %date, "fetching unit rates");
        let page: Paged<UnitRateWire> = self
            .send_json(self.http.get(&link).query(&Self::period_params(date)))
            .await?;
        page.into_rate_windows()
    }

    async fn standing_charge(&self, product_code: &str, tariff_code: &str, date: Date) -> Result<f64, ApiError> {
        let token = self.token().await?;
        let url = format!(
            "{}products/{product_code}/electricity-tariffs/{tariff_code}/standing-charges/",
            self.base_url
        );

        let page: Paged<StandingChargeWire> = self
            .send_json(
                self.http
                    .get(&url)
                    .query(&Self::period_params(date))
                    .header(AUTHORIZATION, token),
            )
            .await?;

        page.results
            .first()
            .map(|s| round4(s.value_inc_vat))
            .ok_or_else(|| ApiError::Schema(format!("no standing charge for {tariff_code} on {date}")))
    }

    async fn consumption(&self, mpan: &str, serial_number: &str, date: Date) -> Result<Vec<ConsumptionInterval>, ApiError> {
        let token = self.token().await?;
        let url = format!(
            "{}electricity-meter-points/{mpan}/meters/{serial_number}/consumption/",
            self.base_url
        );
        let [from, to] = Self::period_params(date);

        tracing::info!(%date, "fetching consumption");
        let page: Paged<ConsumptionWire> = self
            .send_json(
                self.http
                    .get(&url)
                    .query(&[from, to, ("order_by", "period".to_string())])
                    .header(AUTHORIZATION, token),
            )
            .await?;
        page.into_intervals()
    }

    async fn terms_version(&self, product_code: &str) -> Result<String, ApiError> {
        let data: TermsData = self
            .graphql(
                "TermsAndConditionsForProduct",
                TERMS_VERSION,
                json!({ "productCode": product_code }),
                None,
            )
            .await?;
        Ok(data.terms_and_conditions_for_product.version)
    }

    async fn start_onboarding(&self, mpan: &str, product_code: &str, change_date: Date) -> Result<String, ApiError> {
        let token = self.token().await?;
        let data: OnboardingData = self
            .graphql(
                "StartOnboardingProcess",
                START_ONBOARDING,
                json!({
                    "input": {
                        "accountNumber": self.account_number,
                        "mpan": mpan,
                        "productCode": product_code,
                        "targetAgreementChangeDate": change_date.to_string(),
                    }
                }),
                Some(&token),
            )
            .await?;

        let process = data.start_onboarding_process;
        if let Some(errors) = process.possible_errors.as_ref().filter(|e| !e.is_empty()) {
            for e in errors {
                tracing::warn!(code = %e.code, message = %e.message, "onboarding reported a possible error");
            }
        }
        Ok(process.product_enrolment.id)
    }

    async fn accept_terms(&self, enrolment_id: &str, version_major: u32, version_minor: u32) -> Result<String, ApiError> {
        let token = self.token().await?;
        let data: AcceptTermsData = self
            .graphql(
                "AcceptTermsAndConditions",
                ACCEPT_TERMS,
                json!({
                    "input": {
                        "accountNumber": self.account_number,
                        "enrolmentId": enrolment_id,
                        "termsVersion": { "versionMajor": version_major, "versionMinor": version_minor },
                    }
                }),
                Some(&token),
            )
            .await?;
        Ok(data.accept_terms_and_conditions.accepted_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer) -> OctopusClient {
        OctopusClient::new(&OctopusConfig {
            base_url: format!("{}/v1/", server.uri()),
            api_key: "sk_test".to_string(),
            account_number: "A-123".to_string(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/graphql/"))
            .and(body_partial_json(json!({ "variables": { "input": { "APIKey": "sk_test" } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "obtainKrakenToken": { "token": "jwt-1" } }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_is_fetched_once_and_sent_raw() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/electricity-meter-points/100/meters/S1/consumption/"))
            .and(header("authorization", "jwt-1"))
            .and(query_param("period_from", "2025-03-01T00:00:00Z"))
            .and(query_param("period_to", "2025-03-01T23:59:59Z"))
            .and(query_param("order_by", "period"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "consumption": 0.25, "interval_start": "2025-03-01T00:00:00Z" }]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.consumption("100", "S1", date!(2025-03-01)).await.unwrap();
        let second = client.consumption("100", "S1", date!(2025-03-01)).await.unwrap();

        assert_eq!(first[0].consumption_delta_wh, 250.0);
        assert_eq!(first, second);
        assert_eq!(client.cache().token.get().as_deref(), Some("jwt-1"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/products/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).products().await.unwrap_err();
        assert!(matches!(err, ApiError::Status(503)));
        assert_eq!(err.to_string(), "Request failed with status 503");
    }

    #[tokio::test]
    async fn graphql_errors_surface_as_graphql_variant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/graphql/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "Product not found" }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).terms_version("GO-VAR-22-10-14").await.unwrap_err();
        assert!(matches!(err, ApiError::GraphQl(ref m) if m == "Product not found"));
    }

    #[tokio::test]
    async fn standing_charge_is_rounded_and_catalogue_cached() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/v1/products/AGILE-24-10-01/electricity-tariffs/E-1R-AGILE-24-10-01-A/standing-charges/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "value_inc_vat": 48.788099999 }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1/products/"))
            .and(query_param("brand", "OCTOPUS_ENERGY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "code": "GO-VAR-22-10-14",
                    "display_name": "Octopus Go",
                    "direction": "IMPORT",
                    "links": [{ "href": "https://example.test/go", "rel": "self" }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let charge = client
            .standing_charge("AGILE-24-10-01", "E-1R-AGILE-24-10-01-A", date!(2025-03-01))
            .await
            .unwrap();
        assert_eq!(charge, 48.7881);

        let a = client.products().await.unwrap();
        let b = client.products().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].display_name, "Octopus Go");
    }
}
