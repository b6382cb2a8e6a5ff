//! HTTP rate sources for the USD to UAH exchange rate.
//!
//! Each fetcher asks one public API. [`default_fetchers`] returns them in the
//! order the cached rate service should try them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{RateError, RateFetcher};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const NBU_RATE_URL: &str =
    "https://bank.gov.ua/NBUStatService/v1/statdirectory/exchange?valcode=USD&json";
pub const FAWAZ_RATE_URL: &str =
    "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1/currencies/usd.json";
pub const PRIVAT_RATE_URL: &str = "https://api.privatbank.ua/p24api/pubinfo?exchange&coursid=5";

/// Upper bound on a single upstream request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the HTTP client shared by all fetchers.
pub fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()
}

/// National Bank of Ukraine, then fawazahmed0 currency API, then PrivatBank.
pub fn default_fetchers(client: reqwest::Client) -> Vec<Arc<dyn RateFetcher>> {
    vec![
        Arc::new(NbuRateFetcher::new(client.clone(), NBU_RATE_URL)),
        Arc::new(FawazRateFetcher::new(client.clone(), FAWAZ_RATE_URL)),
        Arc::new(PrivatRateFetcher::new(client, PRIVAT_RATE_URL)),
    ]
}

async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    source_name: &str,
) -> Result<T, RateError> {
    let source_error = |e: reqwest::Error| RateError::Source {
        source_name: source_name.to_string(),
        message: e.to_string(),
    };

    client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(source_error)?
        .json()
        .await
        .map_err(source_error)
}

fn missing(source_name: &str, what: &str) -> RateError {
    RateError::Source {
        source_name: source_name.to_string(),
        message: format!("response has no {what}"),
    }
}

#[derive(Debug, Deserialize)]
struct NbuEntry {
    cc: String,
    rate: f64,
}

fn nbu_rate(entries: &[NbuEntry]) -> Option<f64> {
    entries
        .iter()
        .find(|entry| entry.cc.eq_ignore_ascii_case("USD"))
        .map(|entry| entry.rate)
}

/// Official rate published by the National Bank of Ukraine.
pub struct NbuRateFetcher {
    client: reqwest::Client,
    url: String,
}

impl NbuRateFetcher {
    pub const NAME: &'static str = "nbu";

    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFetcher for NbuRateFetcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<f64, RateError> {
        let entries: Vec<NbuEntry> = get_json(&self.client, &self.url, Self::NAME).await?;
        nbu_rate(&entries).ok_or_else(|| missing(Self::NAME, "USD entry"))
    }
}

#[derive(Debug, Deserialize)]
struct FawazResponse {
    usd: HashMap<String, f64>,
}

fn fawaz_rate(response: &FawazResponse) -> Option<f64> {
    response.usd.get("uah").copied()
}

/// Daily rates from the fawazahmed0 currency API.
pub struct FawazRateFetcher {
    client: reqwest::Client,
    url: String,
}

impl FawazRateFetcher {
    pub const NAME: &'static str = "fawaz";

    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFetcher for FawazRateFetcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<f64, RateError> {
        let response: FawazResponse = get_json(&self.client, &self.url, Self::NAME).await?;
        fawaz_rate(&response).ok_or_else(|| missing(Self::NAME, "uah rate"))
    }
}

#[derive(Debug, Deserialize)]
struct PrivatEntry {
    ccy: String,
    base_ccy: String,
    sale: String,
}

fn privat_rate(entries: &[PrivatEntry]) -> Result<Option<f64>, std::num::ParseFloatError> {
    entries
        .iter()
        .find(|entry| entry.ccy == "USD" && entry.base_ccy == "UAH")
        .map(|entry| entry.sale.trim().parse())
        .transpose()
}

/// Cash sale rate published by PrivatBank. Values arrive as strings.
pub struct PrivatRateFetcher {
    client: reqwest::Client,
    url: String,
}

impl PrivatRateFetcher {
    pub const NAME: &'static str = "privat";

    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateFetcher for PrivatRateFetcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<f64, RateError> {
        let entries: Vec<PrivatEntry> = get_json(&self.client, &self.url, Self::NAME).await?;
        privat_rate(&entries)
            .map_err(|e| RateError::Source {
                source_name: Self::NAME.to_string(),
                message: e.to_string(),
            })?
            .ok_or_else(|| missing(Self::NAME, "USD/UAH entry"))
    }
}
