//! REST client for the account API.
//!
//! Resources are addressed by path only: `/{class}`, `/{class}/{name}/value`
//! and `/networth`, relative to the configured base URL.

use super::util::with_retry;
use crate::core::account::{Account, AccountClass, NetWorthPoint, ValuePoint};
use crate::core::api::AccountApi;
use crate::core::config::ApiConfig;
use crate::core::error::{FetchError, Result};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::{StatusCode, Url};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::str::FromStr;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(alias = "Name")]
    name: String,
    #[serde(default, alias = "Category", alias = "Type")]
    category: Option<String>,
    #[serde(default, rename = "taxBucket", alias = "TaxBucket")]
    tax_bucket: Option<String>,
}

/// Amounts arrive as JSON numbers in some API versions and strings in others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(serde_json::Number),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ValueResponse {
    #[serde(alias = "Value")]
    value: RawAmount,
    #[serde(alias = "Date", alias = "CreatedAt")]
    date: String,
}

pub struct HttpAccountApi {
    base_url: Url,
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl HttpAccountApi {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("API base URL cannot be a base: {}", config.base_url));
        }

        let mut builder = reqwest::Client::builder().user_agent("findash/0.1");
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url,
            client: builder.build().context("Failed to build HTTP client")?,
            retries: config.retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Fetches `url` and decodes its JSON body. `resource` names the thing
    /// requested and is reported on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: Url, resource: &str) -> Result<T> {
        debug!("Requesting {}", url);
        let response_text = with_retry(
            || async {
                let response = self.client.get(url.clone()).send().await?;
                let status = response.status();
                if status == StatusCode::NOT_FOUND {
                    return Err(FetchError::not_found(resource));
                }
                if !status.is_success() {
                    return Err(FetchError::network(format!(
                        "Unexpected status {status} for {url}"
                    )));
                }
                Ok(response.text().await?)
            },
            self.retries,
            self.retry_delay_ms,
        )
        .await?;

        serde_json::from_str(&response_text).map_err(|e| {
            error!(
                error = ?e,
                response = %response_text,
                "Failed to parse API response"
            );
            FetchError::malformed(format!(
                "Failed to parse response for {resource}: {e}. Response: '{response_text}'"
            ))
        })
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    async fn list_accounts(&self, class: AccountClass) -> Result<Vec<Account>> {
        let url = self.endpoint(&[class.as_str()]);
        let accounts: Vec<AccountResponse> = self.get_json(url, class.as_str()).await?;
        debug!("Fetched {} {} accounts", accounts.len(), class);

        Ok(accounts
            .into_iter()
            .map(|raw| Account {
                category: non_empty(raw.category),
                tax_bucket: non_empty(raw.tax_bucket),
                ..Account::new(raw.name, class)
            })
            .collect())
    }

    async fn fetch_values(&self, class: AccountClass, name: &str) -> Result<Vec<ValuePoint>> {
        let url = self.endpoint(&[class.as_str(), name, "value"]);
        let values: Vec<ValueResponse> = self.get_json(url, name).await?;

        values
            .iter()
            .map(|raw| {
                let amount = parse_amount(&raw.value)?;
                Ok(ValuePoint {
                    timestamp: parse_timestamp(&raw.date)?,
                    amount: match class {
                        // debts are reported as positive balances
                        AccountClass::Liability => -amount,
                        AccountClass::Asset => amount,
                    },
                })
            })
            .collect()
    }

    async fn fetch_net_worth(&self) -> Result<Vec<NetWorthPoint>> {
        let url = self.endpoint(&["networth"]);
        let points: Vec<ValueResponse> = self.get_json(url, "networth").await?;

        points
            .iter()
            .map(|raw| {
                Ok(NetWorthPoint {
                    timestamp: parse_timestamp(&raw.date)?,
                    amount: parse_amount(&raw.value)?,
                })
            })
            .collect()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses an amount exactly and rounds it to cents.
fn parse_amount(raw: &RawAmount) -> Result<Decimal> {
    let text = match raw {
        RawAmount::Number(n) => n.to_string(),
        RawAmount::Text(s) => s.trim().to_string(),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(|amount| amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .map_err(|e| FetchError::malformed(format!("Invalid amount '{text}': {e}")))
}

/// Accepts RFC 3339 timestamps, naive date-times (taken as UTC) and plain
/// dates (midnight UTC).
fn parse_timestamp(date_str: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(date_str) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    if let Ok(timestamp) = NaiveDateTime::parse_from_str(date_str, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(timestamp.and_utc());
    }
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|e| FetchError::malformed(format!("Invalid date '{date_str}': {e}")))
}
