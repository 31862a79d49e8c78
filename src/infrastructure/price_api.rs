//! Price API client
//!
//! Token-authenticated JSON API with a hard daily call ceiling. Every data
//! call checks the [`QuotaBudget`] first and is counted only when it
//! succeeds. A 401 re-authenticates once per call; server and network
//! failures back off linearly.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::item::{ExternalId, Price};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::{ApiConfig, utils};
use crate::infrastructure::http_transport::{HttpRequest, HttpTransport, TransportError};
use crate::infrastructure::quota_store::{QuotaBudget, QuotaError};

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 86_400;
const FACTS_BY_GRADE: &str = "coindetail/GetCoinFactsByGrade";
const FACTS_BY_CERT: &str = "coindetail/GetCoinFactsByCertNo";
const AUCTION_PRICES: &str = "auctionprices/GetAuctionPrices";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Daily API quota exhausted ({calls_made}/{daily_limit} calls used on {date})")]
    QuotaExhausted {
        calls_made: u32,
        daily_limit: u32,
        date: NaiveDate,
    },

    #[error("Rate limited by the price API")]
    RateLimited,

    #[error("Price API returned HTTP {status}")]
    Http { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid API response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Quota(#[from] QuotaError),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
}

impl ApiCredentials {
    /// Read credentials from the environment variables named in the config
    pub fn from_env(config: &ApiConfig) -> Option<Self> {
        let username = std::env::var(&config.username_env).ok().filter(|v| !v.is_empty())?;
        let password = std::env::var(&config.password_env).ok().filter(|v| !v.is_empty())?;
        Some(Self { username, password })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct PriceApiClient {
    transport: Arc<dyn HttpTransport>,
    config: ApiConfig,
    credentials: Option<ApiCredentials>,
    quota: Option<Arc<QuotaBudget>>,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
}

impl PriceApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: ApiConfig,
        credentials: Option<ApiCredentials>,
        quota: Option<Arc<QuotaBudget>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            config,
            credentials,
            quota,
            clock,
            token: Mutex::new(None),
        }
    }

    /// Bearer token, reusing the cached one until shortly before expiry
    pub async fn authenticate(&self) -> ApiResult<String> {
        let mut cached = self.token.lock().await;
        let buffer = ChronoDuration::seconds(self.config.token_expiry_buffer_secs);
        if let Some(token) = cached.as_ref().filter(|t| self.clock.now() < t.expires_at - buffer) {
            debug!("Using cached API token");
            return Ok(token.value.clone());
        }

        let credentials = self.credentials.as_ref().ok_or_else(|| {
            ApiError::Authentication(format!(
                "credentials not set; export {} and {}",
                self.config.username_env, self.config.password_env
            ))
        })?;

        info!("🔑 Authenticating with the price API");
        let request = HttpRequest::post_json(
            utils::api_url(&self.config.base_url, &self.config.token_path),
            json!({ "userName": credentials.username, "password": credentials.password }),
        );
        let response = self.transport.send(&request).await?;
        if response.status == 401 {
            return Err(ApiError::Authentication("invalid credentials".to_string()));
        }
        if !response.is_success() {
            return Err(ApiError::Authentication(format!("token endpoint returned HTTP {}", response.status)));
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Authentication(format!("unreadable token response: {e}")))?;
        let value = ["access_token", "token"]
            .iter()
            .find_map(|key| body.get(key).and_then(Value::as_str))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Authentication("token missing from response".to_string()))?
            .to_string();
        let lifetime = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = self.clock.now() + ChronoDuration::seconds(lifetime);

        info!("✅ Authenticated, token valid until {}", expires_at);
        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at,
        });
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Price guide facts for one item in one grade
    pub async fn coin_facts_by_grade(&self, external_id: ExternalId, grade: &str) -> ApiResult<Value> {
        if external_id < 1 {
            return Err(ApiError::InvalidRequest(format!("item id must be positive, got {external_id}")));
        }
        if grade.trim().is_empty() {
            return Err(ApiError::InvalidRequest("grade is required".to_string()));
        }
        debug!("Fetching facts for #{} in {}", external_id, grade);
        let url = self.endpoint(
            FACTS_BY_GRADE,
            &[("PCGSNo", external_id.to_string()), ("Grade", grade.to_string())],
        )?;
        self.get_json(&url).await
    }

    /// Facts for a certified coin by its certificate number
    pub async fn coin_facts_by_cert(&self, cert_no: &str) -> ApiResult<Value> {
        if cert_no.is_empty() || !cert_no.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::InvalidRequest(format!("certificate number must be numeric, got '{cert_no}'")));
        }
        let url = self.endpoint(&format!("{FACTS_BY_CERT}/{cert_no}"), &[])?;
        self.get_json(&url).await
    }

    /// Auction results, optionally for one grade
    pub async fn auction_prices(&self, external_id: ExternalId, grade: Option<&str>) -> ApiResult<Value> {
        let mut params = vec![("PCGSNo", external_id.to_string())];
        if let Some(grade) = grade.filter(|g| !g.trim().is_empty()) {
            params.push(("Grade", grade.to_string()));
        }
        let url = self.endpoint(AUCTION_PRICES, &params)?;
        self.get_json(&url).await
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> ApiResult<String> {
        let base = utils::api_url(&self.config.base_url, path);
        let url = if params.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, params)
        }
        .map_err(|e| ApiError::InvalidRequest(format!("bad endpoint URL {base}: {e}")))?;
        Ok(url.into())
    }

    async fn check_quota(&self) -> ApiResult<()> {
        if let Some(quota) = &self.quota {
            if !quota.check_quota().await? {
                let status = quota.status().await?;
                return Err(ApiError::QuotaExhausted {
                    calls_made: status.calls_made,
                    daily_limit: status.daily_limit,
                    date: status.date,
                });
            }
        }
        Ok(())
    }

    async fn get_json(&self, url: &str) -> ApiResult<Value> {
        let mut token = self.authenticate().await?;
        self.check_quota().await?;

        // A re-authentication does not use up an attempt
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        let mut reauthenticated = false;
        let mut last_error = None;
        while attempt < max_attempts {
            let request = HttpRequest::get(url).with_bearer(&token);
            let response = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    let wait = self.backoff(attempt);
                    warn!("⚠️ Price API network error, retrying in {:?}: {}", wait, e);
                    last_error = Some(ApiError::Network(e));
                    sleep(wait).await;
                    attempt += 1;
                    continue;
                }
            };

            match response.status {
                401 if !reauthenticated => {
                    warn!("🔑 API token rejected, re-authenticating");
                    reauthenticated = true;
                    self.invalidate_token().await;
                    token = self.authenticate().await?;
                }
                401 => return Err(ApiError::Authentication("token rejected after re-authentication".to_string())),
                429 => return Err(ApiError::RateLimited),
                status if (200..300).contains(&status) => {
                    if let Some(quota) = &self.quota {
                        let remaining = quota.record_call().await?;
                        info!("API call recorded, {} calls remaining today", remaining);
                    }
                    return serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()));
                }
                status if status >= 500 => {
                    let wait = self.backoff(attempt);
                    warn!("⚠️ Price API HTTP {}, retrying in {:?}", status, wait);
                    last_error = Some(ApiError::Http { status });
                    sleep(wait).await;
                    attempt += 1;
                }
                status => return Err(ApiError::Http { status }),
            }
        }

        Err(last_error.unwrap_or_else(|| ApiError::Authentication("token rejected on every attempt".to_string())))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.config.retry_backoff_secs * u64::from(attempt + 1))
    }
}

/// Price guide value from a facts response (`PriceGuideValue`, `Price` or `Value`)
pub fn price_from_facts(facts: &Value) -> Option<Price> {
    ["PriceGuideValue", "Price", "Value"].iter().find_map(|key| {
        let value = facts.get(key)?;
        let price = match value {
            Value::Number(n) => n.as_f64().and_then(Price::from_f64),
            Value::String(s) => Price::parse(s),
            _ => None,
        }?;
        (price.cents() > 0).then_some(price)
    })
}
