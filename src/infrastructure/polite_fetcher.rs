//! Rate-limited page fetcher
//!
//! Every request waits a random politeness delay first. Blocked responses
//! (403) trigger a session refresh, rate limits (429) are slept through, and
//! server or network failures back off exponentially. Terminal failures come
//! back as a missing body with the last status code (0 for network errors);
//! nothing here returns an error to the caller.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::infrastructure::config::FetchConfig;
use crate::infrastructure::http_transport::{HttpRequest, HttpTransport};

pub const STATUS_NETWORK_ERROR: u16 = 0;

/// Body (when successful) and final status code of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub body: Option<String>,
    pub status: u16,
}

impl FetchOutcome {
    const fn failed(status: u16) -> Self {
        Self { body: None, status }
    }

    pub const fn is_success(&self) -> bool {
        self.body.is_some()
    }
}

/// Counters accumulated over the fetcher's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub requests: u64,
    pub successes: u64,
    pub blocked: u64,
    pub rate_limited: u64,
    pub network_errors: u64,
    pub session_refreshes: u64,
    /// Keyed by status code, or "network" for transport failures
    pub status_histogram: BTreeMap<String, u64>,
}

impl FetchStats {
    fn record(&mut self, key: &str) {
        *self.status_histogram.entry(key.to_string()).or_insert(0) += 1;
    }
}

pub struct PoliteFetcher {
    transport: Arc<dyn HttpTransport>,
    config: FetchConfig,
    session_root_url: String,
    stats: Mutex<FetchStats>,
}

impl PoliteFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: FetchConfig, session_root_url: &str) -> Self {
        Self {
            transport,
            config,
            session_root_url: session_root_url.to_string(),
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// GET a page
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        self.execute(HttpRequest::get(url)).await
    }

    /// POST a JSON body under the same politeness and retry policy
    pub async fn post(&self, url: &str, body: serde_json::Value) -> FetchOutcome {
        self.execute(HttpRequest::post_json(url, body)).await
    }

    pub fn stats(&self) -> FetchStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn with_stats(&self, update: impl FnOnce(&mut FetchStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    async fn execute(&self, request: HttpRequest) -> FetchOutcome {
        let max_retries = self.config.max_retries;
        // 429s do not consume `retries`, but every retry counts here
        let retry_cap = max_retries + 2;
        let mut retries = 0_u32;
        let mut total_retries = 0_u32;
        let mut refreshes = 0_u32;

        loop {
            self.polite_delay().await;
            self.with_stats(|s| s.requests += 1);

            let response = match self.transport.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    self.with_stats(|s| {
                        s.network_errors += 1;
                        s.record("network");
                    });
                    if retries >= max_retries || total_retries >= retry_cap {
                        warn!("❌ Network error for {} after {} retries: {}", request.url, retries, e);
                        return FetchOutcome::failed(STATUS_NETWORK_ERROR);
                    }
                    let wait = self.backoff(retries);
                    warn!(
                        "⚠️ Network error for {}: {} (retry {}/{} in {:?})",
                        request.url,
                        e,
                        retries + 1,
                        max_retries,
                        wait
                    );
                    sleep(wait).await;
                    retries += 1;
                    total_retries += 1;
                    continue;
                }
            };

            let status = response.status;
            self.with_stats(|s| s.record(&status.to_string()));

            if response.is_success() {
                self.with_stats(|s| s.successes += 1);
                debug!("✅ {} {}", status, request.url);
                return FetchOutcome {
                    body: Some(response.body),
                    status,
                };
            }

            match status {
                403 => {
                    self.with_stats(|s| s.blocked += 1);
                    if retries >= max_retries
                        || refreshes >= self.config.max_session_refreshes
                        || total_retries >= retry_cap
                    {
                        warn!("🚫 403 Forbidden after {} session refreshes: {}", refreshes, request.url);
                        return FetchOutcome::failed(status);
                    }
                    warn!("🚫 403 for {}, refreshing session", request.url);
                    self.refresh_session().await;
                    refreshes += 1;
                    retries += 1;
                    total_retries += 1;
                }
                429 => {
                    self.with_stats(|s| s.rate_limited += 1);
                    if total_retries >= retry_cap {
                        warn!("⏳ Still rate limited after {} retries: {}", total_retries, request.url);
                        return FetchOutcome::failed(status);
                    }
                    let wait_secs = response
                        .retry_after_secs()
                        .unwrap_or(self.config.default_retry_after_secs);
                    warn!("⏳ Rate limited on {}, waiting {}s", request.url, wait_secs);
                    sleep(Duration::from_secs(wait_secs)).await;
                    total_retries += 1;
                }
                s if s >= 500 => {
                    if retries >= max_retries || total_retries >= retry_cap {
                        warn!("❌ HTTP {} for {} after {} retries", s, request.url, retries);
                        return FetchOutcome::failed(s);
                    }
                    let wait = self.backoff(retries);
                    warn!(
                        "⚠️ HTTP {} for {} (retry {}/{} in {:?})",
                        s,
                        request.url,
                        retries + 1,
                        max_retries,
                        wait
                    );
                    sleep(wait).await;
                    retries += 1;
                    total_retries += 1;
                }
                other => {
                    warn!("❌ HTTP {} for {}, not retrying", other, request.url);
                    return FetchOutcome::failed(other);
                }
            }
        }
    }

    /// Discard cookies, revisit the site root for a fresh set, then pause
    async fn refresh_session(&self) {
        self.with_stats(|s| s.session_refreshes += 1);

        if let Err(e) = self.transport.reset_session().await {
            warn!("Failed to reset HTTP session: {}", e);
        }
        match self.transport.send(&HttpRequest::get(&self.session_root_url)).await {
            Ok(response) if response.is_success() => {
                info!("🍪 Session refreshed from {}", self.session_root_url);
            }
            Ok(response) => {
                warn!("Session refresh got HTTP {} from {}", response.status, self.session_root_url);
            }
            Err(e) => warn!("Failed to refresh session: {}", e),
        }
        sleep(Duration::from_millis(self.config.session_refresh_delay_ms)).await;
    }

    async fn polite_delay(&self) {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        let delay = if max > min { fastrand::u64(min..=max) } else { min };
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        Duration::from_secs(self.config.backoff_base.saturating_pow(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_transport::{HttpResponse, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    const ROOT: &str = "https://site.test/";
    const PAGE: &str = "https://site.test/page";

    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        page_calls: AtomicU32,
        root_calls: AtomicU32,
        resets: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                page_calls: AtomicU32::new(0),
                root_calls: AtomicU32::new(0),
                resets: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            if request.url == ROOT {
                self.root_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(HttpResponse::new(200, "home"));
            }
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(200, "default")))
        }

        async fn reset_session(&self) -> Result<(), TransportError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(200, body))
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::new(code, "error page"))
    }

    fn network() -> Result<HttpResponse, TransportError> {
        Err(TransportError::Connect("connection refused".to_string()))
    }

    fn fetcher(transport: Arc<ScriptedTransport>) -> PoliteFetcher {
        PoliteFetcher::new(transport, FetchConfig::default(), ROOT)
    }

    #[tokio::test(start_paused = true)]
    async fn success_waits_politeness_delay() {
        let transport = ScriptedTransport::new(vec![ok("<html>listing</html>")]);
        let fetcher = fetcher(transport.clone());

        let started = Instant::now();
        let outcome = fetcher.fetch(PAGE).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.body.as_deref(), Some("<html>listing</html>"));
        assert_eq!(outcome.status, 200);
        assert!(elapsed >= Duration::from_millis(1000) && elapsed <= Duration::from_millis(2000));
        assert_eq!(fetcher.stats().successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_refreshes_session_then_succeeds() {
        let transport = ScriptedTransport::new(vec![status(403), status(403), ok("page")]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        assert!(outcome.is_success());
        assert_eq!(transport.resets.load(Ordering::SeqCst), 2);
        assert_eq!(transport.root_calls.load(Ordering::SeqCst), 2);
        let stats = fetcher.stats();
        assert_eq!(stats.blocked, 2);
        assert_eq!(stats.session_refreshes, 2);
        assert_eq!(stats.status_histogram.get("403"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_forbidden_stops_at_refresh_ceiling() {
        let transport = ScriptedTransport::new(vec![status(403); 10]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        assert_eq!(outcome, FetchOutcome { body: None, status: 403 });
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 4);
        assert_eq!(transport.root_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_ceiling_can_be_lower_than_retries() {
        let transport = ScriptedTransport::new(vec![status(403); 10]);
        let config = FetchConfig {
            max_session_refreshes: 1,
            ..FetchConfig::default()
        };
        let fetcher = PoliteFetcher::new(transport.clone(), config, ROOT);

        assert_eq!(fetcher.fetch(PAGE).await.status, 403);
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_honors_retry_after_without_consuming_retries() {
        let mut limited = HttpResponse::new(429, "slow down");
        limited.retry_after = Some("5".to_string());
        let transport = ScriptedTransport::new(vec![
            Ok(limited.clone()),
            Ok(limited),
            status(500),
            status(500),
            status(500),
            ok("finally"),
        ]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        // 2 rate-limit waits plus 3 counted retries stays within max + 2
        assert_eq!(outcome.body.as_deref(), Some("finally"));
        assert_eq!(fetcher.stats().rate_limited, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_header_waits_default() {
        let transport = ScriptedTransport::new(vec![status(429), ok("page")]);
        let fetcher = fetcher(transport.clone());

        let started = Instant::now();
        assert!(fetcher.fetch(PAGE).await.is_success());
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_rate_limit_is_bounded() {
        let transport = ScriptedTransport::new(vec![status(429); 20]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        assert_eq!(outcome.status, 429);
        assert!(outcome.body.is_none());
        // first attempt plus max + 2 retries
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_back_off_exponentially() {
        let transport = ScriptedTransport::new(vec![status(503); 10]);
        let fetcher = fetcher(transport.clone());

        let started = Instant::now();
        let outcome = fetcher.fetch(PAGE).await;

        assert_eq!(outcome.status, 503);
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 4);
        // backoff 1 + 2 + 4 seconds on top of four politeness delays
        assert!(started.elapsed() >= Duration::from_secs(7 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_surface_as_status_zero() {
        let transport = ScriptedTransport::new(vec![network(), network(), network(), network()]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        assert_eq!(outcome, FetchOutcome { body: None, status: STATUS_NETWORK_ERROR });
        let stats = fetcher.stats();
        assert_eq!(stats.network_errors, 4);
        assert_eq!(stats.status_histogram.get("network"), Some(&4));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_recovers() {
        let transport = ScriptedTransport::new(vec![network(), ok("back")]);
        let fetcher = fetcher(transport);
        assert_eq!(fetcher.fetch(PAGE).await.body.as_deref(), Some("back"));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let transport = ScriptedTransport::new(vec![status(404), ok("never")]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.fetch(PAGE).await;

        assert_eq!(outcome.status, 404);
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn post_shares_the_retry_policy() {
        let transport = ScriptedTransport::new(vec![status(502), ok("{\"ok\":true}")]);
        let fetcher = fetcher(transport.clone());

        let outcome = fetcher.post(PAGE, serde_json::json!({"q": 1})).await;

        assert_eq!(outcome.body.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(transport.page_calls.load(Ordering::SeqCst), 2);
    }
}
