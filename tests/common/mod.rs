//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use coin_catalog_lib::domain::catalog::{CatalogEntry, PriorityTier};
use coin_catalog_lib::infrastructure::clock::ManualClock;
use coin_catalog_lib::infrastructure::config::AppConfig;
use coin_catalog_lib::infrastructure::http_transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

pub const BASE: &str = "https://catalog.test/coinfacts";
pub const ROOT: &str = "https://catalog.test/";
pub const API_BASE: &str = "https://api.test/publicapi";

pub const MORGAN_LISTING: &str = "https://catalog.test/coinfacts/category/morgan-dollars/744";
pub const PEACE_LISTING: &str = "https://catalog.test/coinfacts/category/peace-dollars/745";

/// Responses keyed by URL. The last queued response for a URL repeats; an
/// entry ending in `*` matches by prefix. Unrouted URLs get a 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    calls: Mutex<Vec<String>>,
    resets: AtomicU32,
}

impl RoutedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(HttpResponse::new(status, body));
    }

    /// Replace everything queued for a URL
    pub fn reroute(&self, url: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().remove(url);
        self.route(url, status, body);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|url| url.starts_with(prefix)).count()
    }

    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    fn respond(&self, url: &str) -> HttpResponse {
        let mut routes = self.routes.lock().unwrap();
        let key = if routes.contains_key(url) {
            Some(url.to_string())
        } else {
            routes
                .keys()
                .filter(|k| k.ends_with('*') && url.starts_with(k.trim_end_matches('*')))
                .max_by_key(|k| k.len())
                .cloned()
        };
        let Some(queue) = key.and_then(|k| routes.get_mut(&k)) else {
            return HttpResponse::new(404, "not found");
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or_else(|| HttpResponse::new(404, "not found"))
        }
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request.url.clone());
        Ok(self.respond(&request.url))
    }

    async fn reset_session(&self) -> Result<(), TransportError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn test_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("Morgan Dollars", "morgan-dollars", 744, PriorityTier::P0, 3),
        CatalogEntry::new("Peace Dollars", "peace-dollars", 745, PriorityTier::P1, 2),
    ]
}

/// Config with on-disk stores under `dir` and no politeness delays
pub fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.site.base_url = BASE.to_string();
    config.site.session_root_url = ROOT.to_string();
    config.fetch.min_delay_ms = 0;
    config.fetch.max_delay_ms = 0;
    config.fetch.session_refresh_delay_ms = 0;
    config.api.base_url = API_BASE.to_string();
    config.api.call_delay_ms = 0;
    config.api.retry_backoff_secs = 0;
    config.storage.progress_db_path = dir.join("progress.db");
    config.storage.quota_file_path = dir.join("quota.json");
    config.storage.catalog_database_url = format!("sqlite:{}", dir.join("catalog.db").display());
    config.catalog = test_catalog();
    config
}

/// Wednesday 2024-06-05, noon UTC
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap()))
}

/// Three rows; 102 carries neither an id attribute nor a detail link
pub const LISTING_101_102_103: &str = r#"
<html><body>
  <table class="pcgs-table">
    <tbody>
      <tr><td><a href="/coinfacts/coin/detail/101">1881-S $1 Morgan Dollar</a></td><td>MS</td></tr>
      <tr><td><span class="coin-name">1882 $1 Morgan Dollar</span></td><td>MS</td></tr>
      <tr><td><a href="/coinfacts/coin/detail/103">1884-CC $1 Morgan Dollar</a></td><td>MS</td></tr>
    </tbody>
  </table>
</body></html>"#;

pub fn detail_page(title: &str, prices: &[(&str, &str)]) -> String {
    let rows: String = prices
        .iter()
        .map(|(grade, price)| format!("<tr><td>{grade}</td><td>{price}</td></tr>"))
        .collect();
    format!(
        r#"<html><body>
  <h1 class="coin-title">{title}</h1>
  <div class="denomination">$1</div>
  <div class="mintage">Mintage: 9,163,000</div>
  <table class="price-guide-table">
    <tr><th>Grade</th><th>Price</th></tr>
    {rows}
  </table>
</body></html>"#
    )
}

pub fn detail_url(id: i64) -> String {
    format!("{BASE}/coin/detail/{id}")
}
