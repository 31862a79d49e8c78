//! Run outcomes, error taxonomy and end-of-run reports

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::domain::item::ExternalId;
use crate::infrastructure::catalog_repository::RepositoryError;
use crate::infrastructure::parsing::ParsingError;
use crate::infrastructure::polite_fetcher::STATUS_NETWORK_ERROR;
use crate::infrastructure::progress_store::ProgressError;
use crate::infrastructure::quota_store::QuotaError;

/// Failure classes tallied into reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    TransientNetworkFailure,
    BlockedRequest,
    RateLimited,
    HttpClientError,
    AuthenticationFailure,
    QuotaExhausted,
    ExtractionMiss,
    ValidationFailure,
    StorageFailure,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetworkFailure => "transient_network_failure",
            Self::BlockedRequest => "blocked_request",
            Self::RateLimited => "rate_limited",
            Self::HttpClientError => "http_client_error",
            Self::AuthenticationFailure => "authentication_failure",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ExtractionMiss => "extraction_miss",
            Self::ValidationFailure => "validation_failure",
            Self::StorageFailure => "storage_failure",
        }
    }

    /// Category of a fetch that ended without a body
    pub const fn from_status(status: u16) -> Self {
        match status {
            STATUS_NETWORK_ERROR => Self::TransientNetworkFailure,
            401 => Self::AuthenticationFailure,
            403 => Self::BlockedRequest,
            429 => Self::RateLimited,
            500..=599 => Self::TransientNetworkFailure,
            _ => Self::HttpClientError,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one listing or item could not be scraped. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl ItemFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn fetch_failed(status: u16, url: &str) -> Self {
        let message = if status == STATUS_NETWORK_ERROR {
            format!("network error fetching {url}")
        } else {
            format!("HTTP {status} fetching {url}")
        };
        Self::new(ErrorCategory::from_status(status), message)
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Faults that abort a run
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Parsing(#[from] ParsingError),

    #[error("Unknown series: {0}")]
    UnknownSeries(String),
}

/// What happened to one series in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesOutcome {
    pub slug: String,
    pub items_found: usize,
    pub items_scraped: usize,
    pub items_failed: usize,
    /// Already completed in an earlier run
    pub items_skipped: usize,
    pub prices_saved: usize,
    /// Listing produced nothing usable; the series stays in progress
    pub listing_failure: Option<String>,
    pub completed: bool,
    pub errors: BTreeMap<ErrorCategory, u64>,
    pub failed_ids: Vec<ExternalId>,
}

impl SeriesOutcome {
    pub fn new(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            ..Self::default()
        }
    }

    pub fn record_failure(&mut self, category: ErrorCategory) {
        *self.errors.entry(category).or_insert(0) += 1;
    }
}

/// End-of-run summary of a scrape or retry pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: Option<i64>,
    pub series_processed: usize,
    pub series_completed: usize,
    pub series_skipped: usize,
    pub items_scraped: usize,
    pub items_failed: usize,
    pub items_skipped: usize,
    pub prices_saved: usize,
    pub errors: BTreeMap<ErrorCategory, u64>,
    pub http_status: BTreeMap<String, u64>,
    pub top_selector_hits: Vec<(String, u64)>,
    pub session_refreshes: u64,
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(run_id: Option<i64>) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    pub fn absorb(&mut self, outcome: &SeriesOutcome) {
        self.series_processed += 1;
        if outcome.completed {
            self.series_completed += 1;
        }
        self.items_scraped += outcome.items_scraped;
        self.items_failed += outcome.items_failed;
        self.items_skipped += outcome.items_skipped;
        self.prices_saved += outcome.prices_saved;
        for (category, count) in &outcome.errors {
            *self.errors.entry(*category).or_insert(0) += count;
        }
    }

    /// Error categories by descending count
    pub fn top_errors(&self, limit: usize) -> Vec<(ErrorCategory, u64)> {
        let mut errors: Vec<(ErrorCategory, u64)> = self.errors.iter().map(|(k, v)| (*k, *v)).collect();
        errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        errors.truncate(limit);
        errors
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run_id {
            Some(id) => writeln!(f, "Run #{id}")?,
            None => writeln!(f, "Run")?,
        }
        writeln!(
            f,
            "  Series: {} processed, {} completed, {} skipped",
            self.series_processed, self.series_completed, self.series_skipped
        )?;
        writeln!(
            f,
            "  Items: {} scraped, {} failed, {} skipped",
            self.items_scraped, self.items_failed, self.items_skipped
        )?;
        writeln!(f, "  Prices saved: {}", self.prices_saved)?;
        writeln!(f, "  Session refreshes: {}", self.session_refreshes)?;

        if !self.http_status.is_empty() {
            let statuses: Vec<String> = self.http_status.iter().map(|(k, v)| format!("{k}={v}")).collect();
            writeln!(f, "  HTTP: {}", statuses.join(", "))?;
        }
        let top_errors = self.top_errors(5);
        if !top_errors.is_empty() {
            writeln!(f, "  Top errors:")?;
            for (category, count) in top_errors {
                writeln!(f, "    {category}: {count}")?;
            }
        }
        if !self.top_selector_hits.is_empty() {
            writeln!(f, "  Selector hits:")?;
            for (rule, count) in &self.top_selector_hits {
                writeln!(f, "    {rule}: {count}")?;
            }
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "  Aborted: {reason}")?;
        }
        Ok(())
    }
}

/// Summary of one price refresh pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub budget: u32,
    pub candidates: usize,
    pub api_calls: u32,
    pub updated: usize,
    /// Calls that returned no usable price
    pub skipped: usize,
    pub failed: usize,
    pub stopped_early: Option<String>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.dry_run { " (dry run)" } else { "" };
        writeln!(f, "Price refresh{mode}")?;
        writeln!(
            f,
            "  Budget: {} calls, {} used, {} candidates",
            self.budget, self.api_calls, self.candidates
        )?;
        writeln!(
            f,
            "  Prices: {} updated, {} skipped, {} failed",
            self.updated, self.skipped, self.failed
        )?;
        if let Some(reason) = &self.stopped_early {
            writeln!(f, "  Stopped early: {reason}")?;
        }
        for error in self.errors.iter().take(5) {
            writeln!(f, "  Error: {error}")?;
        }
        Ok(())
    }
}
