//! Application layer
//!
//! Use cases that drive the infrastructure components: catalog scraping,
//! failed-item retry and API price refresh.

pub mod app;
pub mod orchestrator;
pub mod price_refresh;
pub mod report;

pub use app::{CatalogApp, Transports};
pub use orchestrator::ScrapeOrchestrator;
pub use price_refresh::PriceRefresher;
pub use report::{ErrorCategory, ItemFailure, RefreshReport, RunReport, ScrapeError, SeriesOutcome};
