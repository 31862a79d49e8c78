//! Infrastructure layer
//!
//! HTTP transports and the polite fetcher, page parsing, the progress and
//! quota stores, the price API client and the catalog database.

pub mod catalog_repository;
pub mod clock;
pub mod config;
pub mod database_connection;
pub mod http_transport;
pub mod logging;
pub mod parsing;
pub mod polite_fetcher;
pub mod price_api;
pub mod progress_store;
pub mod quota_store;

pub use catalog_repository::{CatalogRepository, PriceSource, RepositoryError, SqliteCatalogRepository};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use http_transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{CatalogPageParser, ParsingError, ParsingResult, SelectorConfig};
pub use polite_fetcher::{FetchOutcome, FetchStats, PoliteFetcher};
pub use price_api::{ApiError, PriceApiClient};
pub use progress_store::{ProgressError, ProgressStore};
pub use quota_store::{QuotaBudget, QuotaError};
