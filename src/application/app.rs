//! Component wiring
//!
//! Builds the stores, transports, parser, orchestrator and price refresher
//! from one immutable [`AppConfig`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::orchestrator::ScrapeOrchestrator;
use crate::application::price_refresh::PriceRefresher;
use crate::domain::validation::RecordValidator;
use crate::infrastructure::catalog_repository::{CatalogRepository, SqliteCatalogRepository};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::http_transport::{HttpTransport, ReqwestTransport, TransportConfig};
use crate::infrastructure::parsing::CatalogPageParser;
use crate::infrastructure::polite_fetcher::PoliteFetcher;
use crate::infrastructure::price_api::{ApiCredentials, PriceApiClient};
use crate::infrastructure::progress_store::ProgressStore;
use crate::infrastructure::quota_store::QuotaBudget;

/// Transports for the catalog site and the price API
pub struct Transports {
    pub site: Arc<dyn HttpTransport>,
    pub api: Arc<dyn HttpTransport>,
}

impl Transports {
    /// reqwest clients configured from the site and API sections
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let site = ReqwestTransport::new(TransportConfig::for_site(&config.site))
            .context("Failed to build catalog site client")?;
        let api = ReqwestTransport::new(TransportConfig::for_api(&config.api, &config.site.user_agent))
            .context("Failed to build price API client")?;
        Ok(Self {
            site: Arc::new(site),
            api: Arc::new(api),
        })
    }
}

pub struct CatalogApp {
    pub orchestrator: ScrapeOrchestrator,
    pub refresher: PriceRefresher,
    pub progress: Arc<ProgressStore>,
    pub quota: Arc<QuotaBudget>,
    pub repository: Arc<dyn CatalogRepository>,
}

impl CatalogApp {
    /// Production wiring: reqwest transports and the system clock
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let transports = Transports::from_config(config)?;
        Self::build_with(config, transports, Arc::new(SystemClock)).await
    }

    pub async fn build_with(config: &AppConfig, transports: Transports, clock: Arc<dyn Clock>) -> Result<Self> {
        let progress = Arc::new(
            ProgressStore::open(&config.storage.progress_db_path)
                .await
                .context("Failed to open progress store")?,
        );
        let quota = Arc::new(
            QuotaBudget::open(
                &config.storage.quota_file_path,
                config.quota.daily_limit,
                config.quota.budget_policy(),
                clock.clone(),
            )
            .await
            .context("Failed to open quota file")?,
        );

        let database = DatabaseConnection::new(&config.storage.catalog_database_url).await?;
        database.migrate().await.context("Failed to migrate catalog database")?;
        let repository: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalogRepository::new(database.pool().clone()));

        let parser = Arc::new(CatalogPageParser::new(&config.selectors).context("Invalid selector configuration")?);
        let fetcher = Arc::new(PoliteFetcher::new(
            transports.site,
            config.fetch.clone(),
            &config.site.session_root_url,
        ));
        let catalog = config.catalog();

        let orchestrator = ScrapeOrchestrator::new(
            fetcher,
            parser,
            RecordValidator::new(config.validation.strict),
            progress.clone(),
            repository.clone(),
            quota.clone(),
            clock.clone(),
            &config.site.base_url,
            catalog.clone(),
        );

        let credentials = ApiCredentials::from_env(&config.api);
        if credentials.is_none() {
            warn!(
                "Price API credentials not set ({} / {}); price refresh will fail to authenticate",
                config.api.username_env, config.api.password_env
            );
        }
        let api = Arc::new(PriceApiClient::new(
            transports.api,
            config.api.clone(),
            credentials,
            Some(quota.clone()),
            clock.clone(),
        ));
        let refresher = PriceRefresher::new(api, repository.clone(), quota.clone(), clock, config.api.clone(), catalog);

        info!("🧩 Components ready ({} series in catalog)", config.catalog().len());
        Ok(Self {
            orchestrator,
            refresher,
            progress,
            quota,
            repository,
        })
    }
}
