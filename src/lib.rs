//! Coin Catalog - reference catalog and price guide builder
//!
//! Scrapes a coin catalog website politely, resumes interrupted runs from a
//! local progress store and refreshes stale prices through a quota-limited
//! price API.

pub mod application;
pub mod domain;
pub mod infrastructure;

use anyhow::{Context, Result, bail};
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::application::{CatalogApp, ScrapeError};
use crate::domain::catalog::PriorityTier;
use crate::domain::progress::RunFilters;
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::logging::{init_logging_with_config, log_system_info};

pub const CONFIG_PATH_ENV: &str = "COIN_CATALOG_CONFIG";
const DEFAULT_MAX_RETRIES: i64 = 3;

/// What the binary was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape the catalog, optionally one series (slug or name) or one tier
    Scrape(RunFilters),
    /// Retry failed items below the retry ceiling
    Retry { max_retries: i64 },
    /// Refresh stale prices through the API
    Refresh {
        limit: Option<u32>,
        priority: Option<PriorityTier>,
        dry_run: bool,
    },
    /// Print progress and quota status
    Status,
}

impl Command {
    /// `scrape [series|P0..P3]`, `retry [max]`, `refresh [limit|P0..P3|--dry-run]...`, `status`.
    /// No arguments means `scrape`.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let command = args.next().unwrap_or_else(|| "scrape".to_string());
        let rest: Vec<String> = args.collect();

        match command.as_str() {
            "scrape" => {
                let mut filters = RunFilters {
                    resume: true,
                    ..RunFilters::default()
                };
                if let Some(target) = rest.first() {
                    match target.parse::<PriorityTier>() {
                        Ok(tier) => filters.priority = Some(tier),
                        Err(_) => filters.series = Some(target.clone()),
                    }
                }
                Ok(Self::Scrape(filters))
            }
            "retry" => {
                let max_retries = match rest.first() {
                    Some(value) => value.parse().with_context(|| format!("Invalid retry ceiling: {value}"))?,
                    None => DEFAULT_MAX_RETRIES,
                };
                Ok(Self::Retry { max_retries })
            }
            "refresh" => {
                let mut limit = None;
                let mut priority = None;
                let mut dry_run = false;
                for arg in &rest {
                    if arg == "--dry-run" {
                        dry_run = true;
                    } else if let Ok(tier) = arg.parse::<PriorityTier>() {
                        priority = Some(tier);
                    } else {
                        limit = Some(arg.parse().with_context(|| format!("Invalid call limit: {arg}"))?);
                    }
                }
                Ok(Self::Refresh {
                    limit,
                    priority,
                    dry_run,
                })
            }
            "status" => Ok(Self::Status),
            other => bail!("Unknown command: {other}"),
        }
    }
}

/// Config from `COIN_CATALOG_CONFIG` or the platform config directory
pub async fn load_config() -> Result<AppConfig> {
    let manager = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => ConfigManager::with_path(PathBuf::from(path)),
        None => ConfigManager::new()?,
    };
    manager.load_config().await
}

/// Binary entry point
pub async fn run() -> Result<()> {
    let config = load_config().await?;
    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    let command = Command::from_args(std::env::args().skip(1))?;
    info!("▶️ Command: {:?}", command);

    let app = CatalogApp::build(&config).await?;
    match command {
        Command::Scrape(filters) => {
            if let Some(report) = until_interrupted(app.orchestrator.run(filters)).await? {
                println!("{report}");
            }
        }
        Command::Retry { max_retries } => {
            if let Some(report) = until_interrupted(app.orchestrator.retry_failed_items(max_retries)).await? {
                println!("{report}");
            }
        }
        Command::Refresh {
            limit,
            priority,
            dry_run,
        } => {
            let report = app
                .refresher
                .with_dry_run(dry_run)
                .refresh_prices(limit, priority)
                .await?;
            println!("{report}");
        }
        Command::Status => {
            let summary = app.orchestrator.get_progress_summary().await?;
            let quota = app.orchestrator.get_quota_status().await?;
            let budget = app.orchestrator.calculate_daily_budget().await?;
            println!("{summary}");
            println!(
                "API quota {}: {}/{} used, {} remaining, today's budget {}",
                quota.date, quota.calls_made, quota.daily_limit, quota.remaining, budget
            );
        }
    }
    Ok(())
}

/// Run scrape work until it finishes or Ctrl-C arrives. Progress is saved
/// after every item, so dropping the work loses at most the item in flight.
async fn until_interrupted<T>(work: impl Future<Output = Result<T, ScrapeError>>) -> Result<Option<T>> {
    tokio::select! {
        result = work => Ok(Some(result?)),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("⏹️ Interrupted; the next run resumes from saved progress");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn no_arguments_scrapes_everything_with_resume() {
        let command = Command::from_args(Vec::new()).unwrap();
        assert_eq!(
            command,
            Command::Scrape(RunFilters {
                priority: None,
                series: None,
                resume: true,
            })
        );
    }

    #[test]
    fn scrape_target_is_tier_or_series() {
        let Command::Scrape(filters) = Command::from_args(args(&["scrape", "p1"])).unwrap() else {
            panic!("expected scrape");
        };
        assert_eq!(filters.priority, Some(PriorityTier::P1));

        let Command::Scrape(filters) = Command::from_args(args(&["scrape", "morgan-dollars"])).unwrap() else {
            panic!("expected scrape");
        };
        assert_eq!(filters.series.as_deref(), Some("morgan-dollars"));
    }

    #[test]
    fn refresh_arguments() {
        let command = Command::from_args(args(&["refresh", "40", "P0", "--dry-run"])).unwrap();
        assert_eq!(
            command,
            Command::Refresh {
                limit: Some(40),
                priority: Some(PriorityTier::P0),
                dry_run: true,
            }
        );
        assert!(Command::from_args(args(&["refresh", "lots"])).is_err());
        assert!(Command::from_args(args(&["explode"])).is_err());
        assert_eq!(
            Command::from_args(args(&["retry"])).unwrap(),
            Command::Retry { max_retries: 3 }
        );
    }
}
