//! Price refresh through the price API
//!
//! Spends at most one day's budget of API calls on items whose newest price
//! is stale, highest priority series first.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::report::{RefreshReport, ScrapeError};
use crate::domain::catalog::{CatalogEntry, PriorityTier, find_by_name};
use crate::domain::item::GradeCode;
use crate::infrastructure::catalog_repository::{CatalogRepository, PriceSource, RefreshCandidate};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::price_api::{ApiError, PriceApiClient, price_from_facts};
use crate::infrastructure::quota_store::QuotaBudget;

pub struct PriceRefresher {
    api: Arc<PriceApiClient>,
    repository: Arc<dyn CatalogRepository>,
    quota: Arc<QuotaBudget>,
    clock: Arc<dyn Clock>,
    config: ApiConfig,
    catalog: Vec<CatalogEntry>,
    dry_run: bool,
}

impl PriceRefresher {
    pub fn new(
        api: Arc<PriceApiClient>,
        repository: Arc<dyn CatalogRepository>,
        quota: Arc<QuotaBudget>,
        clock: Arc<dyn Clock>,
        config: ApiConfig,
        catalog: Vec<CatalogEntry>,
    ) -> Self {
        Self {
            api,
            repository,
            quota,
            clock,
            config,
            catalog,
            dry_run: false,
        }
    }

    /// Fetch prices without writing them
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Refresh stale prices. `limit` overrides today's computed budget.
    pub async fn refresh_prices(
        &self,
        limit: Option<u32>,
        priority: Option<PriorityTier>,
    ) -> Result<RefreshReport, ScrapeError> {
        let budget = match limit {
            Some(limit) => limit,
            None => self.quota.calculate_daily_budget().await?,
        };
        let candidates = self.candidates(priority).await?;

        let mut report = RefreshReport {
            budget,
            candidates: candidates.len(),
            dry_run: self.dry_run,
            ..RefreshReport::default()
        };
        info!(
            "💰 Price refresh: {} stale items, budget {} calls{}",
            candidates.len(),
            budget,
            if self.dry_run { " (dry run)" } else { "" }
        );

        let today = self.clock.today();
        let delay = Duration::from_millis(self.config.call_delay_ms);

        'candidates: for candidate in &candidates {
            for grade in &self.config.target_grades {
                if report.api_calls >= budget {
                    report.stopped_early = Some(format!("budget of {budget} calls spent"));
                    break 'candidates;
                }

                let facts = match self.api.coin_facts_by_grade(candidate.external_id, grade).await {
                    Ok(facts) => facts,
                    Err(ApiError::QuotaExhausted { .. }) => {
                        warn!("⛔ Quota exhausted, stopping price refresh");
                        report.stopped_early = Some("daily quota exhausted".to_string());
                        break 'candidates;
                    }
                    Err(ApiError::Authentication(message)) => {
                        return Err(ScrapeError::Authentication(message));
                    }
                    Err(ApiError::Quota(e)) => return Err(e.into()),
                    Err(ApiError::RateLimited) => {
                        report.api_calls += 1;
                        report.failed += 1;
                        report.errors.push(format!("{} {}: rate limited", candidate.external_id, grade));
                        report.stopped_early = Some("rate limited by the price API".to_string());
                        break 'candidates;
                    }
                    Err(e) => {
                        report.api_calls += 1;
                        report.failed += 1;
                        report.errors.push(format!("{} {}: {}", candidate.external_id, grade, e));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                };
                report.api_calls += 1;

                match price_from_facts(&facts) {
                    Some(price) => {
                        if !self.dry_run {
                            self.repository
                                .upsert_price(&candidate.item_id, &GradeCode::new(grade), today, price, PriceSource::Api)
                                .await?;
                        }
                        debug!("Item {} {} = {}", candidate.external_id, grade, price);
                        report.updated += 1;
                    }
                    None => report.skipped += 1,
                }
                tokio::time::sleep(delay).await;
            }
        }

        info!("🏁 {}", report);
        Ok(report)
    }

    /// Stale items ordered by series tier, then oldest price first, unpriced last
    async fn candidates(&self, priority: Option<PriorityTier>) -> Result<Vec<RefreshCandidate>, ScrapeError> {
        let stale_before = self.clock.today() - ChronoDuration::days(self.config.stale_after_days);
        let mut candidates: Vec<(PriorityTier, RefreshCandidate)> = self
            .repository
            .refresh_candidates(stale_before)
            .await?
            .into_iter()
            .map(|candidate| (self.tier_of(&candidate), candidate))
            .filter(|(tier, _)| priority.is_none_or(|p| p == *tier))
            .collect();

        // Stable: the repository already returns oldest first, unpriced last
        candidates.sort_by_key(|(tier, _)| *tier);
        Ok(candidates.into_iter().map(|(_, candidate)| candidate).collect())
    }

    /// Items from series outside the catalog rank last
    fn tier_of(&self, candidate: &RefreshCandidate) -> PriorityTier {
        find_by_name(&self.catalog, &candidate.series_name).map_or(PriorityTier::P3, |entry| entry.priority)
    }
}
