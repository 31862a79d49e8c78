//! Scrape orchestration
//!
//! Drives the polite fetcher and the page parser across the catalog,
//! validates each merged record, hands it to the catalog repository and
//! records every outcome in the progress store. Per-item problems are
//! recorded as failed items and the run continues; progress, quota and
//! repository faults abort it.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::report::{ErrorCategory, ItemFailure, RunReport, ScrapeError, SeriesOutcome};
use crate::domain::catalog::{CatalogEntry, PriorityTier, filter_by_priority, find_by_name, find_by_slug};
use crate::domain::item::{ItemDetail, ItemSummary, placeholder_name};
use crate::domain::progress::{ItemProgressRecord, ProgressSummary, RunFilters};
use crate::domain::quota::QuotaStatus;
use crate::domain::validation::RecordValidator;
use crate::infrastructure::catalog_repository::{CatalogRepository, PriceSource, RepositoryError};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::utils;
use crate::infrastructure::parsing::{CatalogPageParser, SelectorAudit, patterns};
use crate::infrastructure::polite_fetcher::{FetchStats, PoliteFetcher};
use crate::infrastructure::progress_store::ProgressStore;
use crate::infrastructure::quota_store::QuotaBudget;

const TOP_SELECTOR_HITS: usize = 5;

pub struct ScrapeOrchestrator {
    fetcher: Arc<PoliteFetcher>,
    parser: Arc<CatalogPageParser>,
    validator: RecordValidator,
    progress: Arc<ProgressStore>,
    repository: Arc<dyn CatalogRepository>,
    quota: Arc<QuotaBudget>,
    clock: Arc<dyn Clock>,
    base_url: String,
    catalog: Vec<CatalogEntry>,
}

impl ScrapeOrchestrator {
    pub fn new(
        fetcher: Arc<PoliteFetcher>,
        parser: Arc<CatalogPageParser>,
        validator: RecordValidator,
        progress: Arc<ProgressStore>,
        repository: Arc<dyn CatalogRepository>,
        quota: Arc<QuotaBudget>,
        clock: Arc<dyn Clock>,
        base_url: &str,
        catalog: Vec<CatalogEntry>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            validator,
            progress,
            repository,
            quota,
            clock,
            base_url: base_url.trim_end_matches('/').to_string(),
            catalog,
        }
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn fetch_stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    pub fn selector_audit(&self) -> SelectorAudit {
        self.parser.audit()
    }

    // ===============================
    // SCRAPING
    // ===============================

    /// Fetch and parse one listing page
    pub async fn scrape_series(&self, entry: &CatalogEntry) -> Result<Vec<ItemSummary>, ItemFailure> {
        let url = utils::listing_url(&self.base_url, entry);
        info!("📄 Fetching listing for {} ({})", entry.name, url);

        let outcome = self.fetcher.fetch(&url).await;
        let Some(html) = outcome.body else {
            warn!("Listing fetch failed for {} with status {}", entry.slug, outcome.status);
            return Err(ItemFailure::fetch_failed(outcome.status, &url));
        };

        let summaries = self.parser.parse_listing(&html, &entry.name);
        if summaries.is_empty() {
            warn!("⚠️ No items extracted from listing {}", url);
            return Err(ItemFailure::new(
                ErrorCategory::ExtractionMiss,
                format!("no items extracted from {url}"),
            ));
        }

        info!("🔍 Found {} items in {}", summaries.len(), entry.name);
        Ok(summaries)
    }

    /// Fetch one detail page and merge it into its summary
    pub async fn scrape_item_detail(&self, summary: &ItemSummary) -> Result<ItemDetail, ItemFailure> {
        let url = utils::detail_url(&self.base_url, summary.external_id);
        let outcome = self.fetcher.fetch(&url).await;
        let Some(html) = outcome.body else {
            return Err(ItemFailure::fetch_failed(outcome.status, &url));
        };

        let page = self.parser.parse_detail(&html, summary.external_id);
        if page.title.is_none() && page.denomination.is_none() && page.prices.is_empty() {
            return Err(ItemFailure::new(
                ErrorCategory::ExtractionMiss,
                format!("nothing extracted from {url}"),
            ));
        }

        let mut detail = ItemDetail::merge(summary.clone(), page);
        if detail.year.is_none() {
            detail.year = patterns::parse_year(&detail.display_name);
        }
        if detail.mint_mark.is_none() {
            detail.mint_mark = patterns::parse_mint_mark(&detail.display_name);
        }
        Ok(detail)
    }

    /// Scrape a series end to end, skipping items completed earlier. A
    /// series whose listing yields nothing stays in progress.
    pub async fn scrape_and_persist_series(&self, entry: &CatalogEntry) -> Result<SeriesOutcome, ScrapeError> {
        let mut outcome = SeriesOutcome::new(&entry.slug);
        if self.progress.is_series_complete(&entry.slug).await? {
            debug!("Series {} already completed", entry.slug);
            outcome.completed = true;
            return Ok(outcome);
        }

        self.progress.mark_series_started(&entry.slug, 0).await?;
        let summaries = match self.scrape_series(entry).await {
            Ok(summaries) => summaries,
            Err(failure) => {
                warn!("Series {} left in progress: {}", entry.slug, failure);
                outcome.record_failure(failure.category);
                outcome.listing_failure = Some(failure.to_string());
                return Ok(outcome);
            }
        };

        outcome.items_found = summaries.len();
        self.progress
            .mark_series_started(&entry.slug, i64::try_from(summaries.len()).unwrap_or(i64::MAX))
            .await?;

        for summary in &summaries {
            if self.progress.is_item_complete(summary.external_id).await? {
                outcome.items_skipped += 1;
                continue;
            }
            self.process_item(summary, &entry.slug, &mut outcome).await?;
        }

        self.progress.mark_series_complete(&entry.slug).await?;
        outcome.completed = true;
        info!(
            "📦 {}: {} scraped, {} failed, {} skipped, {} prices",
            entry.name, outcome.items_scraped, outcome.items_failed, outcome.items_skipped, outcome.prices_saved
        );
        Ok(outcome)
    }

    /// Scrape every selected series that is not yet completed
    pub async fn run(&self, filters: RunFilters) -> Result<RunReport, ScrapeError> {
        let targets = self.select_series(&filters).await?;
        let run_id = self.progress.start_run(&filters).await?;
        let mut report = RunReport::new(Some(run_id));
        info!("🚀 Run #{} started over {} series", run_id, targets.len());

        for entry in &targets {
            if self.progress.is_series_complete(&entry.slug).await? {
                report.series_skipped += 1;
                continue;
            }
            match self.scrape_and_persist_series(entry).await {
                Ok(outcome) => report.absorb(&outcome),
                Err(e) => {
                    error!("❌ Run #{} aborted in {}: {}", run_id, entry.slug, e);
                    report.aborted = Some(e.to_string());
                    self.fill_fetch_report(&mut report);
                    if let Err(close_err) = self.close_run(run_id, &report).await {
                        warn!("Could not close run #{}: {}", run_id, close_err);
                    }
                    error!("{}", report);
                    return Err(e);
                }
            }
        }

        self.fill_fetch_report(&mut report);
        self.close_run(run_id, &report).await?;
        info!("🏁 Run #{} finished\n{}", run_id, report);
        Ok(report)
    }

    /// Re-fetch failed items still under the retry ceiling
    pub async fn retry_failed_items(&self, max_retries: i64) -> Result<RunReport, ScrapeError> {
        let failed = self.progress.get_failed_items(None, max_retries).await?;
        info!("🔁 Retrying {} failed items", failed.len());

        let mut report = RunReport::new(None);
        let mut outcomes: BTreeMap<String, SeriesOutcome> = BTreeMap::new();
        for record in &failed {
            let summary = self.retry_summary(record);
            let outcome = outcomes
                .entry(record.series_slug.clone())
                .or_insert_with(|| SeriesOutcome::new(&record.series_slug));
            outcome.items_found += 1;

            if let Err(e) = self.process_item(&summary, &record.series_slug, outcome).await {
                error!("❌ Retry aborted at item {}: {}", record.external_id, e);
                for outcome in outcomes.values() {
                    report.absorb(outcome);
                }
                report.aborted = Some(e.to_string());
                self.fill_fetch_report(&mut report);
                return Err(e);
            }
        }

        for outcome in outcomes.values_mut() {
            // Completed series keep their item counts current
            if self.progress.is_series_complete(&outcome.slug).await? {
                self.progress.mark_series_complete(&outcome.slug).await?;
                outcome.completed = true;
            }
            report.absorb(outcome);
        }
        self.fill_fetch_report(&mut report);
        info!("🏁 Retry finished\n{}", report);
        Ok(report)
    }

    // ===============================
    // QUERIES
    // ===============================

    pub async fn get_progress_summary(&self) -> Result<ProgressSummary, ScrapeError> {
        Ok(self.progress.get_progress_summary(&self.catalog).await?)
    }

    pub async fn get_pending_series(&self, priority: Option<PriorityTier>) -> Result<Vec<CatalogEntry>, ScrapeError> {
        Ok(self.progress.get_pending_series(&self.catalog, priority).await?)
    }

    pub async fn get_failed_items(
        &self,
        series_slug: Option<&str>,
        max_retries: i64,
    ) -> Result<Vec<ItemProgressRecord>, ScrapeError> {
        Ok(self.progress.get_failed_items(series_slug, max_retries).await?)
    }

    pub async fn calculate_daily_budget(&self) -> Result<u32, ScrapeError> {
        Ok(self.quota.calculate_daily_budget().await?)
    }

    pub async fn get_quota_status(&self) -> Result<QuotaStatus, ScrapeError> {
        Ok(self.quota.status().await?)
    }

    // ===============================
    // INTERNALS
    // ===============================

    async fn select_series(&self, filters: &RunFilters) -> Result<Vec<CatalogEntry>, ScrapeError> {
        let mut selected: Vec<CatalogEntry> = match &filters.series {
            Some(key) => {
                let entry = find_by_slug(&self.catalog, key)
                    .or_else(|| find_by_name(&self.catalog, key))
                    .ok_or_else(|| ScrapeError::UnknownSeries(key.clone()))?;
                vec![entry.clone()]
            }
            None => filter_by_priority(&self.catalog, filters.priority)
                .into_iter()
                .cloned()
                .collect(),
        };

        if filters.resume {
            if let Some(point) = self.progress.get_resume_point().await? {
                if let Some(position) = selected.iter().position(|e| e.slug == point.series_slug) {
                    info!(
                        "⏯️ Resuming {} ({} done, {} failed of {})",
                        point.series_slug, point.items_completed, point.items_failed, point.items_found
                    );
                    let entry = selected.remove(position);
                    selected.insert(0, entry);
                }
            }
        }
        Ok(selected)
    }

    /// Fetch, validate, persist and record one item
    async fn process_item(
        &self,
        summary: &ItemSummary,
        series_slug: &str,
        outcome: &mut SeriesOutcome,
    ) -> Result<(), ScrapeError> {
        let detail = match self.scrape_item_detail(summary).await {
            Ok(detail) => detail,
            Err(failure) => {
                return self.record_failure(summary, series_slug, failure, outcome).await;
            }
        };

        let validation = self.validator.validate(&detail);
        for finding in &validation.warnings {
            debug!("Item {} warning on {}: {}", detail.external_id, finding.field, finding.message);
        }
        if !validation.is_valid() {
            let message = validation
                .first_error()
                .unwrap_or_else(|| "record failed validation".to_string());
            let failure = ItemFailure::new(ErrorCategory::ValidationFailure, message);
            return self.record_failure(summary, series_slug, failure, outcome).await;
        }

        match self.persist(&detail).await {
            Ok(prices_saved) => {
                self.progress.mark_item_complete(detail.external_id, series_slug).await?;
                outcome.items_scraped += 1;
                outcome.prices_saved += prices_saved;
                debug!("Item {} saved with {} prices", detail.external_id, prices_saved);
                Ok(())
            }
            Err(e) => {
                let failure = ItemFailure::new(ErrorCategory::StorageFailure, e.to_string());
                self.record_failure(summary, series_slug, failure, outcome).await?;
                Err(e.into())
            }
        }
    }

    async fn persist(&self, detail: &ItemDetail) -> Result<usize, RepositoryError> {
        let item_id = self.repository.upsert_item(detail).await?;
        let today = self.clock.today();
        for (grade, price) in &detail.prices {
            self.repository
                .upsert_price(&item_id, grade, today, *price, PriceSource::Scrape)
                .await?;
        }
        Ok(detail.prices.len())
    }

    async fn record_failure(
        &self,
        summary: &ItemSummary,
        series_slug: &str,
        failure: ItemFailure,
        outcome: &mut SeriesOutcome,
    ) -> Result<(), ScrapeError> {
        warn!("Item {} failed: {}", summary.external_id, failure);
        self.progress
            .mark_item_failed(summary.external_id, series_slug, &failure.to_string())
            .await?;
        outcome.items_failed += 1;
        outcome.record_failure(failure.category);
        outcome.failed_ids.push(summary.external_id);
        Ok(())
    }

    /// Summary for an item known only by id; the detail title fills the rest
    fn retry_summary(&self, record: &ItemProgressRecord) -> ItemSummary {
        let series_name = find_by_slug(&self.catalog, &record.series_slug)
            .map_or_else(|| record.series_slug.clone(), |entry| entry.name.clone());
        ItemSummary {
            external_id: record.external_id,
            year: None,
            mint_mark: None,
            series_name,
            display_name: placeholder_name(record.external_id),
        }
    }

    fn fill_fetch_report(&self, report: &mut RunReport) {
        let stats = self.fetcher.stats();
        report.http_status = stats.status_histogram;
        report.session_refreshes = stats.session_refreshes;
        report.top_selector_hits = self.parser.audit().top_hits(TOP_SELECTOR_HITS);
    }

    async fn close_run(&self, run_id: i64, report: &RunReport) -> Result<(), ScrapeError> {
        self.progress
            .complete_run(
                run_id,
                i64::try_from(report.items_scraped).unwrap_or(i64::MAX),
                i64::try_from(report.items_failed).unwrap_or(i64::MAX),
            )
            .await?;
        Ok(())
    }
}
