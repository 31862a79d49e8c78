//! Price refresh against a scripted price API
mod common;

use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

use coin_catalog_lib::application::{PriceRefresher, ScrapeError};
use coin_catalog_lib::domain::catalog::PriorityTier;
use coin_catalog_lib::domain::item::{DetailPage, GradeCode, ItemDetail, ItemSummary, Price};
use coin_catalog_lib::domain::quota::BudgetPolicy;
use coin_catalog_lib::infrastructure::catalog_repository::{CatalogRepository, PriceSource, SqliteCatalogRepository};
use coin_catalog_lib::infrastructure::database_connection::DatabaseConnection;
use coin_catalog_lib::infrastructure::price_api::{ApiCredentials, PriceApiClient};
use coin_catalog_lib::infrastructure::quota_store::QuotaBudget;
use common::{RoutedTransport, test_catalog, test_clock, test_config};

const TOKEN_URL: &str = "https://api.test/publicapi/Authentication/GetToken";
const FACTS_PREFIX: &str = "https://api.test/publicapi/coindetail/GetCoinFactsByGrade*";

struct Fixture {
    _dir: TempDir,
    api: Arc<RoutedTransport>,
    repository: Arc<SqliteCatalogRepository>,
    quota: Arc<QuotaBudget>,
    refresher: PriceRefresher,
    morgan_id: String,
    peace_id: String,
}

fn item(external_id: i64, series: &str, title: &str) -> ItemDetail {
    ItemDetail::merge(
        ItemSummary {
            external_id,
            year: None,
            mint_mark: None,
            series_name: series.to_string(),
            display_name: title.to_string(),
        },
        DetailPage {
            external_id,
            ..DetailPage::default()
        },
    )
}

async fn fixture(daily_limit: u32) -> Fixture {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let clock = test_clock();

    let database = DatabaseConnection::new(&config.storage.catalog_database_url).await.unwrap();
    database.migrate().await.unwrap();
    let repository = Arc::new(SqliteCatalogRepository::new(database.pool().clone()));

    // Peace has an old price, Morgan none; tier order still puts Morgan first
    let peace_id = repository.upsert_item(&item(7356, "Peace Dollars", "1922 $1 Peace Dollar")).await.unwrap();
    repository
        .upsert_price(
            &peace_id,
            &GradeCode::new("MS65"),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            Price::from_cents(9_000),
            PriceSource::Scrape,
        )
        .await
        .unwrap();
    let morgan_id = repository.upsert_item(&item(101, "Morgan Dollars", "1881-S $1 Morgan Dollar")).await.unwrap();

    let quota = Arc::new(
        QuotaBudget::open(&config.storage.quota_file_path, daily_limit, BudgetPolicy::default(), clock.clone())
            .await
            .unwrap(),
    );

    let api = RoutedTransport::new();
    api.route(TOKEN_URL, 200, r#"{"access_token": "token-1", "expires_in": 86400}"#);
    api.route(FACTS_PREFIX, 200, r#"{"PCGSNo": 101, "PriceGuideValue": 125.5}"#);

    let client = Arc::new(PriceApiClient::new(
        api.clone(),
        config.api.clone(),
        Some(ApiCredentials {
            username: "collector".to_string(),
            password: "secret".to_string(),
        }),
        Some(quota.clone()),
        clock.clone(),
    ));
    let refresher = PriceRefresher::new(
        client,
        repository.clone(),
        quota.clone(),
        clock,
        config.api.clone(),
        test_catalog(),
    );

    Fixture {
        _dir: dir,
        api,
        repository,
        quota,
        refresher,
        morgan_id,
        peace_id,
    }
}

fn facts_calls(api: &RoutedTransport) -> Vec<String> {
    api.calls().into_iter().filter(|url| url.contains("GetCoinFactsByGrade")).collect()
}

#[tokio::test]
async fn spends_budget_on_highest_tier_first() {
    let fx = fixture(1000).await;

    let report = fx.refresher.refresh_prices(Some(4), None).await.unwrap();

    assert_eq!(report.budget, 4);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.api_calls, 4);
    assert_eq!(report.updated, 4);
    assert!(report.stopped_early.is_some());

    let calls = facts_calls(&fx.api);
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|url| url.contains("PCGSNo=101")));
    assert!(calls[0].contains("Grade=MS65"));
    assert_eq!(fx.api.calls_to(TOKEN_URL), 1);

    assert_eq!(fx.repository.price_count(&fx.morgan_id).await.unwrap(), 4);
    assert_eq!(fx.repository.price_count(&fx.peace_id).await.unwrap(), 1);
    assert_eq!(fx.quota.status().await.unwrap().calls_made, 4);
}

#[tokio::test]
async fn priority_filter_limits_candidates() {
    let fx = fixture(1000).await;

    let report = fx.refresher.refresh_prices(Some(100), Some(PriorityTier::P1)).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.api_calls, 6);
    assert!(report.stopped_early.is_none());
    assert!(facts_calls(&fx.api).iter().all(|url| url.contains("PCGSNo=7356")));
    assert_eq!(fx.repository.price_count(&fx.peace_id).await.unwrap(), 7);
}

#[tokio::test]
async fn exhausted_quota_stops_without_error() {
    let fx = fixture(3).await;

    let report = fx.refresher.refresh_prices(Some(50), None).await.unwrap();

    assert_eq!(report.api_calls, 3);
    assert_eq!(report.stopped_early.as_deref(), Some("daily quota exhausted"));
    assert_eq!(facts_calls(&fx.api).len(), 3);
    assert_eq!(fx.quota.remaining().await.unwrap(), 0);
}

#[tokio::test]
async fn default_budget_comes_from_the_quota() {
    // 80 remaining: min(80, 20)
    let fx = fixture(80).await;

    let report = fx.refresher.refresh_prices(None, None).await.unwrap();

    assert_eq!(report.budget, 20);
    assert_eq!(report.api_calls, 12);
}

#[tokio::test]
async fn dry_run_fetches_without_writing() {
    let fx = fixture(1000).await;
    let refresher = fx.refresher.with_dry_run(true);

    let report = refresher.refresh_prices(Some(2), None).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.updated, 2);
    assert_eq!(fx.repository.price_count(&fx.morgan_id).await.unwrap(), 0);
}

#[tokio::test]
async fn rejected_credentials_abort() {
    let fx = fixture(1000).await;
    fx.api.reroute(TOKEN_URL, 401, "unauthorized");

    let result = fx.refresher.refresh_prices(Some(5), None).await;

    assert!(matches!(result, Err(ScrapeError::Authentication(_))));
    assert!(facts_calls(&fx.api).is_empty());
}

#[tokio::test]
async fn zero_prices_are_skipped() {
    let fx = fixture(1000).await;
    fx.api.reroute(FACTS_PREFIX, 200, r#"{"PriceGuideValue": 0}"#);

    let report = fx.refresher.refresh_prices(Some(3), None).await.unwrap();

    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(fx.repository.price_count(&fx.morgan_id).await.unwrap(), 0);
}
