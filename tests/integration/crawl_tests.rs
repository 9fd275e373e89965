//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the listing site (root page for
//! cookie warm-up plus the search API) and exercise the transport, the search
//! client and the full crawl cycle end-to-end.

use listing_crawler::catalog::import_catalog;
use listing_crawler::checkpoint::{open_checkpoint_store, CheckpointStore, FileCheckpointStore};
use listing_crawler::config::{
    CheckpointBackend, CheckpointConfig, Config, CrawlConfig, LoggingConfig, PriceHistoryPolicy,
    SiteConfig, StorageConfig, TransportConfig,
};
use listing_crawler::crawler::{
    run_crawl, Coordinator, CrawlOptions, CrawlSummary, ListingSource, PageResult, SearchClient,
    SearchFilters, Transport, UnitOutcome,
};
use listing_crawler::storage::{RunStatus, SqliteStorage, Storage};
use listing_crawler::{CrawlError, WorkUnit};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn site_config(server: &MockServer) -> SiteConfig {
    SiteConfig {
        base_url: server.uri(),
        api_base: format!("{}/api", server.uri()),
        listing_path: "for-rent".to_string(),
        source: "streeteasy".to_string(),
    }
}

fn transport_config() -> TransportConfig {
    TransportConfig {
        request_timeout_secs: 5,
        backoff_base_ms: 1,
        max_retries: 3,
        ..TransportConfig::default()
    }
}

fn unit(slug: &str) -> WorkUnit {
    WorkUnit {
        id: 0,
        name: slug.to_string(),
        slug: slug.to_string(),
        level: None,
    }
}

fn listings_page(ids: &[u64], total_pages: Option<u32>) -> ResponseTemplate {
    let listings: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "url": format!("/rental/{}", id),
                "address": format!("{} Broadway", id),
                "price": 3000 + id,
                "beds": 1,
                "noFee": true
            })
        })
        .collect();
    let mut body = json!({ "listings": listings });
    if let Some(total) = total_pages {
        body["totalPages"] = json!(total);
    }
    ResponseTemplate::new(200).set_body_json(body)
}

fn empty_page() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "listings": [] }))
}

async fn mount_root(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

async fn search_client(server: &MockServer) -> SearchClient {
    let site = site_config(server);
    let transport = Transport::connect(&site, &transport_config()).await.unwrap();
    SearchClient::new(transport, site)
}

fn crawl_options() -> CrawlOptions {
    CrawlOptions {
        request_delay: Duration::ZERO,
        ..CrawlOptions::default()
    }
}

// ===== Transport =====

#[tokio::test]
async fn test_block_recovers_after_three_reinitializations() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(listings_page(&[1, 2], Some(1)))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client
        .search("midtown", &SearchFilters::default(), 1)
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(client.transport().reinit_count(), 3);
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 4);
    // One warm-up at connect, one per reinitialization
    assert_eq!(requests_to(&server, "/").await, 4);
}

#[tokio::test]
async fn test_persistent_block_is_fatal() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client.search("midtown", &SearchFilters::default(), 1).await;

    assert!(matches!(result, Err(CrawlError::Blocked { attempts: 3, .. })));
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 4);
}

#[tokio::test]
async fn test_transient_errors_retry_without_new_session() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(listings_page(&[7], None))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let session = client.transport().session_id().to_string();
    let result = client.search("soho", &SearchFilters::default(), 1).await;

    assert_eq!(result.unwrap().len(), 1);
    assert_eq!(client.transport().reinit_count(), 0);
    assert_eq!(client.transport().session_id(), session);
    assert_eq!(requests_to(&server, "/").await, 1);
}

#[tokio::test]
async fn test_other_status_fails_without_retry() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client.search("soho", &SearchFilters::default(), 1).await;

    assert!(matches!(
        result,
        Err(CrawlError::HttpStatus { status: 404, .. })
    ));
    assert_eq!(requests_to(&server, "/api/for-rent/soho").await, 1);
}

#[tokio::test]
async fn test_warm_up_failure_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(listings_page(&[1], None))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client.search("soho", &SearchFilters::default(), 1).await;

    assert_eq!(result.unwrap().len(), 1);
}

// ===== Search Client =====

#[tokio::test]
async fn test_api_requests_carry_api_headers() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(header("sec-fetch-mode", "cors"))
        .and(header("referer", format!("{}/for-rent", server.uri()).as_str()))
        .and(header("origin", server.uri().as_str()))
        .respond_with(listings_page(&[1], None))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client.search("soho", &SearchFilters::default(), 1).await;

    assert_eq!(result.unwrap().len(), 1);
}

#[tokio::test]
async fn test_filtered_search_url() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/api/for-rent/soho/price:-4000(\||%7C)beds:1$"))
        .and(query_param("page", "2"))
        .respond_with(listings_page(&[11], Some(3)))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let filters = SearchFilters {
        beds: Some(1),
        max_price: Some(4000),
    };
    let result = client.search("soho", &filters, 2).await.unwrap();

    match result {
        PageResult::Listings {
            records,
            total_pages,
            ..
        } => {
            assert_eq!(total_pages, Some(3));
            assert_eq!(records[0].external_id, "11");
        }
        other => panic!("expected listings, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
        .mount(&server)
        .await;

    let mut client = search_client(&server).await;
    let result = client
        .search("soho", &SearchFilters::default(), 1)
        .await
        .unwrap();

    assert!(matches!(result, PageResult::Malformed { .. }));
}

// ===== Orchestrator =====

#[tokio::test]
async fn test_unit_pages_until_empty_page() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    for (page, response) in [
        ("1", listings_page(&[1, 2], None)),
        ("2", listings_page(&[3], None)),
        ("3", empty_page()),
    ] {
        Mock::given(method("GET"))
            .and(path("/api/for-rent/midtown"))
            .and(query_param("page", page))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    let checkpoints = FileCheckpointStore::open(&dir.path().join("done.txt")).unwrap();
    let mut coordinator = Coordinator::new(
        search_client(&server).await,
        checkpoints,
        storage,
        crawl_options(),
        CancellationToken::new(),
    );

    let outcome = coordinator.crawl_unit(&unit("midtown"), 1).await.unwrap();

    assert_eq!(
        outcome,
        UnitOutcome::Done {
            pages: 2,
            listings: 3
        }
    );
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 3);

    let (_, checkpoints, storage) = coordinator.into_parts();
    assert!(checkpoints.is_complete("midtown").unwrap());
    assert_eq!(storage.count_listings().unwrap(), 3);
    assert_eq!(storage.count_price_history().unwrap(), 3);

    let rows = storage.read_listings(10).unwrap();
    assert!(rows.iter().all(|r| r.fee == Some(false)));
    assert!(rows
        .iter()
        .all(|r| r.url.as_deref().unwrap_or("").starts_with(&server.uri())));
}

#[tokio::test]
async fn test_checkpointed_unit_is_not_requested() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(listings_page(&[5], Some(1)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let checkpoint_path = dir.path().join("done.txt");
    std::fs::write(&checkpoint_path, "midtown\n").unwrap();

    let mut coordinator = Coordinator::new(
        search_client(&server).await,
        FileCheckpointStore::open(&checkpoint_path).unwrap(),
        SqliteStorage::new(&dir.path().join("crawl.db")).unwrap(),
        crawl_options(),
        CancellationToken::new(),
    );

    let summary = coordinator
        .run(&[unit("midtown"), unit("soho")])
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.done, 1);
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 0);
    assert_eq!(requests_to(&server, "/api/for-rent/soho").await, 1);
    assert_eq!(
        std::fs::read_to_string(&checkpoint_path).unwrap(),
        "midtown\nsoho\n"
    );
}

#[tokio::test]
async fn test_failed_unit_halts_run() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(listings_page(&[1], Some(1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    let run_id = storage.create_run("test").unwrap();

    let mut coordinator = Coordinator::new(
        search_client(&server).await,
        FileCheckpointStore::open(&dir.path().join("done.txt")).unwrap(),
        storage,
        crawl_options(),
        CancellationToken::new(),
    );

    let summary = coordinator
        .run(&[unit("midtown"), unit("soho"), unit("chelsea")])
        .await
        .unwrap();

    assert_eq!(summary.done, 1);
    assert_eq!(summary.pending(), 2);
    let halt = summary.halted_at.clone().unwrap();
    assert_eq!((halt.unit.as_str(), halt.page), ("soho", 1));
    assert_eq!(requests_to(&server, "/api/for-rent/chelsea").await, 0);

    let (_, checkpoints, mut storage) = coordinator.into_parts();
    assert!(checkpoints.is_complete("midtown").unwrap());
    assert!(!checkpoints.is_complete("soho").unwrap());

    storage
        .finish_run(run_id, summary.status(), summary.completed() as u64, 1)
        .unwrap();
    assert_eq!(storage.get_run(run_id).unwrap().status, RunStatus::Halted);
}

#[tokio::test]
async fn test_recrawl_is_idempotent_for_entities() {
    let server = MockServer::start().await;
    mount_root(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(listings_page(&[1, 2], Some(1)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    let mut checkpoints = FileCheckpointStore::open(&dir.path().join("done.txt")).unwrap();

    for _ in 0..2 {
        checkpoints.clear().unwrap();
        let mut coordinator = Coordinator::new(
            search_client(&server).await,
            checkpoints,
            storage,
            crawl_options(),
            CancellationToken::new(),
        );
        coordinator.run(&[unit("midtown")]).await.unwrap();
        let (_, c, s) = coordinator.into_parts();
        checkpoints = c;
        storage = s;
    }

    assert_eq!(storage.count_listings().unwrap(), 2);
    assert_eq!(storage.count_price_history().unwrap(), 4);
}

// ===== Full run =====

/// Config pointing at the mock server with its database and checkpoints in `dir`
fn full_config(server: &MockServer, dir: &TempDir, backend: CheckpointBackend) -> Config {
    Config {
        site: site_config(server),
        transport: transport_config(),
        crawl: CrawlConfig {
            request_delay_ms: 0,
            ..CrawlConfig::default()
        },
        storage: StorageConfig {
            database_path: dir.path().join("crawl.db").display().to_string(),
            price_history: PriceHistoryPolicy::EverySighting,
        },
        checkpoint: CheckpointConfig {
            backend,
            path: dir.path().join("logs").join("done.txt").display().to_string(),
        },
        logging: LoggingConfig::default(),
    }
}

/// Imports Manhattan with two leaves, Midtown and SoHo
fn seed_catalog(config: &Config, dir: &TempDir) {
    let dump = dir.path().join("areas.json");
    std::fs::write(
        &dump,
        r#"{"data": {"areas": [
            {"id": 1, "name": "Manhattan", "level": 1},
            {"id": 2, "name": "Midtown", "level": 2, "parent_id": 1},
            {"id": 3, "name": "SoHo", "level": 2, "parent_id": 1}
        ]}}"#,
    )
    .unwrap();
    let mut storage = open_db(config);
    assert_eq!(import_catalog(&mut storage, &dump).unwrap(), 3);
}

async fn crawl(config: &Config, hash: &str, fresh: bool, cancel: CancellationToken) -> CrawlSummary {
    run_crawl(config, hash, CrawlOptions::from_config(&config.crawl), fresh, cancel)
        .await
        .unwrap()
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.storage.database_path)).unwrap()
}

#[tokio::test]
async fn test_run_crawl_with_table_checkpoints_and_fresh_restart() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(listings_page(&[1], Some(1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(listings_page(&[2, 3], Some(1)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = full_config(&server, &dir, CheckpointBackend::Table);
    seed_catalog(&config, &dir);

    let first = crawl(&config, "hash-a", false, CancellationToken::new()).await;
    assert_eq!(first.done, 2);
    assert_eq!(first.listings, 3);
    assert_eq!(first.status(), RunStatus::Completed);

    let checkpoints = open_checkpoint_store(&config).unwrap();
    assert!(checkpoints.is_complete("midtown").unwrap());
    assert!(checkpoints.is_complete("soho").unwrap());
    assert!(!dir.path().join("logs").join("done.txt").exists());
    drop(checkpoints);

    // Resumed run: everything is checkpointed, so no search requests
    let second = crawl(&config, "hash-a", false, CancellationToken::new()).await;
    assert_eq!(second.skipped, 2);
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 1);

    // Fresh run forgets the checkpoints and crawls again
    let third = crawl(&config, "hash-b", true, CancellationToken::new()).await;
    assert_eq!(third.done, 2);
    assert_eq!(requests_to(&server, "/api/for-rent/midtown").await, 2);
    assert_eq!(requests_to(&server, "/api/for-rent/soho").await, 2);

    let storage = open_db(&config);
    let run = storage.get_run(1).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.units_completed, 2);
    assert_eq!(run.config_hash, "hash-a");
    assert!(run.finished_at.is_some());
    assert_eq!(storage.get_run(3).unwrap().config_hash, "hash-b");
    assert_eq!(storage.count_listings().unwrap(), 3);
}

#[tokio::test]
async fn test_run_crawl_records_halted_then_interrupted() {
    let server = MockServer::start().await;
    mount_root(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/midtown"))
        .respond_with(listings_page(&[1], Some(1)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/for-rent/soho"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = full_config(&server, &dir, CheckpointBackend::File);
    seed_catalog(&config, &dir);

    let halted = crawl(&config, "hash", false, CancellationToken::new()).await;
    let halt = halted.halted_at.clone().unwrap();
    assert_eq!((halt.unit.as_str(), halt.page), ("soho", 1));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("logs").join("done.txt")).unwrap(),
        "midtown\n"
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let interrupted = crawl(&config, "hash", false, cancel).await;
    assert_eq!(interrupted.skipped, 1);
    assert_eq!(interrupted.status(), RunStatus::Interrupted);
    assert_eq!(requests_to(&server, "/api/for-rent/soho").await, 1);

    let storage = open_db(&config);
    let run = storage.get_run(1).unwrap();
    assert_eq!(run.status, RunStatus::Halted);
    assert_eq!(run.units_completed, 1);
    assert_eq!(run.units_failed, 1);
    assert_eq!(storage.get_run(2).unwrap().status, RunStatus::Interrupted);
}
