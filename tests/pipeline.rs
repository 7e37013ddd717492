//! End-to-end exercises of the Worker state machine against fake stores,
//! following §8's scenario list. Each scenario stands up wiremock
//! servers in place of the document store(s) and the upstream API, then
//! drives `process_item` directly rather than going through a live
//! queue and pool of workers.

use std::sync::Arc;
use std::time::Duration;

use archivarius_bridge::couch_client::CouchClient;
use archivarius_bridge::crypto::{self, Sealer};
use archivarius_bridge::models::WorkItem;
use archivarius_bridge::pool::{BackoffConfig, ClientPool};
use archivarius_bridge::public_archive::PublicArchive;
use archivarius_bridge::queues::WorkQueue;
use archivarius_bridge::secret_store::SecretStore;
use archivarius_bridge::source_store::SourceStore;
use archivarius_bridge::stats::Stats;
use archivarius_bridge::worker::{process_item, WorkerContext};

use chrono::Utc;
use crypto_box::SecretKey;
use rand::rngs::OsRng;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn recipient_hex() -> (SecretKey, String) {
    let secret = SecretKey::generate(&mut OsRng);
    let hex = secret
        .public_key()
        .as_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    (secret, hex)
}

struct Fixture {
    ctx: WorkerContext,
    retry_queue: Arc<WorkQueue>,
    stats: Arc<Stats>,
    secret_key: SecretKey,
}

async fn build_fixture(couch: &MockServer, upstream: &MockServer, retries_count_max: u32) -> Fixture {
    let (secret_key, recipient_hex) = recipient_hex();
    let source = SourceStore::new(CouchClient::new(reqwest::Client::new(), couch.uri(), "edge_db"));
    let public = PublicArchive::new(CouchClient::new(reqwest::Client::new(), couch.uri(), "archive_db"));
    let secret = SecretStore::Couch(CouchClient::new(reqwest::Client::new(), couch.uri(), "archive_db_secret"));

    let pool = Arc::new(ClientPool::new(upstream.uri(), "test-key", "ArchivariusBridge"));
    pool.refill_to(1).await;

    let stats = Stats::new();
    let retry_queue = Arc::new(WorkQueue::new(None));

    let ctx = WorkerContext {
        source,
        public,
        secret,
        pool,
        sealer: Arc::new(Sealer::from_hex(&recipient_hex).unwrap()),
        stats: stats.clone(),
        retry_queue: retry_queue.clone(),
        backoff: BackoffConfig {
            inc_step: 0.1,
            dec_step: 0.02,
            drop_threshold: 2.0,
        },
        retries_count_max,
        worker_sleep: Duration::from_millis(10),
        queue_timeout: Duration::from_millis(50),
    };

    Fixture { ctx, retry_queue, stats, secret_key }
}

fn source_doc_json(id: Uuid, rev: &str) -> serde_json::Value {
    json!({
        "_id": id,
        "_rev": rev,
        "date_modified": Utc::now(),
        "doc_type": "Tender",
        "payload": {"title": "a tender"},
    })
}

#[tokio::test]
async fn test_s_happy_path_archives_and_clears_stats() {
    let couch = MockServer::start().await;
    let upstream = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(source_doc_json(id, "1-a")))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&couch)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"amount": 42}})))
        .mount(&upstream)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let fixture = build_fixture(&couch, &upstream, 10).await;
    let item = WorkItem::new(id, "tenders", Duration::from_millis(50));
    process_item(&fixture.ctx, item).await;

    let snap = fixture.stats.snapshot();
    assert_eq!(snap.moved_to_public, 1);
    assert_eq!(snap.dumped_to_secret, 1);
    assert_eq!(snap.archived, 1);
    assert_eq!(snap.exceptions, 0);
    assert_eq!(snap.dropped, 0);
    assert!(fixture.retry_queue.is_empty());

    // §8 testable property 1: the sealed payload in SecretStore decrypts
    // back to exactly the dump the upstream API returned.
    let record = fixture
        .ctx
        .secret
        .get(id)
        .await
        .expect("secret store lookup should not error")
        .expect("secret record should have been written by S5");
    let opened = crypto::open(&fixture.secret_key, &record.data).expect("sealed payload should decrypt");
    let plaintext: serde_json::Value = serde_json::from_slice(&opened).expect("decrypted payload should be JSON");
    assert_eq!(plaintext, json!({"amount": 42}));
}

#[tokio::test]
async fn test_s_429_then_ok_recovers_on_retry() {
    let couch = MockServer::start().await;
    let upstream = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(source_doc_json(id, "1-a")))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&couch)
        .await;

    // First dump fetch is rate limited; the second (after requeue) succeeds.
    Mock::given(method("GET"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"amount": 42}})))
        .mount(&upstream)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let fixture = build_fixture(&couch, &upstream, 10).await;
    let item = WorkItem::new(id, "tenders", Duration::from_millis(20));
    process_item(&fixture.ctx, item).await;

    // first pass: rate-limited, requeued, not yet archived.
    let snap = fixture.stats.snapshot();
    assert_eq!(snap.exceptions, 1);
    assert_eq!(snap.retried, 1);
    assert_eq!(snap.archived, 0);

    let requeued = fixture
        .retry_queue
        .pop_timeout(Duration::from_millis(200))
        .await
        .expect("retried item should reappear on the retry queue");

    // The client handle used by the first attempt is still on its
    // rate-limit release delay (up to `inc_step` seconds); give it time
    // to come back before acquiring it again.
    tokio::time::sleep(Duration::from_millis(150)).await;
    process_item(&fixture.ctx, requeued).await;

    let snap = fixture.stats.snapshot();
    assert_eq!(snap.archived, 1);
    assert_eq!(snap.dumped_to_secret, 1);
}

#[tokio::test]
async fn test_s_not_found_is_terminal_without_retry_or_drop() {
    let couch = MockServer::start().await;
    let upstream = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(source_doc_json(id, "1-a")))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;

    let fixture = build_fixture(&couch, &upstream, 10).await;
    let item = WorkItem::new(id, "tenders", Duration::from_millis(50));
    process_item(&fixture.ctx, item).await;

    let snap = fixture.stats.snapshot();
    assert_eq!(snap.not_found, 1);
    assert_eq!(snap.dropped, 0);
    assert_eq!(snap.retried, 0);
    assert_eq!(snap.archived, 0);
    assert!(fixture.retry_queue.is_empty());
}

#[tokio::test]
async fn test_s_drop_after_exceeding_retries_count_max() {
    let couch = MockServer::start().await;
    let upstream = MockServer::start().await;
    let id = Uuid::new_v4();

    // Source lookup itself fails every time; retries_count_max = 0 means
    // the very first failure exceeds the budget and the item is dropped.
    Mock::given(method("GET"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&couch)
        .await;

    let fixture = build_fixture(&couch, &upstream, 0).await;
    let item = WorkItem::new(id, "tenders", Duration::from_millis(50));
    process_item(&fixture.ctx, item).await;

    let snap = fixture.stats.snapshot();
    assert_eq!(snap.dropped, 1);
    assert_eq!(snap.retried, 0);
    assert!(fixture.retry_queue.is_empty());
}

#[tokio::test]
async fn test_s_mirror_current_skips_redundant_public_write() {
    let couch = MockServer::start().await;
    let upstream = MockServer::start().await;
    let id = Uuid::new_v4();
    let now = Utc::now();
    let source_doc = json!({
        "_id": id,
        "_rev": "1-a",
        "date_modified": now,
        "doc_type": "Tender",
        "payload": {"title": "a tender"},
    });
    let archived_doc = json!({
        "_id": id,
        "_rev": "1-a",
        "date_modified": now,
        "doc_type": "Tender",
        "payload": {"title": "a tender"},
    });

    Mock::given(method("GET"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(source_doc))
        .mount(&couch)
        .await;
    // Already archived at the same date_modified: no PUT should happen. If
    // the Worker mistakenly issued one, it would 404 against this mock set
    // and surface as an exception instead of a clean moved_to_public.
    Mock::given(method("GET"))
        .and(path(format!("/archive_db/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(archived_doc))
        .mount(&couch)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&couch)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/archive_db_secret/{id}")))
        .respond_with(ResponseTemplate::new(201))
        .mount(&couch)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/edge_db/{id}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&couch)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"amount": 1}})))
        .mount(&upstream)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/tenders/{id}/dump")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let fixture = build_fixture(&couch, &upstream, 10).await;
    let item = WorkItem::new(id, "tenders", Duration::from_millis(50));
    process_item(&fixture.ctx, item).await;

    let snap = fixture.stats.snapshot();
    assert_eq!(snap.moved_to_public, 1);
    assert_eq!(snap.exceptions, 0);
    assert_eq!(snap.archived, 1);
}
