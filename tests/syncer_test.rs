//! End-to-end tests of the sync engine against scripted nodes and in-memory
//! bookkeeping.

use std::sync::Arc;

use catalog_sync::testing::{ts, FailingObserver, RecordingObserver, TestNode};
use catalog_sync::{
    Action, Filter, FilterIndex, FilterIndexStore, ItemLedger, Metadata, ObserverSet,
    ReplicationItem, Status, SyncReport, Syncer, REPLICATED_TAG,
};
use ledger::{MemoryIndexStore, MemoryLedger};

const FILTER_ID: &str = "f1";

struct Harness {
    ledger: Arc<MemoryLedger>,
    indexes: Arc<MemoryIndexStore>,
    syncer: Syncer<MemoryLedger, MemoryIndexStore>,
    source: TestNode,
    destination: TestNode,
}

impl Harness {
    fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let indexes = Arc::new(MemoryIndexStore::new());
        let syncer = Syncer::new(ledger.clone(), indexes.clone());
        Self {
            ledger,
            indexes,
            syncer,
            source: TestNode::named("source-node"),
            destination: TestNode::named("destination-node"),
        }
    }

    fn filter() -> Filter {
        Filter::new(FILTER_ID, "imagery", "type = 'imagery'")
    }

    async fn run(&self) -> SyncReport {
        self.run_with_observers(ObserverSet::new()).await
    }

    async fn run_with_observers(&self, observers: ObserverSet) -> SyncReport {
        let job = self
            .syncer
            .create_job(
                Box::new(self.source.clone()),
                Box::new(self.destination.clone()),
                Self::filter(),
                observers,
            )
            .await
            .unwrap();
        job.sync().await.unwrap()
    }

    /// Seed a prior ledger entry for a record under the test filter.
    async fn seed_prior(
        &self,
        metadata_id: &str,
        action: Action,
        status: Status,
        metadata_millis: i64,
        resource_millis: Option<i64>,
    ) {
        let item = ReplicationItem {
            metadata_id: metadata_id.to_string(),
            filter_id: FILTER_ID.to_string(),
            source_name: "source-node".to_string(),
            destination_name: "destination-node".to_string(),
            action,
            status,
            start_time: ts(990),
            done_time: ts(1000),
            metadata_modified: ts(metadata_millis),
            resource_modified: resource_millis.map(ts),
            metadata_size: None,
            resource_size: None,
        };
        self.ledger.save(&item).await.unwrap();
    }

    async fn seed_watermark(&self, millis: i64) {
        let index = FilterIndex {
            id: FILTER_ID.to_string(),
            modified_since: Some(ts(millis)),
        };
        self.indexes.save(&index).await.unwrap();
    }

    async fn watermark(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.indexes
            .get_or_create(FILTER_ID)
            .await
            .unwrap()
            .modified_since
    }

    async fn latest(&self, metadata_id: &str) -> ReplicationItem {
        self.ledger
            .get_latest(FILTER_ID, metadata_id)
            .await
            .expect("expected a ledger entry")
    }

    async fn entry_count(&self) -> usize {
        self.ledger
            .all_for_filter(FILTER_ID, 0, usize::MAX)
            .await
            .unwrap()
            .len()
    }
}

fn record(id: &str, metadata_millis: i64) -> Metadata {
    Metadata::new(id, ts(metadata_millis))
}

fn record_with_resource(id: &str, metadata_millis: i64, resource_millis: i64) -> Metadata {
    let mut metadata = record(id, metadata_millis);
    metadata.resource_uri = Some(format!("https://source-node/resources/{id}"));
    metadata.resource_modified = Some(ts(resource_millis));
    metadata.resource_size = Some(64);
    metadata
}

// ============================================================================
// First-run creates
// ============================================================================

#[tokio::test]
async fn test_first_run_creates_metadata_only_record() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));

    let report = h.run().await;

    assert_eq!(h.destination.calls(), vec!["exists:r1", "create:r1"]);
    let item = h.latest("r1").await;
    assert_eq!(item.action, Action::Create);
    assert_eq!(item.status, Status::Success);
    assert!(item.start_time <= item.done_time);
    assert_eq!(h.watermark().await, Some(ts(100)));
    assert_eq!(report.observed, 1);
    assert_eq!(report.saved, 1);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_first_run_query_carries_no_watermark_and_excludes_destination() {
    let h = Harness::new();
    h.run().await;

    let query = h.source.last_query().unwrap();
    assert_eq!(query.query, "type = 'imagery'");
    assert_eq!(query.exclusions, vec!["destination-node".to_string()]);
    assert!(query.failed_ids.is_empty());
    assert!(query.modified_after.is_none());
}

#[tokio::test]
async fn test_create_with_resource_uses_storage_path() {
    let h = Harness::new();
    h.source.yield_record(record_with_resource("r1", 100, 90));
    h.source.put_resource("r1", b"payload");

    h.run().await;

    assert_eq!(h.source.calls(), vec!["query:type = 'imagery'", "read_resource:r1"]);
    assert_eq!(
        h.destination.calls(),
        vec!["exists:r1", "create_resource:r1"]
    );
    let item = h.latest("r1").await;
    assert_eq!(item.action, Action::Create);
    assert_eq!(item.resource_modified, Some(ts(90)));
    assert_eq!(item.resource_size, Some(64));
}

#[tokio::test]
async fn test_create_augments_tags_and_lineage() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));

    h.run().await;

    let sent = h.destination.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].tags.contains(REPLICATED_TAG));
    assert_eq!(sent[0].lineage, vec!["source-node".to_string()]);
}

// ============================================================================
// Update decisions
// ============================================================================

#[tokio::test]
async fn test_unchanged_record_is_skipped_without_ledger_entry() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Create, Status::Success, 100, None).await;
    h.seed_watermark(100).await;
    h.destination.hold("r1");
    h.source.yield_record(record("r1", 100));

    let report = h.run().await;

    assert_eq!(h.source.last_query().unwrap().modified_after, Some(ts(100)));
    assert_eq!(h.destination.calls(), vec!["exists:r1"]);
    assert_eq!(h.entry_count().await, 1);
    assert_eq!(h.watermark().await, Some(ts(100)));
    assert_eq!(report.skipped, 1);
    assert_eq!(report.saved, 0);
}

#[tokio::test]
async fn test_failed_record_is_requeried_and_retried() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Create, Status::Failure, 100, None).await;
    h.destination.hold("r1");
    h.source.yield_record(record("r1", 100));

    let report = h.run().await;

    // The failure list re-includes the record even though timestamps are
    // unchanged, and the non-success history forces the metadata track.
    assert_eq!(
        h.source.last_query().unwrap().failed_ids,
        vec!["r1".to_string()]
    );
    assert!(h.destination.calls().contains(&"update:r1".to_string()));
    let item = h.latest("r1").await;
    assert_eq!(item.action, Action::Update);
    assert_eq!(item.status, Status::Success);
    assert_eq!(h.entry_count().await, 2);
    assert_eq!(report.saved, 1);
}

#[tokio::test]
async fn test_prior_failure_with_resource_retries_resource_track() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Update, Status::ConnectionLost, 100, Some(100)).await;
    h.destination.hold("r1");
    h.source.yield_record(record_with_resource("r1", 100, 100));
    h.source.put_resource("r1", b"payload");

    h.run().await;

    assert!(h
        .destination
        .calls()
        .contains(&"update_resource:r1".to_string()));
    assert_eq!(h.latest("r1").await.status, Status::Success);
}

#[tokio::test]
async fn test_resource_update_supersedes_metadata_update() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Create, Status::Success, 100, Some(100)).await;
    h.destination.hold("r1");
    h.source.yield_record(record_with_resource("r1", 200, 200));
    h.source.put_resource("r1", b"fresh payload");

    h.run().await;

    let calls = h.destination.calls();
    assert_eq!(
        calls
            .iter()
            .filter(|c| *c == "update_resource:r1")
            .count(),
        1
    );
    assert!(!calls.contains(&"update:r1".to_string()));
}

#[tokio::test]
async fn test_newer_metadata_alone_updates_metadata_track() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Create, Status::Success, 100, Some(100)).await;
    h.destination.hold("r1");
    // Resource unchanged, metadata newer.
    h.source.yield_record(record_with_resource("r1", 200, 100));

    h.run().await;

    let calls = h.destination.calls();
    assert!(calls.contains(&"update:r1".to_string()));
    assert!(!calls.contains(&"update_resource:r1".to_string()));
}

#[tokio::test]
async fn test_second_pass_over_unchanged_source_is_idempotent() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.run().await;
    assert_eq!(h.entry_count().await, 1);

    // Same record offered again; the destination now holds it and history
    // says success, so the pass writes nothing new.
    h.source.yield_record(record("r1", 100));
    let second = h.run().await;

    assert_eq!(second.saved, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(h.entry_count().await, 1);
}

// ============================================================================
// Deletes
// ============================================================================

#[tokio::test]
async fn test_delete_with_history_deletes_at_destination() {
    let h = Harness::new();
    h.seed_prior("r3", Action::Create, Status::Success, 100, None).await;
    h.destination.hold("r3");
    let mut gone = record("r3", 300);
    gone.is_deleted = true;
    h.source.yield_record(gone);

    h.run().await;

    assert_eq!(h.destination.calls(), vec!["delete:r3"]);
    let item = h.latest("r3").await;
    assert_eq!(item.action, Action::Delete);
    assert_eq!(item.status, Status::Success);
    assert!(!h.destination.holds("r3"));
}

#[tokio::test]
async fn test_delete_without_history_falls_back_to_create() {
    let h = Harness::new();
    let mut gone = record("r3", 300);
    gone.is_deleted = true;
    h.source.yield_record(gone);

    h.run().await;

    assert!(h.destination.calls().contains(&"create:r3".to_string()));
    assert_eq!(h.latest("r3").await.action, Action::Create);
}

#[tokio::test]
async fn test_refused_delete_records_failure() {
    let h = Harness::new();
    h.seed_prior("r3", Action::Create, Status::Success, 100, None).await;
    h.destination.hold("r3");
    h.destination.refuse_op("delete");
    let mut gone = record("r3", 300);
    gone.is_deleted = true;
    h.source.yield_record(gone);

    let report = h.run().await;

    assert_eq!(h.latest("r3").await.status, Status::Failure);
    assert_eq!(report.failures, 1);
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test]
async fn test_connection_loss_is_recorded_and_watermark_still_advances() {
    let h = Harness::new();
    h.source.yield_record(record("r2", 200));
    h.destination.fail_op("create");
    h.destination.set_available(false);

    let report = h.run().await;

    let item = h.latest("r2").await;
    assert_eq!(item.action, Action::Create);
    assert_eq!(item.status, Status::ConnectionLost);
    assert_eq!(
        h.ledger.failure_list(FILTER_ID).await.unwrap(),
        vec!["r2".to_string()]
    );
    assert_eq!(h.watermark().await, Some(ts(200)));
    assert_eq!(report.connection_lost, 1);
}

#[tokio::test]
async fn test_transfer_error_with_both_nodes_up_is_failure() {
    let h = Harness::new();
    h.source.yield_record(record("r2", 200));
    h.destination.fail_op("create");

    let report = h.run().await;

    assert_eq!(h.latest("r2").await.status, Status::Failure);
    assert_eq!(report.failures, 1);
    assert_eq!(report.connection_lost, 0);
}

#[tokio::test]
async fn test_refused_create_records_failure() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.destination.refuse_op("create");

    h.run().await;

    assert_eq!(h.latest("r1").await.status, Status::Failure);
    assert_eq!(
        h.ledger.failure_list(FILTER_ID).await.unwrap(),
        vec!["r1".to_string()]
    );
}

#[tokio::test]
async fn test_exists_probe_error_is_recorded_under_create() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.destination.fail_op("exists");

    h.run().await;

    let item = h.latest("r1").await;
    assert_eq!(item.action, Action::Create);
    assert_eq!(item.status, Status::Failure);
    assert_eq!(h.watermark().await, Some(ts(100)));
}

// ============================================================================
// Watermark behavior
// ============================================================================

#[tokio::test]
async fn test_watermark_takes_maximum_over_out_of_order_stream() {
    let h = Harness::new();
    h.source.yield_record(record("r2", 200));
    h.source.yield_record(record("r1", 100));

    h.run().await;

    assert_eq!(h.watermark().await, Some(ts(200)));
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let h = Harness::new();
    h.seed_watermark(500).await;
    h.source.yield_record(record("r1", 100));

    h.run().await;

    assert_eq!(h.watermark().await, Some(ts(500)));
}

// ============================================================================
// Observers
// ============================================================================

#[tokio::test]
async fn test_observers_receive_items_in_save_order() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.source.yield_record(record("r2", 200));
    h.source.yield_record(record("r3", 300));

    let first = Arc::new(RecordingObserver::new());
    let second = Arc::new(RecordingObserver::new());
    let mut observers = ObserverSet::new();
    observers.insert(first.clone());
    observers.insert(second.clone());

    h.run_with_observers(observers).await;

    let ids: Vec<String> = first.items().iter().map(|i| i.metadata_id.clone()).collect();
    assert_eq!(ids, vec!["r1", "r2", "r3"]);
    assert_eq!(second.items().len(), 3);
}

#[tokio::test]
async fn test_duplicate_observer_handle_is_delivered_once() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));

    let observer = Arc::new(RecordingObserver::new());
    let mut observers = ObserverSet::new();
    observers.insert(observer.clone());
    observers.insert(observer.clone());

    h.run_with_observers(observers).await;

    assert_eq!(observer.items().len(), 1);
}

#[tokio::test]
async fn test_skipped_record_triggers_no_observer_call() {
    let h = Harness::new();
    h.seed_prior("r1", Action::Create, Status::Success, 100, None).await;
    h.destination.hold("r1");
    h.source.yield_record(record("r1", 100));

    let observer = Arc::new(RecordingObserver::new());
    let mut observers = ObserverSet::new();
    observers.insert(observer.clone());

    h.run_with_observers(observers).await;

    assert!(observer.items().is_empty());
}

#[tokio::test]
async fn test_failing_observer_does_not_abort_the_pass() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.source.yield_record(record("r2", 200));

    let recording = Arc::new(RecordingObserver::new());
    let mut observers = ObserverSet::new();
    observers.insert(Arc::new(FailingObserver));
    observers.insert(recording.clone());

    let report = h.run_with_observers(observers).await;

    assert_eq!(report.saved, 2);
    assert_eq!(recording.items().len(), 2);
}

// ============================================================================
// Cancellation and stream failures
// ============================================================================

#[tokio::test]
async fn test_cancelled_job_returns_cleanly_before_processing() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));

    let job = h
        .syncer
        .create_job(
            Box::new(h.source.clone()),
            Box::new(h.destination.clone()),
            Harness::filter(),
            ObserverSet::new(),
        )
        .await
        .unwrap();
    job.cancellation_token().cancel();

    let report = job.sync().await.unwrap();

    assert_eq!(report.observed, 0);
    assert!(h.destination.calls().is_empty());
    assert!(h.watermark().await.is_none());
}

#[tokio::test]
async fn test_stream_error_aborts_but_keeps_progress() {
    let h = Harness::new();
    h.source.yield_record(record("r1", 100));
    h.source.yield_error("stream broke");
    h.source.yield_record(record("r2", 200));

    let job = h
        .syncer
        .create_job(
            Box::new(h.source.clone()),
            Box::new(h.destination.clone()),
            Harness::filter(),
            ObserverSet::new(),
        )
        .await
        .unwrap();

    let result = job.sync().await;

    assert!(result.is_err());
    // The record before the break was fully processed and the watermark
    // stands, so the next pass resumes after it.
    assert_eq!(h.latest("r1").await.status, Status::Success);
    assert_eq!(h.watermark().await, Some(ts(100)));
    assert!(h.ledger.get_latest(FILTER_ID, "r2").await.is_none());
}

#[tokio::test]
async fn test_query_failure_aborts_the_pass() {
    let h = Harness::new();
    h.source.fail_op("query");

    let job = h
        .syncer
        .create_job(
            Box::new(h.source.clone()),
            Box::new(h.destination.clone()),
            Harness::filter(),
            ObserverSet::new(),
        )
        .await
        .unwrap();

    assert!(job.sync().await.is_err());
}
