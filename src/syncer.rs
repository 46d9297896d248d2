//! The per-filter synchronization engine.
//!
//! A [`Syncer`] creates [`Job`]s; one job performs one replication pass for
//! one filter between one source and one destination. The pass is
//! incremental: it resumes from the filter's persisted watermark, forcibly
//! re-includes records whose last attempt did not succeed, and advances the
//! watermark as records are observed.
//!
//! Parallelism across filters belongs to the outer scheduler; a job runs to
//! completion when awaited and assumes it is the only writer for its
//! filter. The ledger and index store are process-wide services shared by
//! all jobs.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use ledger::{Action, FilterIndex, FilterIndexStore, ItemLedger, ReplicationItem, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::adapter::{
    AdapterError, CreateRequest, CreateStorageRequest, DeleteRequest, NodeAdapter, QueryRequest,
    ResourceRequest, UpdateRequest, UpdateStorageRequest,
};
use crate::filter::Filter;
use crate::metadata::{Metadata, REPLICATED_TAG};
use crate::observer::ObserverSet;

/// Creates replication jobs bound to the shared bookkeeping stores.
pub struct Syncer<L, S> {
    ledger: Arc<L>,
    indexes: Arc<S>,
}

impl<L, S> Syncer<L, S>
where
    L: ItemLedger,
    S: FilterIndexStore,
{
    pub fn new(ledger: Arc<L>, indexes: Arc<S>) -> Self {
        Self { ledger, indexes }
    }

    /// Build a job for one pass of `filter` from `source` to `destination`.
    ///
    /// Resolves the filter's watermark index up front; [`Job::sync`] must be
    /// awaited to run the pass.
    pub async fn create_job(
        &self,
        source: Box<dyn NodeAdapter>,
        destination: Box<dyn NodeAdapter>,
        filter: Filter,
        observers: ObserverSet,
    ) -> anyhow::Result<Job<L, S>> {
        let filter_index = self
            .indexes
            .get_or_create(&filter.id)
            .await
            .with_context(|| format!("resolving index for filter {}", filter.id))?;

        let source_name = source.system_name().to_string();
        let destination_name = destination.system_name().to_string();

        Ok(Job {
            ledger: self.ledger.clone(),
            indexes: self.indexes.clone(),
            source,
            destination,
            source_name,
            destination_name,
            filter,
            filter_index,
            observers,
            cancel: CancellationToken::new(),
        })
    }
}

/// Counts from one completed pass, returned to the outer scheduler.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Records pulled from the change stream.
    pub observed: u64,
    /// Ledger entries written (any status).
    pub saved: u64,
    /// Updates with nothing to do; no entry written.
    pub skipped: u64,
    pub failures: u64,
    pub connection_lost: u64,
    /// Ledger or index writes that failed; the pass continued past them.
    pub persistence_errors: u64,
}

/// One replication pass for one filter between a source and a destination.
pub struct Job<L, S> {
    ledger: Arc<L>,
    indexes: Arc<S>,
    source: Box<dyn NodeAdapter>,
    destination: Box<dyn NodeAdapter>,
    source_name: String,
    destination_name: String,
    filter: Filter,
    filter_index: FilterIndex,
    observers: ObserverSet,
    cancel: CancellationToken,
}

impl<L, S> Job<L, S>
where
    L: ItemLedger,
    S: FilterIndexStore,
{
    /// Token the outer system can use to stop the pass between records. A
    /// record mid-transfer completes or fails naturally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pass to completion.
    ///
    /// Transfer failures are recorded in the ledger and do not abort the
    /// pass; only an unusable change stream or a failure-list read error
    /// does. The watermark persisted so far always stands, so an aborted
    /// pass resumes incrementally on the next run.
    pub async fn sync(mut self) -> anyhow::Result<SyncReport> {
        let modified_after = self.modified_after();
        let failed_ids = self
            .ledger
            .failure_list(&self.filter.id)
            .await
            .with_context(|| format!("reading failure list for filter {}", self.filter.id))?;

        let request = QueryRequest::new(
            self.filter.query.clone(),
            vec![self.destination_name.clone()],
            failed_ids,
            modified_after,
        );
        let mut changes = self
            .source
            .query(request)
            .await
            .with_context(|| format!("querying {} for filter {}", self.source_name, self.filter.name))?;

        let mut report = SyncReport::default();
        loop {
            if self.cancel.is_cancelled() {
                info!(
                    "sync of filter {} cancelled after {} records",
                    self.filter.name, report.observed
                );
                break;
            }

            let metadata = match changes.next().await {
                Some(Ok(metadata)) => metadata,
                Some(Err(e)) => {
                    return Err(e).with_context(|| {
                        format!("change stream from {} failed", self.source_name)
                    })
                }
                None => break,
            };

            report.observed += 1;
            self.replicate(metadata, &mut report).await;
        }

        info!(
            "sync of filter {} from {} to {} done: {} observed, {} saved, {} skipped, {} failed, {} connection-lost",
            self.filter.name,
            self.source_name,
            self.destination_name,
            report.observed,
            report.saved,
            report.skipped,
            report.failures,
            report.connection_lost
        );
        Ok(report)
    }

    /// Run the decision tree and transfer for one record, then record the
    /// outcome and advance the watermark.
    async fn replicate(&mut self, mut metadata: Metadata, report: &mut SyncReport) {
        let existing = self.ledger.get_latest(&self.filter.id, &metadata.id).await;
        let metadata_modified = metadata.metadata_modified;

        let mut builder = ReplicationItem::builder(
            &metadata.id,
            &self.filter.id,
            &self.source_name,
            &self.destination_name,
        )
        .metadata_modified(metadata.metadata_modified)
        .resource_modified(metadata.resource_modified)
        .metadata_size(metadata.metadata_size)
        .resource_size(metadata.resource_size);
        builder.mark_start_time();

        // A deletion with no prior history is nothing to delete; an update
        // requires both destination presence and local history, otherwise
        // the record is treated as new. That keeps the engine self-healing
        // when the ledger is lost or the destination diverged. A failed
        // presence probe is classified like any transfer error, recorded
        // under the fallback CREATE.
        let (action, outcome) = if metadata.is_deleted && existing.is_some() {
            (Action::Delete, self.do_delete(&metadata).await.map(Some))
        } else {
            match (self.destination.exists(&metadata).await, &existing) {
                (Ok(true), Some(prior)) => {
                    (Action::Update, self.do_update(&mut metadata, prior).await)
                }
                (Ok(_), _) => (Action::Create, self.do_create(&mut metadata).await.map(Some)),
                (Err(e), _) => (Action::Create, Err(e)),
            }
        };

        let status = match outcome {
            Ok(status) => status,
            Err(e) => Some(self.classify_failure(&metadata, e).await),
        };

        builder.mark_done_time();

        if let Some(status) = status {
            match status {
                Status::Success => {}
                Status::Failure => report.failures += 1,
                Status::ConnectionLost => report.connection_lost += 1,
            }
            match builder.action(action).status(status).build() {
                Ok(item) => match self.ledger.save(&item).await {
                    Ok(()) => {
                        report.saved += 1;
                        self.observers.notify(&item);
                    }
                    Err(e) => {
                        warn!(
                            "failed to persist replication item for metadata {} under filter {}: {e}",
                            item.metadata_id, item.filter_id
                        );
                        report.persistence_errors += 1;
                    }
                },
                Err(e) => {
                    warn!(
                        "failed to assemble replication item for metadata {}: {e}",
                        metadata.id
                    );
                    report.persistence_errors += 1;
                }
            }
        } else {
            report.skipped += 1;
        }

        // The watermark tracks observation, not success; failed records are
        // retried through the failure list, so it advances here regardless
        // of status.
        if Some(metadata_modified) > self.filter_index.modified_since {
            self.filter_index.modified_since = Some(metadata_modified);
            if let Err(e) = self.indexes.save(&self.filter_index).await {
                warn!(
                    "failed to persist index for filter {}: {e}",
                    self.filter.id
                );
                report.persistence_errors += 1;
            }
        }
    }

    /// A transport error coincident with an unavailable node is a lost
    /// connection; anything else is a record-level failure. Both land on
    /// the failure list for the next pass.
    async fn classify_failure(&self, metadata: &Metadata, error: AdapterError) -> Status {
        let source_available = self.source.is_available().await;
        let destination_available = self.destination.is_available().await;
        if !source_available || !destination_available {
            debug!(
                "lost connection to either source {} (available={}) or destination {} (available={}): {error}",
                self.source_name, source_available, self.destination_name, destination_available
            );
            Status::ConnectionLost
        } else {
            debug!(
                "transfer of metadata {} from {} to {} failed: {error}",
                metadata.id, self.source_name, self.destination_name
            );
            Status::Failure
        }
    }

    async fn do_create(&self, metadata: &mut Metadata) -> Result<Status, AdapterError> {
        self.add_tags_and_lineage(metadata);

        let created = if metadata.has_resource() {
            let response = self
                .source
                .read_resource(ResourceRequest::new(metadata.clone()))
                .await?;
            trace!(
                "sending create storage from {} to {} for metadata {}",
                self.source_name,
                self.destination_name,
                metadata.id
            );
            self.destination
                .create_resource(CreateStorageRequest::new(response.resource))
                .await?
        } else {
            trace!(
                "sending create from {} to {} for metadata {}",
                self.source_name,
                self.destination_name,
                metadata.id
            );
            self.destination
                .create(CreateRequest::new(metadata.clone()))
                .await?
        };

        Ok(if created { Status::Success } else { Status::Failure })
    }

    /// `None` means nothing to do: both tracks up to date and the last
    /// attempt succeeded. A non-success last attempt retries both tracks
    /// regardless of timestamps.
    async fn do_update(
        &self,
        metadata: &mut Metadata,
        prior: &ReplicationItem,
    ) -> Result<Option<Status>, AdapterError> {
        self.add_tags_and_lineage(metadata);

        let should_update_metadata = metadata.metadata_modified > prior.metadata_modified
            || prior.status != Status::Success;
        let should_update_resource = metadata.has_resource()
            && (metadata.resource_modified > prior.resource_modified
                || prior.status != Status::Success);

        let updated = if should_update_resource {
            // The resource transfer carries the metadata with it.
            let response = self
                .source
                .read_resource(ResourceRequest::new(metadata.clone()))
                .await?;
            trace!(
                "sending update storage from {} to {} for metadata {}",
                self.source_name,
                self.destination_name,
                metadata.id
            );
            self.destination
                .update_resource(UpdateStorageRequest::new(response.resource))
                .await?
        } else if should_update_metadata {
            trace!(
                "sending update from {} to {} for metadata {}",
                self.source_name,
                self.destination_name,
                metadata.id
            );
            self.destination
                .update(UpdateRequest::new(metadata.clone()))
                .await?
        } else {
            debug!(
                "skipping metadata {} update from source {} to destination {}",
                metadata.id, self.source_name, self.destination_name
            );
            return Ok(None);
        };

        Ok(Some(if updated { Status::Success } else { Status::Failure }))
    }

    async fn do_delete(&self, metadata: &Metadata) -> Result<Status, AdapterError> {
        trace!(
            "sending delete from {} to {} for metadata {}",
            self.source_name,
            self.destination_name,
            metadata.id
        );
        let deleted = self
            .destination
            .delete(DeleteRequest::new(metadata.clone()))
            .await?;
        Ok(if deleted { Status::Success } else { Status::Failure })
    }

    fn add_tags_and_lineage(&self, metadata: &mut Metadata) {
        metadata.append_lineage(&self.source_name);
        metadata.add_tag(REPLICATED_TAG);
    }

    fn modified_after(&self) -> Option<DateTime<Utc>> {
        if self.filter_index.modified_since.is_none() {
            trace!(
                "no previous successful run for filter {} found",
                self.filter.name
            );
        }
        self.filter_index.modified_since
    }
}
