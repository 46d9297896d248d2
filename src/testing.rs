//! Test doubles for exercising the engine without a network.
//!
//! [`TestNode`] is a scripted in-memory [`NodeAdapter`]: tests enqueue the
//! records its change stream yields, mark which ids it already holds, and
//! flip individual operations to refuse (`Ok(false)`) or fail (transport
//! error). Every operation is logged so tests can assert exactly what the
//! engine sent where.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ledger::ReplicationItem;

use crate::adapter::{
    AdapterError, CreateRequest, CreateStorageRequest, DeleteRequest, MetadataStream, NodeAdapter,
    QueryRequest, Resource, ResourceRequest, ResourceResponse, UpdateRequest, UpdateStorageRequest,
};
use crate::metadata::Metadata;
use crate::observer::ItemObserver;

/// Millisecond-epoch timestamp shorthand for tests.
pub fn ts(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .expect("valid test timestamp")
}

enum Yield {
    Record(Metadata),
    Error(String),
}

#[derive(Default)]
struct Inner {
    yields: Mutex<Vec<Yield>>,
    holdings: Mutex<HashSet<String>>,
    resources: Mutex<HashMap<String, Vec<u8>>>,
    refuse: Mutex<HashSet<String>>,
    fail: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<Metadata>>,
    last_query: Mutex<Option<QueryRequest>>,
}

/// Scripted in-memory catalog node.
///
/// Cheaply cloneable; clones share state, so a test can hand one clone to a
/// job and keep another for assertions. Operation names accepted by
/// [`refuse_op`](Self::refuse_op) and [`fail_op`](Self::fail_op): `query`,
/// `exists`, `read_resource`, `create`, `update`, `delete`,
/// `create_resource`, `update_resource`.
#[derive(Clone)]
pub struct TestNode {
    name: String,
    available: Arc<AtomicBool>,
    inner: Arc<Inner>,
}

impl TestNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available: Arc::new(AtomicBool::new(true)),
            inner: Arc::new(Inner::default()),
        }
    }

    /// Enqueue a record for the next change stream.
    pub fn yield_record(&self, metadata: Metadata) {
        self.inner.yields.lock().unwrap().push(Yield::Record(metadata));
    }

    /// Enqueue a mid-stream transport error.
    pub fn yield_error(&self, message: impl Into<String>) {
        self.inner.yields.lock().unwrap().push(Yield::Error(message.into()));
    }

    /// Mark an id as already held by this node.
    pub fn hold(&self, id: impl Into<String>) {
        self.inner.holdings.lock().unwrap().insert(id.into());
    }

    pub fn holds(&self, id: &str) -> bool {
        self.inner.holdings.lock().unwrap().contains(id)
    }

    /// Stock the binary payload served for a record id.
    pub fn put_resource(&self, id: impl Into<String>, content: &[u8]) {
        self.inner
            .resources
            .lock()
            .unwrap()
            .insert(id.into(), content.to_vec());
    }

    /// Make an operation return `Ok(false)`.
    pub fn refuse_op(&self, op: &str) {
        self.inner.refuse.lock().unwrap().insert(op.to_string());
    }

    /// Make an operation return a transport error.
    pub fn fail_op(&self, op: &str) {
        self.inner.fail.lock().unwrap().insert(op.to_string());
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Operations performed so far, as `"op:id"` entries in call order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Metadata payloads delivered through create/update operations.
    pub fn sent(&self) -> Vec<Metadata> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<QueryRequest> {
        self.inner.last_query.lock().unwrap().clone()
    }

    fn record_call(&self, op: &str, id: &str) {
        self.inner.calls.lock().unwrap().push(format!("{op}:{id}"));
    }

    fn scripted_failure(&self, op: &str) -> Result<(), AdapterError> {
        if self.inner.fail.lock().unwrap().contains(op) {
            return Err(AdapterError::Transport(format!("scripted {op} failure")));
        }
        Ok(())
    }

    fn refused(&self, op: &str) -> bool {
        self.inner.refuse.lock().unwrap().contains(op)
    }

    fn accept(&self, op: &str, metadata: &Metadata) -> Result<bool, AdapterError> {
        self.record_call(op, &metadata.id);
        self.scripted_failure(op)?;
        self.inner.sent.lock().unwrap().push(metadata.clone());
        if self.refused(op) {
            return Ok(false);
        }
        self.inner
            .holdings
            .lock()
            .unwrap()
            .insert(metadata.id.clone());
        Ok(true)
    }
}

struct ScriptedStream {
    yields: VecDeque<Yield>,
}

#[async_trait]
impl MetadataStream for ScriptedStream {
    async fn next(&mut self) -> Option<Result<Metadata, AdapterError>> {
        match self.yields.pop_front() {
            Some(Yield::Record(metadata)) => Some(Ok(metadata)),
            Some(Yield::Error(message)) => Some(Err(AdapterError::Transport(message))),
            None => None,
        }
    }
}

#[async_trait]
impl NodeAdapter for TestNode {
    fn system_name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn query(
        &self,
        request: QueryRequest,
    ) -> Result<Box<dyn MetadataStream>, AdapterError> {
        self.record_call("query", &request.query);
        *self.inner.last_query.lock().unwrap() = Some(request);
        self.scripted_failure("query")?;
        let yields = std::mem::take(&mut *self.inner.yields.lock().unwrap());
        Ok(Box::new(ScriptedStream {
            yields: yields.into(),
        }))
    }

    async fn exists(&self, metadata: &Metadata) -> Result<bool, AdapterError> {
        self.record_call("exists", &metadata.id);
        self.scripted_failure("exists")?;
        Ok(self.holds(&metadata.id))
    }

    async fn read_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<ResourceResponse, AdapterError> {
        self.record_call("read_resource", &request.metadata.id);
        self.scripted_failure("read_resource")?;
        let content = self
            .inner
            .resources
            .lock()
            .unwrap()
            .get(&request.metadata.id)
            .cloned()
            .unwrap_or_default();
        Ok(ResourceResponse {
            resource: Resource {
                metadata: request.metadata,
                content,
            },
        })
    }

    async fn create(&self, request: CreateRequest) -> Result<bool, AdapterError> {
        let metadata = request
            .metadata
            .first()
            .cloned()
            .ok_or_else(|| AdapterError::Malformed("create request without metadata".into()))?;
        self.accept("create", &metadata)
    }

    async fn update(&self, request: UpdateRequest) -> Result<bool, AdapterError> {
        let metadata = request
            .metadata
            .first()
            .cloned()
            .ok_or_else(|| AdapterError::Malformed("update request without metadata".into()))?;
        self.accept("update", &metadata)
    }

    async fn delete(&self, request: DeleteRequest) -> Result<bool, AdapterError> {
        let metadata = request
            .metadata
            .first()
            .cloned()
            .ok_or_else(|| AdapterError::Malformed("delete request without metadata".into()))?;
        self.record_call("delete", &metadata.id);
        self.scripted_failure("delete")?;
        if self.refused("delete") {
            return Ok(false);
        }
        self.inner.holdings.lock().unwrap().remove(&metadata.id);
        Ok(true)
    }

    async fn create_resource(
        &self,
        request: CreateStorageRequest,
    ) -> Result<bool, AdapterError> {
        let resource = request.resources.first().cloned().ok_or_else(|| {
            AdapterError::Malformed("create storage request without resource".into())
        })?;
        self.accept("create_resource", &resource.metadata)
    }

    async fn update_resource(
        &self,
        request: UpdateStorageRequest,
    ) -> Result<bool, AdapterError> {
        let resource = request.resources.first().cloned().ok_or_else(|| {
            AdapterError::Malformed("update storage request without resource".into())
        })?;
        self.accept("update_resource", &resource.metadata)
    }
}

/// Observer that captures every delivered item.
#[derive(Default)]
pub struct RecordingObserver {
    items: Mutex<Vec<ReplicationItem>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ReplicationItem> {
        self.items.lock().unwrap().clone()
    }
}

impl ItemObserver for RecordingObserver {
    fn on_item(&self, item: &ReplicationItem) -> anyhow::Result<()> {
        self.items.lock().unwrap().push(item.clone());
        Ok(())
    }
}

/// Observer that always errors, for fan-out policy tests.
pub struct FailingObserver;

impl ItemObserver for FailingObserver {
    fn on_item(&self, _item: &ReplicationItem) -> anyhow::Result<()> {
        anyhow::bail!("scripted observer failure")
    }
}
