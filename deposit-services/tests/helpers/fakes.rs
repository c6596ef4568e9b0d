//! Collaborator fakes

use async_trait::async_trait;
use deposit_common::config::{RepositoryConfig, TransportBinding};
use deposit_common::store::{IncomingLinks, InMemoryResourceStore};
use deposit_common::{Resource, ResourceId, ResourceKind, ResourceStore, StoreResult};
use deposit_services::error_handler::ErrorHandler;
use deposit_services::packager::{
    BasicTransportResponse, DepositReceipt, PackageStream, SwordDepositResponse, Transport,
    TransportError, TransportResponse, TransportSession,
};
use deposit_services::pool::{ExecuteError, TaskExecutor};
use deposit_services::status::DepositStatusResolver;
use deposit_services::{DepositServiceError, DepositTask, DepositWorkerContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// What a `FakeTransport` session does with a package
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Success,
    Failure(String),
    Receipt(DepositReceipt),
    OpenError(String),
}

/// Transport that drains packages and answers with a scripted outcome
pub struct FakeTransport {
    binding: TransportBinding,
    outcome: Mutex<FakeOutcome>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    packages: Arc<Mutex<Vec<(String, usize)>>>,
}

impl FakeTransport {
    pub fn new(binding: TransportBinding, outcome: FakeOutcome) -> Self {
        Self {
            binding,
            outcome: Mutex::new(outcome),
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            packages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(TransportBinding::SwordV2, FakeOutcome::Success)
    }

    pub fn set_outcome(&self, outcome: FakeOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Names and sizes of the packages received
    pub fn packages(&self) -> Vec<(String, usize)> {
        self.packages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn binding(&self) -> TransportBinding {
        self.binding
    }

    async fn open(&self, _properties: &HashMap<String, String>) -> anyhow::Result<Box<dyn TransportSession>> {
        let outcome = self.outcome.lock().unwrap().clone();
        if let FakeOutcome::OpenError(message) = outcome {
            anyhow::bail!(message);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            outcome,
            closed: Arc::clone(&self.closed),
            packages: Arc::clone(&self.packages),
        }))
    }
}

struct FakeSession {
    outcome: FakeOutcome,
    closed: Arc<AtomicUsize>,
    packages: Arc<Mutex<Vec<(String, usize)>>>,
}

#[async_trait]
impl TransportSession for FakeSession {
    async fn send(&mut self, mut package: PackageStream, _properties: &HashMap<String, String>) -> Box<dyn TransportResponse> {
        let name = package.metadata().name.clone();
        let mut sink = Vec::new();
        if let Err(e) = tokio::io::copy(package.reader(), &mut sink).await {
            return Box::new(BasicTransportResponse::failed(TransportError::new(e.to_string())));
        }
        if let Err(e) = package.finish().await {
            return Box::new(BasicTransportResponse::failed(TransportError::from_error(&e)));
        }
        self.packages.lock().unwrap().push((name, sink.len()));

        match &self.outcome {
            FakeOutcome::Success | FakeOutcome::OpenError(_) => Box::new(BasicTransportResponse::ok()),
            FakeOutcome::Failure(message) => {
                Box::new(BasicTransportResponse::failed(TransportError::new(message.clone())))
            }
            FakeOutcome::Receipt(receipt) => Box::new(SwordDepositResponse::accepted(receipt.clone())),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Executor that keeps submitted tasks instead of running them
#[derive(Default)]
pub struct RecordingExecutor {
    tasks: Mutex<Vec<DepositTask>>,
    reject: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every task as if the pool were saturated
    pub fn rejecting() -> Self {
        let executor = Self::default();
        executor.reject.store(true, Ordering::SeqCst);
        executor
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<DepositWorkerContext> {
        self.tasks.lock().unwrap().iter().map(|t| t.context().clone()).collect()
    }

    pub fn take(&self) -> Vec<DepositTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap())
    }
}

impl TaskExecutor for RecordingExecutor {
    fn execute(&self, task: DepositTask) -> Result<(), ExecuteError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ExecuteError::Rejected { capacity: 0 });
        }
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// Error handler that records what it receives
#[derive(Default)]
pub struct RecordingErrorHandler {
    errors: Mutex<Vec<DepositServiceError>>,
    notify: Notify,
}

impl RecordingErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    /// Full cause chain of every recorded error
    pub fn chains(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.chain().join(": "))
            .collect()
    }

    /// Wait until at least `count` errors were recorded
    pub async fn wait_for(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for errors");
    }
}

#[async_trait]
impl ErrorHandler for RecordingErrorHandler {
    async fn handle(&self, error: DepositServiceError) {
        self.errors.lock().unwrap().push(error);
        self.notify.notify_waiters();
    }
}

type ExternalEdit = Box<dyn Fn(&mut Resource) + Send + Sync>;

/// Store whose next updates lose a race against an external writer
///
/// For each injected conflict the wrapped store is first updated behind the
/// caller's back, optionally applying `edit`, so the caller's write carries
/// a stale version tag.
pub struct ConflictingStore {
    inner: Arc<InMemoryResourceStore>,
    pending: AtomicUsize,
    updates: AtomicUsize,
    edit: Mutex<Option<ExternalEdit>>,
    targeted: Mutex<Option<(ResourceKind, usize)>>,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryResourceStore>) -> Self {
        Self {
            inner,
            pending: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            edit: Mutex::new(None),
            targeted: Mutex::new(None),
        }
    }

    pub fn conflict_next(&self, count: usize) {
        self.pending.store(count, Ordering::SeqCst);
    }

    /// Inject one conflict on the update of a `kind` resource that follows
    /// `skip` earlier updates of that kind
    pub fn conflict_on(&self, kind: ResourceKind, skip: usize) {
        *self.targeted.lock().unwrap() = Some((kind, skip));
    }

    pub fn with_external_edit(self, edit: impl Fn(&mut Resource) + Send + Sync + 'static) -> Self {
        *self.edit.lock().unwrap() = Some(Box::new(edit));
        self
    }

    /// Update calls received, including the conflicting ones
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for ConflictingStore {
    async fn read(&self, id: &ResourceId) -> StoreResult<Resource> {
        self.inner.read(id).await
    }

    async fn create(&self, resource: Resource) -> StoreResult<ResourceId> {
        self.inner.create(resource).await
    }

    async fn update(&self, resource: Resource) -> StoreResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let targeted = {
            let mut targeted = self.targeted.lock().unwrap();
            let hit = match targeted.as_mut() {
                Some((kind, skip)) if *kind == resource.kind() => match skip.checked_sub(1) {
                    Some(remaining) => {
                        *skip = remaining;
                        false
                    }
                    None => true,
                },
                _ => false,
            };
            if hit {
                *targeted = None;
            }
            hit
        };
        let inject = targeted
            || self
                .pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

        if inject {
            if let Some(id) = resource.id() {
                let mut current = self.inner.read(id).await?;
                {
                    let edit = self.edit.lock().unwrap();
                    if let Some(edit) = edit.as_ref() {
                        edit(&mut current);
                    }
                }
                self.inner.update(current).await?;
            }
        }
        self.inner.update(resource).await
    }

    async fn delete(&self, id: &ResourceId) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn incoming(&self, id: &ResourceId) -> StoreResult<IncomingLinks> {
        self.inner.incoming(id).await
    }
}

/// Status resolver returning a fixed status URI
pub struct FixedResolver {
    status_uri: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl FixedResolver {
    pub fn new(status_uri: Option<&str>) -> Self {
        Self {
            status_uri: Mutex::new(status_uri.map(str::to_string)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, status_uri: Option<&str>) {
        *self.status_uri.lock().unwrap() = status_uri.map(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DepositStatusResolver for FixedResolver {
    async fn resolve(&self, _status_ref: &str, _repository: &RepositoryConfig) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status_uri.lock().unwrap().clone())
    }
}
