//! deposit-services library interface
//!
//! Moves user submissions into downstream repositories. A Submission that
//! becomes ready is accepted by the [`SubmissionProcessor`], which schedules
//! one [`DepositTask`] per target repository on the worker pool. Deposit
//! changes flow back through the [`DepositProcessor`], which refreshes remote
//! statuses and completes the Submission once every Deposit is terminal.
//!
//! Every state change goes through a [`CriticalRepositoryInteraction`].

pub mod builder;
pub mod cri;
pub mod error;
pub mod error_handler;
pub mod listener;
pub mod model;
pub mod packager;
pub mod policy;
pub mod pool;
pub mod processor;
pub mod status;
pub mod task;
pub mod updater;
pub mod utils;

pub use crate::cri::{CriticalRepositoryInteraction, CriticalResult, FailureReason};
pub use crate::error::{DepositResult, DepositServiceError};
pub use crate::processor::{DepositProcessor, SubmissionProcessor};
pub use crate::task::{DepositTask, DepositWorkerContext};

use deposit_common::config::{DepositServicesConfig, TransportBinding};
use deposit_common::events::NotificationBus;
use deposit_common::store::{InMemoryResourceStore, SqliteResourceStore};
use deposit_common::{ResourceStore, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::builder::{StoreSubmissionBuilder, SubmissionBuilder};
use crate::error_handler::{DepositServiceErrorHandler, ErrorHandler};
use crate::listener::NotificationListener;
use crate::packager::{Assembler, FilesystemTransport, JsonAssembler, PackagerRegistry, Transport};
use crate::policy::{AlwaysAcceptPolicy, SubmissionPolicy};
use crate::pool::{DepositWorkerPool, TaskExecutor};
use crate::status::{DepositStatusProcessor, DepositStatusRefresher, DepositStatusResolver};
use crate::updater::DepositUpdater;

/// Assembles a [`DepositServices`] from configuration and plug-ins
///
/// The filesystem transport and JSON assembler are always registered;
/// protocol transports and status resolvers are supplied by the caller.
pub struct DepositServicesBuilder {
    config: DepositServicesConfig,
    store: Option<(Arc<dyn ResourceStore>, NotificationBus)>,
    transports: HashMap<TransportBinding, Arc<dyn Transport>>,
    assemblers: HashMap<String, Arc<dyn Assembler>>,
    resolvers: HashMap<TransportBinding, Arc<dyn DepositStatusResolver>>,
    policy: Arc<dyn SubmissionPolicy>,
    submission_builder: Option<Arc<dyn SubmissionBuilder>>,
}

impl DepositServicesBuilder {
    pub fn new(config: DepositServicesConfig) -> Self {
        let mut transports: HashMap<TransportBinding, Arc<dyn Transport>> = HashMap::new();
        transports.insert(TransportBinding::Filesystem, Arc::new(FilesystemTransport));
        let mut assemblers: HashMap<String, Arc<dyn Assembler>> = HashMap::new();
        assemblers.insert(JsonAssembler::SPEC.to_string(), Arc::new(JsonAssembler));

        Self {
            config,
            store: None,
            transports,
            assemblers,
            resolvers: HashMap::new(),
            policy: Arc::new(AlwaysAcceptPolicy),
            submission_builder: None,
        }
    }

    /// Use an existing store; `bus` must be the bus the store publishes to
    pub fn store(mut self, store: Arc<dyn ResourceStore>, bus: NotificationBus) -> Self {
        self.store = Some((store, bus));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.binding(), transport);
        self
    }

    pub fn assembler(mut self, assembler: Arc<dyn Assembler>) -> Self {
        self.assemblers.insert(assembler.spec().to_string(), assembler);
        self
    }

    pub fn status_resolver(
        mut self,
        binding: TransportBinding,
        resolver: Arc<dyn DepositStatusResolver>,
    ) -> Self {
        self.resolvers.insert(binding, resolver);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn SubmissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn submission_builder(mut self, builder: Arc<dyn SubmissionBuilder>) -> Self {
        self.submission_builder = Some(builder);
        self
    }

    pub async fn build(self) -> Result<DepositServices> {
        self.config.validate()?;

        let (store, bus) = match self.store {
            Some(existing) => existing,
            None => open_store(&self.config).await?,
        };

        let registry = Arc::new(PackagerRegistry::from_config(
            &self.config,
            &self.transports,
            &self.assemblers,
        )?);

        let cri = CriticalRepositoryInteraction::new(Arc::clone(&store));
        let error_handler: Arc<dyn ErrorHandler> =
            Arc::new(DepositServiceErrorHandler::new(cri.clone()));
        let pool = Arc::new(DepositWorkerPool::new(
            self.config.workers.clone(),
            Arc::clone(&error_handler),
        ));

        let status_processor = Arc::new(
            self.resolvers
                .into_iter()
                .fold(DepositStatusProcessor::new(), |processor, (binding, resolver)| {
                    processor.with_resolver(binding, resolver)
                }),
        );
        let refresher = Arc::new(DepositStatusRefresher::new(
            cri.clone(),
            Arc::clone(&registry),
            status_processor,
        ));

        let submission_builder = self
            .submission_builder
            .unwrap_or_else(|| Arc::new(StoreSubmissionBuilder::new(Arc::clone(&store))));
        let submissions = Arc::new(SubmissionProcessor::new(
            cri.clone(),
            submission_builder,
            self.policy,
            Arc::clone(&registry),
            Arc::clone(&pool) as Arc<dyn TaskExecutor>,
            self.config.status_ref.clone(),
        ));
        let deposits = Arc::new(DepositProcessor::new(cri.clone(), Arc::clone(&refresher)));
        let listener = Arc::new(NotificationListener::new(
            cri.clone(),
            Arc::clone(&submissions),
            Arc::clone(&deposits),
            Arc::clone(&error_handler),
        ));

        Ok(DepositServices {
            config: self.config,
            store,
            bus,
            cri,
            registry,
            pool,
            submissions,
            deposits,
            refresher,
            listener,
            cancel: CancellationToken::new(),
            listener_task: Mutex::new(None),
        })
    }
}

async fn open_store(config: &DepositServicesConfig) -> Result<(Arc<dyn ResourceStore>, NotificationBus)> {
    let bus = NotificationBus::new(config.notifications.capacity);
    let store: Arc<dyn ResourceStore> = match &config.store.database_path {
        Some(path) => {
            info!("Opening resource store at {}", path.display());
            Arc::new(
                SqliteResourceStore::open(path, config.store.base_uri.clone())
                    .await?
                    .with_max_lock_wait_ms(config.store.max_lock_wait_ms)
                    .with_notifications(bus.clone()),
            )
        }
        None => {
            info!("No database configured, using in-memory resource store");
            Arc::new(
                InMemoryResourceStore::with_base_uri(config.store.base_uri.clone())
                    .with_notifications(bus.clone()),
            )
        }
    };
    Ok((store, bus))
}

/// The running deposit services
pub struct DepositServices {
    config: DepositServicesConfig,
    store: Arc<dyn ResourceStore>,
    bus: NotificationBus,
    cri: CriticalRepositoryInteraction,
    registry: Arc<PackagerRegistry>,
    pool: Arc<DepositWorkerPool>,
    submissions: Arc<SubmissionProcessor>,
    deposits: Arc<DepositProcessor>,
    refresher: Arc<DepositStatusRefresher>,
    listener: Arc<NotificationListener>,
    cancel: CancellationToken,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl DepositServices {
    pub fn builder(config: DepositServicesConfig) -> DepositServicesBuilder {
        DepositServicesBuilder::new(config)
    }

    /// Start the worker pool and the notification listener
    ///
    /// The listener subscribes before this returns, so changes made after
    /// `start` are never missed.
    pub fn start(&self) {
        let mut listener_task = self
            .listener_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if listener_task.is_some() {
            return;
        }
        self.pool.start();
        let rx = self.bus.subscribe();
        *listener_task = Some(tokio::spawn(
            Arc::clone(&self.listener).run(rx, self.cancel.child_token()),
        ));
        info!(
            repositories = self.registry.len(),
            workers = self.config.workers.concurrency,
            "Deposit services started"
        );
    }

    /// Stop listening, then drain and stop the worker pool
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let listener_task = self
            .listener_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = listener_task {
            if let Err(e) = task.await {
                error!("Notification listener ended abnormally: {}", e);
            }
        }
        self.pool.shutdown().await;
        info!("Deposit services stopped");
    }

    pub fn config(&self) -> &DepositServicesConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn notification_bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn cri(&self) -> &CriticalRepositoryInteraction {
        &self.cri
    }

    pub fn registry(&self) -> &Arc<PackagerRegistry> {
        &self.registry
    }

    pub fn submission_processor(&self) -> &Arc<SubmissionProcessor> {
        &self.submissions
    }

    pub fn deposit_processor(&self) -> &Arc<DepositProcessor> {
        &self.deposits
    }

    pub fn updater(&self) -> DepositUpdater {
        DepositUpdater::new(Arc::clone(&self.refresher))
    }
}
