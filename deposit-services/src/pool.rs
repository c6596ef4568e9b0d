//! Bounded worker pool executing deposit tasks
//!
//! `execute` never waits: a full queue rejects the task immediately, and the
//! caller decides what a rejection means. Tasks that fail are handed to the
//! configured error handler; nothing is retried here.

use deposit_common::config::WorkerConfig;
use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error_handler::ErrorHandler;
use crate::task::DepositTask;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("Deposit worker pool is saturated ({capacity} tasks queued)")]
    Rejected { capacity: usize },

    #[error("Deposit worker pool is shut down")]
    ShutDown,
}

/// Something that runs deposit tasks
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: DepositTask) -> Result<(), ExecuteError>;
}

type TaskQueue = Arc<AsyncMutex<mpsc::Receiver<DepositTask>>>;

pub struct DepositWorkerPool {
    config: WorkerConfig,
    sender: mpsc::Sender<DepositTask>,
    queue: TaskQueue,
    error_handler: Arc<dyn ErrorHandler>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DepositWorkerPool {
    pub fn new(config: WorkerConfig, error_handler: Arc<dyn ErrorHandler>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            sender,
            queue: Arc::new(AsyncMutex::new(receiver)),
            error_handler,
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker tasks; calling it again has no effect
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            return;
        }
        for worker_id in 0..self.config.concurrency.max(1) {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.queue),
                Arc::clone(&self.error_handler),
                self.cancel.clone(),
            )));
        }
        info!(
            workers = self.config.concurrency,
            queue_capacity = self.config.queue_capacity,
            "Deposit worker pool started"
        );
    }

    /// Stop accepting tasks, let workers drain the queue, and wait for them
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                error!("Deposit worker ended abnormally: {}", e);
            }
        }
        info!("Deposit worker pool stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl TaskExecutor for DepositWorkerPool {
    fn execute(&self, task: DepositTask) -> Result<(), ExecuteError> {
        if self.cancel.is_cancelled() {
            return Err(ExecuteError::ShutDown);
        }
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ExecuteError::Rejected {
                capacity: self.config.queue_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => ExecuteError::ShutDown,
        })
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: TaskQueue,
    error_handler: Arc<dyn ErrorHandler>,
    cancel: CancellationToken,
) {
    debug!(worker = worker_id, "Deposit worker started");
    loop {
        let task = {
            let mut queue = queue.lock().await;
            tokio::select! {
                task = queue.recv() => task,
                // Drain whatever was queued before shutdown
                _ = cancel.cancelled() => queue.try_recv().ok(),
            }
        };
        let Some(task) = task else {
            break;
        };

        let deposit = task.deposit_id().cloned();
        // Isolated so a panic only loses this task
        match tokio::spawn(task.run()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error_handler.handle(e).await,
            Err(e) => error!(worker = worker_id, deposit = ?deposit, "Deposit task panicked: {}", e),
        }
    }
    debug!(worker = worker_id, "Deposit worker stopped");
}
