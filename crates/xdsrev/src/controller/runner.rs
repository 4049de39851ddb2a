//! Event loop and worker pool driving both reconcile loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::{Instant, Interval};

use crate::api::ObjectKey;
use crate::config::{ControllerSpec, RequeueSettings};
use crate::store::StoreEvent;

use super::context::Context;
use super::desired_config::reconcile_config;
use super::error::ReconcileError;
use super::feedback;
use super::predicates::{config_changed, owner_to_requeue, revision_changed};
use super::queue::WorkQueue;
use super::revision::reconcile_revision;
use super::secrets::{flag_all_secret_consumers, on_secret_changed};

/// A unit of work: one record to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkItem {
    Config(ObjectKey),
    Revision(ObjectKey),
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkItem::Config(key) => write!(f, "DesiredConfig {}", key),
            WorkItem::Revision(key) => write!(f, "Revision {}", key),
        }
    }
}

#[derive(Clone)]
pub struct Controller {
    ctx: Arc<Context>,
    queue: WorkQueue<WorkItem>,
    requeue: RequeueSettings,
    worker_count: usize,
    resync_interval: Option<Duration>,
}

impl Controller {
    pub fn new(ctx: Arc<Context>, spec: &ControllerSpec) -> Self {
        Self {
            ctx,
            queue: WorkQueue::new(),
            requeue: spec.requeue.clone(),
            worker_count: spec.worker_count.max(1),
            resync_interval: spec.resync_interval(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn queue(&self) -> &WorkQueue<WorkItem> {
        &self.queue
    }

    pub fn enqueue(&self, item: WorkItem) {
        self.queue.add(item);
    }

    /// Runs one reconcile of `item`.
    pub async fn reconcile(&self, item: &WorkItem) -> Result<(), ReconcileError> {
        match item {
            WorkItem::Config(key) => {
                let outcome = reconcile_config(&self.ctx, key).await?;
                log::debug!("Reconciled DesiredConfig {}: {:?}", key, outcome);
            }
            WorkItem::Revision(key) => {
                let outcome = reconcile_revision(&self.ctx, key).await?;
                log::debug!("Reconciled Revision {}: {:?}", key, outcome);
            }
        }
        Ok(())
    }

    /// Enqueues the work a store change calls for.
    pub fn handle_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::DesiredConfig(change) => {
                if config_changed(change) {
                    if let Some(key) = change.key() {
                        self.queue.add(WorkItem::Config(key));
                    }
                }
            }
            StoreEvent::Revision(change) => {
                if revision_changed(change) {
                    if let Some(key) = change.key() {
                        self.queue.add(WorkItem::Revision(key));
                    }
                }
                if let Some(owner) = owner_to_requeue(change) {
                    self.queue.add(WorkItem::Config(owner));
                }
            }
        }
    }

    /// Enqueues every stored record. Returns the number of items added.
    pub async fn resync_all(&self) -> Result<usize, ReconcileError> {
        let configs = self.ctx.store.list_configs().await?;
        let revisions = self.ctx.store.list_revisions().await?;
        let count = configs.len() + revisions.len();
        for config in configs {
            self.queue.add(WorkItem::Config(config.key()));
        }
        for revision in revisions {
            self.queue.add(WorkItem::Revision(revision.key()));
        }
        log::debug!("Resync enqueued {} records", count);
        Ok(count)
    }

    /// Failure feedback from the protocol server.
    pub async fn on_node_rejected(&self, node_id: &str) -> Result<(), ReconcileError> {
        feedback::on_node_rejected(&self.ctx, node_id).await
    }

    pub async fn on_secret_changed(&self, key: &ObjectKey) -> Result<usize, ReconcileError> {
        on_secret_changed(&self.ctx, key).await
    }

    /// Processes one item and schedules a retry if it failed transiently.
    pub async fn process(&self, item: WorkItem) {
        let result = self.reconcile(&item).await;
        self.queue.done(&item);

        match result {
            Ok(()) => self.queue.forget(&item),
            Err(e) if e.is_retryable() => {
                let attempt = self.queue.record_failure(&item);
                let delay = self.requeue.delay_for(attempt);
                log::warn!(
                    "Reconcile of {} failed (attempt {}), retrying in {:?}: {}",
                    item,
                    attempt,
                    delay,
                    e
                );
                self.queue.add_after(item, delay);
            }
            Err(e) => {
                log::error!("Reconcile of {} failed: {}", item, e);
                self.queue.forget(&item);
            }
        }
    }

    async fn worker(self, worker_id: usize) {
        log::debug!("Worker {} started", worker_id);
        while let Some(item) = self.queue.next().await {
            self.process(item).await;
        }
        log::debug!("Worker {} stopped", worker_id);
    }

    /// Runs until `shutdown` turns true or the store's event stream closes.
    ///
    /// Store events are filtered and enqueued, secret changes flag their
    /// consumers, and everything is resynced at start, on lag and every
    /// resync interval. In-flight reconciles finish before this returns.
    pub async fn run(
        &self,
        secret_events: Option<broadcast::Receiver<ObjectKey>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        let mut events = self.ctx.store.subscribe();
        let mut secret_events = secret_events;
        let mut resync = self
            .resync_interval
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        self.resync_all().await?;

        let workers: Vec<_> = (0..self.worker_count)
            .map(|id| tokio::spawn(self.clone().worker(id)))
            .collect();
        log::info!("Controller started with {} workers", self.worker_count);

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Missed {} store events, resyncing", missed);
                        if let Err(e) = self.resync_all().await {
                            log::error!("Resync failed: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => {
                        log::warn!("Store event stream closed");
                        break;
                    }
                },
                secret = recv_optional(&mut secret_events) => match secret {
                    Ok(key) => {
                        if let Err(e) = self.on_secret_changed(&key).await {
                            log::error!("Failed to flag consumers of secret {}: {}", key, e);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Missed {} secret events, flagging all secret consumers", missed);
                        if let Err(e) = flag_all_secret_consumers(&self.ctx).await {
                            log::error!("Failed to flag secret consumers: {}", e);
                        }
                    }
                    Err(RecvError::Closed) => {
                        log::debug!("Secret event stream closed");
                        secret_events = None;
                    }
                },
                _ = tick_optional(&mut resync) => {
                    if let Err(e) = self.resync_all().await {
                        log::error!("Resync failed: {}", e);
                    }
                }
            }
        }

        log::info!("Controller shutting down");
        self.queue.shutdown();
        for worker in workers {
            if let Err(e) = worker.await {
                log::error!("Worker task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn recv_optional<T: Clone>(rx: &mut Option<broadcast::Receiver<T>>) -> Result<T, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
