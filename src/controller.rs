//! Reconciliation between pod notifications and running container tailers.
//!
//! The controller keeps one worker per (namespace, pod, container). Workers are created when
//! a pod is added and at least one of its containers passes the owner's filter, and stopped
//! when the pod is deleted. All registry reads and writes go through one lock that is never
//! held across hook calls or worker execution.

use crate::error::TailError;
use crate::selector::matches_selector;
use crate::types::{ContainerKey, ContainerSpec, LogMessage, PodSnapshot, WatchEvent};
use futures::stream::{Stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, trace, warn};

/// A long-running log reader for one container.
pub trait Worker: Send + Sync + 'static {
    /// Runs until the log source ends, `stop` is called, or a fatal error occurs.
    fn run(&self) -> impl Future<Output = Result<(), TailError>> + Send;

    /// Ask `run` to return. Idempotent, and safe to call before, during or after `run`.
    fn stop(&self);
}

pub trait WorkerFactory: Send + Sync + 'static {
    type Worker: Worker;

    fn create(
        &self,
        pod: &PodSnapshot,
        container: &ContainerSpec,
        events: mpsc::Sender<LogMessage>,
    ) -> Self::Worker;
}

/// Owner callbacks. Only `filter` affects control flow.
///
/// `enter` fires every time an added pod's container is observed, even when a worker for
/// it is already running; treat it as "seen", not "started".
pub trait ContainerHooks: Send + Sync + 'static {
    fn filter(&self, _pod: &PodSnapshot, _container: &ContainerSpec) -> bool {
        true
    }

    fn enter(&self, _pod: &PodSnapshot, _container: &ContainerSpec) {}

    fn exit(&self, _pod: &PodSnapshot, _container: &ContainerSpec) {}

    fn error(&self, _pod: &PodSnapshot, _container: &ContainerSpec, _err: &TailError) {}
}

/// Namespace and label selector the controller watches. Fixed for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// `None` watches every namespace.
    pub namespace: Option<String>,
    pub selector: LabelSelector,
}

/// Sent by a worker task when its `run` returns.
#[derive(Debug)]
pub struct WorkerExit {
    pub key: ContainerKey,
    pub pod: Arc<PodSnapshot>,
    pub container: ContainerSpec,
    pub result: Result<(), TailError>,
}

struct Registered<W> {
    worker: Arc<W>,
    pod: Arc<PodSnapshot>,
    container: ContainerSpec,
}

pub struct Controller<F: WorkerFactory, H> {
    scope: Scope,
    factory: F,
    hooks: H,
    events: mpsc::Sender<LogMessage>,
    workers: Mutex<HashMap<ContainerKey, Registered<F::Worker>>>,
    exit_tx: mpsc::UnboundedSender<WorkerExit>,
    exit_rx: Mutex<mpsc::UnboundedReceiver<WorkerExit>>,
}

impl<F, H> Controller<F, H>
where
    F: WorkerFactory,
    H: ContainerHooks,
{
    pub fn new(scope: Scope, factory: F, hooks: H, events: mpsc::Sender<LogMessage>) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            scope,
            factory,
            hooks,
            events,
            workers: Mutex::new(HashMap::new()),
            exit_tx,
            exit_rx: Mutex::new(exit_rx),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Consume notifications until the stream ends.
    ///
    /// Notifications are handled one at a time. Worker exits are drained in between and
    /// reported through the `error` hook. Exits already queued when the stream ends are
    /// still reported; later ones are not.
    pub async fn run<S>(&self, notifications: S)
    where
        S: Stream<Item = WatchEvent>,
    {
        let mut notifications = std::pin::pin!(notifications);
        let mut exits = self.exit_rx.lock().await;

        loop {
            tokio::select! {
                biased;
                event = notifications.next() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(exit) = exits.recv() => self.handle_worker_exit(exit),
            }
        }
        while let Ok(exit) = exits.try_recv() {
            self.handle_worker_exit(exit);
        }

        let remaining = self.tailing_keys().await;
        info!("Pod watch ended, {} container(s) still tailing", remaining.len());
    }

    pub async fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(pod) => self.on_pod_added(pod).await,
            WatchEvent::Updated(pod) => {
                trace!("Ignoring update for pod {}/{}", pod.namespace, pod.name);
            }
            WatchEvent::Deleted(pod) => self.on_pod_deleted(pod).await,
        }
    }

    pub async fn on_pod_added(&self, pod: PodSnapshot) {
        if !matches_selector(&pod.labels, &self.scope.selector) {
            trace!("Pod {}/{} is outside the selector", pod.namespace, pod.name);
            return;
        }

        // The filter decides whether the pod is interesting at all. If any container passes,
        // every container in the pod gets tailed.
        if !pod.containers.iter().any(|c| self.hooks.filter(&pod, c)) {
            debug!("No container of pod {}/{} passed the filter", pod.namespace, pod.name);
            return;
        }

        let pod = Arc::new(pod);
        for container in &pod.containers {
            self.add_container(&pod, container).await;
        }
    }

    pub async fn on_pod_deleted(&self, pod: PodSnapshot) {
        for container in &pod.containers {
            self.delete_container(&pod, container).await;
        }
    }

    async fn add_container(&self, pod: &Arc<PodSnapshot>, container: &ContainerSpec) {
        self.hooks.enter(pod, container);

        let key = pod.key_for(container);
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&key) {
            trace!("Already tailing {}", key);
            return;
        }

        let worker = Arc::new(self.factory.create(pod, container, self.events.clone()));
        let task = {
            let worker = Arc::clone(&worker);
            let exits = self.exit_tx.clone();
            let exit = WorkerExit {
                key: key.clone(),
                pod: Arc::clone(pod),
                container: container.clone(),
                result: Ok(()),
            };
            async move {
                let result = worker.run().await;
                // The receiver only goes away with the controller itself.
                let _ = exits.send(WorkerExit { result, ..exit });
            }
        };
        tokio::spawn(task);

        debug!("Started tailer for {}", key);
        workers.insert(
            key,
            Registered {
                worker,
                pod: Arc::clone(pod),
                container: container.clone(),
            },
        );
    }

    async fn delete_container(&self, pod: &PodSnapshot, container: &ContainerSpec) {
        let key = pod.key_for(container);
        let removed = {
            let mut workers = self.workers.lock().await;
            match workers.remove(&key) {
                Some(entry) => {
                    entry.worker.stop();
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!("Stopped tailer for {}", key);
            self.hooks.exit(pod, container);
        }
    }

    /// Report a finished worker. A failed worker keeps its registry entry until its pod is
    /// deleted, so a re-add of the same pod does not restart it.
    pub fn handle_worker_exit(&self, exit: WorkerExit) {
        match &exit.result {
            Ok(()) => debug!("Tailer for {} finished", exit.key),
            Err(err) => {
                warn!(kind = err.as_label(), "Tailer for {} failed: {}", exit.key, err);
                self.hooks.error(&exit.pod, &exit.container, err);
            }
        }
    }

    /// Stop every worker and fire `exit` for each.
    pub async fn shutdown(&self) {
        let drained: Vec<Registered<F::Worker>> = {
            let mut workers = self.workers.lock().await;
            workers
                .drain()
                .map(|(_, entry)| {
                    entry.worker.stop();
                    entry
                })
                .collect()
        };

        info!("Stopped {} tailer(s)", drained.len());
        for entry in drained {
            self.hooks.exit(&entry.pod, &entry.container);
        }
    }

    pub async fn tailing_keys(&self) -> Vec<ContainerKey> {
        let mut keys: Vec<ContainerKey> = self.workers.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
