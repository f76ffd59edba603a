use crate::controller::{Worker, WorkerFactory};
use crate::error::TailError;
use crate::types::{ContainerSpec, LogMessage, PodSnapshot};
use chrono::{DateTime, Utc};
use futures::io::AsyncBufReadExt;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, api::LogParams};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Lines of history to print on the first attach.
    pub tail_lines: Option<i64>,
    /// Consecutive failures before giving up. 0 retries forever.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            tail_lines: None,
            max_retries: 0,
            retry_delay: Duration::from_secs(5),
        }
    }
}

pub struct TailerFactory {
    client: Client,
    options: TailOptions,
}

impl TailerFactory {
    pub fn new(client: Client, options: TailOptions) -> Self {
        Self { client, options }
    }
}

impl WorkerFactory for TailerFactory {
    type Worker = ContainerTailer;

    fn create(
        &self,
        pod: &PodSnapshot,
        container: &ContainerSpec,
        events: mpsc::Sender<LogMessage>,
    ) -> ContainerTailer {
        ContainerTailer {
            api: Api::namespaced(self.client.clone(), &pod.namespace),
            namespace: pod.namespace.clone(),
            pod_name: pod.name.clone(),
            container_name: container.name.clone(),
            events,
            options: self.options.clone(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Follows the logs of one container, reconnecting until stopped.
pub struct ContainerTailer {
    api: Api<Pod>,
    namespace: String,
    pod_name: String,
    container_name: String,
    events: mpsc::Sender<LogMessage>,
    options: TailOptions,
    cancel: CancellationToken,
}

impl Worker for ContainerTailer {
    fn run(&self) -> impl Future<Output = Result<(), TailError>> + Send {
        async move {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Ok(()),
                result = self.follow() => result,
            }
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

impl ContainerTailer {
    fn failure(
        &self,
        failures: &mut u32,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Result<(), TailError> {
        *failures += 1;
        if self.options.max_retries > 0 && *failures >= self.options.max_retries {
            return Err(TailError::RetriesExhausted {
                attempts: *failures,
                source: Box::new(err),
            });
        }
        warn!(
            "Log stream for {}/{}/{} failed ({}), retrying in {:?}",
            self.namespace, self.pod_name, self.container_name, err, self.options.retry_delay
        );
        Ok(())
    }

    async fn follow(&self) -> Result<(), TailError> {
        let mut last_seen: Option<DateTime<Utc>> = None;
        let mut failures = 0u32;

        loop {
            let params = LogParams {
                follow: true,
                container: Some(self.container_name.clone()),
                timestamps: true,
                tail_lines: if last_seen.is_none() {
                    self.options.tail_lines
                } else {
                    None
                },
                since_seconds: last_seen.map(since_seconds),
                ..Default::default()
            };

            match self.api.log_stream(&self.pod_name, &params).await {
                Ok(stream) => {
                    failures = 0;
                    // Lines at or before this instant were already delivered.
                    let resume_after = last_seen;
                    let mut lines = stream.lines();
                    while let Some(line) = lines.next().await {
                        let line = match line {
                            Ok(line) => line,
                            Err(e) => {
                                self.failure(&mut failures, e)?;
                                break;
                            }
                        };

                        let (timestamp, text) = split_timestamp(&line);
                        if let (Some(ts), Some(after)) = (timestamp, resume_after)
                            && ts <= after
                        {
                            continue;
                        }
                        if timestamp.is_some() {
                            last_seen = timestamp;
                        }

                        let msg = LogMessage {
                            namespace: self.namespace.clone(),
                            pod_name: self.pod_name.clone(),
                            container_name: self.container_name.clone(),
                            line: text.to_string(),
                            timestamp,
                        };
                        if self.events.send(msg).await.is_err() {
                            debug!("Log receiver closed, stopping tail");
                            return Ok(());
                        }
                    }
                    debug!(
                        "Log stream ended for {}/{}/{}",
                        self.namespace, self.pod_name, self.container_name
                    );
                }
                Err(e) if not_started(&e) => {
                    debug!(
                        "Container {}/{}/{} has not started yet",
                        self.namespace, self.pod_name, self.container_name
                    );
                }
                Err(e) => {
                    if let kube::Error::Api(err) = &e
                        && err.code == 404
                    {
                        return Err(TailError::NotFound {
                            namespace: self.namespace.clone(),
                            pod: self.pod_name.clone(),
                        });
                    }
                    self.failure(&mut failures, e)?;
                }
            }
            tokio::time::sleep(self.options.retry_delay).await;
        }
    }
}

/// The API server answers 400 while a container is still being created or its pod is
/// still running init containers. That is not a failure.
fn not_started(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(status) => {
            status.code == 400
                && (status.message.contains("waiting to start")
                    || status.message.contains("PodInitializing")
                    || status.message.contains("ContainerCreating"))
        }
        _ => false,
    }
}

fn since_seconds(last_seen: DateTime<Utc>) -> i64 {
    (Utc::now() - last_seen).num_seconds().max(0) + 1
}

/// Split the RFC3339 prefix the API server adds when `timestamps` is set.
pub fn split_timestamp(line: &str) -> (Option<DateTime<Utc>>, &str) {
    if let Some((prefix, rest)) = line.split_once(' ')
        && let Ok(ts) = DateTime::parse_from_rfc3339(prefix)
    {
        return (Some(ts.with_timezone(&Utc)), rest);
    }
    (None, line)
}
