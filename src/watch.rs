//! Pod watch source.
//!
//! kube's watcher reports every sighting of a pod as `Apply` and re-lists after a
//! reconnect. [`PodTracker`] turns that into add/update/delete notifications, including
//! deletes for pods that disappeared while the watch was down.

use crate::controller::Scope;
use crate::selector::selector_to_string;
use crate::types::{PodSnapshot, WatchEvent};
use futures::stream::{self, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{Config as WatcherConfig, Event, watcher};
use kube::{Api, Client};
use std::collections::HashMap;
use tracing::{debug, info, warn};

type PodRef = (String, String);

#[derive(Debug, Default)]
pub struct PodTracker {
    known: HashMap<PodRef, PodSnapshot>,
    /// Pods seen since the current re-list started.
    relisted: Option<HashMap<PodRef, PodSnapshot>>,
}

impl PodTracker {
    pub fn apply(&mut self, event: Event<Pod>) -> Vec<WatchEvent> {
        match event {
            Event::Init => {
                debug!("Pod re-list started");
                self.relisted = Some(HashMap::new());
                Vec::new()
            }
            Event::InitApply(pod) => {
                let Some(snapshot) = PodSnapshot::from_pod(&pod) else {
                    return Vec::new();
                };
                if let Some(relisted) = &mut self.relisted {
                    relisted.insert(pod_ref(&snapshot), snapshot.clone());
                }
                vec![self.observe(snapshot)]
            }
            Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<PodRef> = self
                    .known
                    .keys()
                    .filter(|k| !relisted.contains_key(*k))
                    .cloned()
                    .collect();
                info!("Pod list complete: {} pod(s), {} gone", relisted.len(), gone.len());
                gone.into_iter()
                    .filter_map(|k| self.known.remove(&k))
                    .map(WatchEvent::Deleted)
                    .collect()
            }
            Event::Apply(pod) => match PodSnapshot::from_pod(&pod) {
                Some(snapshot) => vec![self.observe(snapshot)],
                None => Vec::new(),
            },
            Event::Delete(pod) => {
                let Some(snapshot) = PodSnapshot::from_pod(&pod) else {
                    return Vec::new();
                };
                let known = self.known.remove(&pod_ref(&snapshot));
                // Prefer the snapshot we registered from so every added container is torn down.
                vec![WatchEvent::Deleted(known.unwrap_or(snapshot))]
            }
        }
    }

    fn observe(&mut self, snapshot: PodSnapshot) -> WatchEvent {
        match self.known.insert(pod_ref(&snapshot), snapshot.clone()) {
            None => WatchEvent::Added(snapshot),
            Some(_) => WatchEvent::Updated(snapshot),
        }
    }
}

fn pod_ref(pod: &PodSnapshot) -> PodRef {
    (pod.namespace.clone(), pod.name.clone())
}

/// Stream pod notifications for the scope. Never ends on its own; watch errors are
/// retried with backoff.
pub fn pod_events(client: Client, scope: &Scope) -> impl Stream<Item = WatchEvent> + Send + use<> {
    let api: Api<Pod> = match &scope.namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let mut cfg = WatcherConfig::default();
    if let Some(labels) = selector_to_string(&scope.selector) {
        cfg = cfg.labels(&labels);
    }

    let mut tracker = PodTracker::default();
    watcher(api, cfg)
        .default_backoff()
        .filter_map(|res| async move {
            match res {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!("Pod watch error: {}", err);
                    None
                }
            }
        })
        .flat_map(move |event| stream::iter(tracker.apply(event)))
}
