use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::fmt;

/// A single log line read from a container.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub line: String,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: Option<String>,
}

/// The part of a pod notification the controller cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<ContainerSpec>,
}

impl PodSnapshot {
    /// Returns `None` for pods missing a namespace, a name or a spec.
    pub fn from_pod(pod: &Pod) -> Option<Self> {
        let namespace = pod.metadata.namespace.clone()?;
        let name = pod.metadata.name.clone()?;
        let spec = pod.spec.as_ref()?;
        Some(Self {
            namespace,
            name,
            labels: pod.metadata.labels.clone().unwrap_or_default(),
            containers: spec
                .containers
                .iter()
                .map(|c| ContainerSpec {
                    name: c.name.clone(),
                    image: c.image.clone(),
                })
                .collect(),
        })
    }

    pub fn key_for(&self, container: &ContainerSpec) -> ContainerKey {
        ContainerKey {
            namespace: self.namespace.clone(),
            pod: self.name.clone(),
            container: container.name.clone(),
        }
    }
}

/// Identifies one tailing target: (namespace, pod name, container name).
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct ContainerKey {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// Pod notifications as delivered to the controller.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Added(PodSnapshot),
    Updated(PodSnapshot),
    Deleted(PodSnapshot),
}
