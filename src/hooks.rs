use crate::controller::ContainerHooks;
use crate::error::TailError;
use crate::types::{ContainerSpec, PodSnapshot};
use anyhow::{Context, Result};
use regex::Regex;
use tracing::{error, info};

/// Include/exclude name patterns.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("Invalid regex pattern '{}'", p)))
        .collect()
}

impl ContainerFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// A container matches when its pod or container name hits an include pattern (or there
    /// are none) and neither name hits an exclude pattern.
    pub fn matches(&self, pod: &PodSnapshot, container: &ContainerSpec) -> bool {
        let hit = |re: &Regex| re.is_match(&pod.name) || re.is_match(&container.name);
        if self.exclude.iter().any(hit) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(hit)
    }
}

/// Reports container lifecycle on the diagnostic log.
pub struct ConsoleHooks {
    filter: ContainerFilter,
    quiet: bool,
}

impl ConsoleHooks {
    pub fn new(filter: ContainerFilter, quiet: bool) -> Self {
        Self { filter, quiet }
    }
}

impl ContainerHooks for ConsoleHooks {
    fn filter(&self, pod: &PodSnapshot, container: &ContainerSpec) -> bool {
        self.filter.matches(pod, container)
    }

    fn enter(&self, pod: &PodSnapshot, container: &ContainerSpec) {
        if !self.quiet {
            info!(
                "==> {}/{}/{} attached ({})",
                pod.namespace,
                pod.name,
                container.name,
                container.image.as_deref().unwrap_or("unknown image")
            );
        }
    }

    fn exit(&self, pod: &PodSnapshot, container: &ContainerSpec) {
        if !self.quiet {
            info!("<== {}/{}/{} detached", pod.namespace, pod.name, container.name);
        }
    }

    fn error(&self, pod: &PodSnapshot, container: &ContainerSpec, err: &TailError) {
        error!(
            "{}/{}/{} stopped tailing: {}",
            pod.namespace, pod.name, container.name, err
        );
    }
}
