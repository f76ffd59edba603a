use thiserror::Error;

/// Fatal termination of a container log worker.
#[derive(Error, Debug)]
pub enum TailError {
    #[error("pod {namespace}/{pod} no longer exists")]
    NotFound { namespace: String, pod: String },

    #[error("giving up after {attempts} consecutive failures: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TailError {
    /// Short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            TailError::NotFound { .. } => "not_found",
            TailError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
