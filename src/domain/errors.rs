use thiserror::Error;

/// Errors raised by the fetch pipeline (providers, local datasets, limiter).
///
/// Handling policy per variant:
/// - `Precondition` is raised before any I/O and is always fatal.
/// - `Provider` is surfaced to the caller of the failing fetch; never retried here.
/// - `Cancelled` is never retried and never triggers a fallback path.
/// - `LocalRead` is caught by the orchestrator and converted into a full-API fallback.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Local dataset read failed: {0}")]
    LocalRead(String),

    #[error("HTTP transport error: {0}")]
    Http(String),
}

impl FetchError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// True for errors that must short-circuit without fallback routing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
