use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::errors::FetchError;

/// Cooperative cancellation flag shared between a caller and its in-flight
/// fetch work. Fetchers check it before each page request and the rate
/// limiter checks it before dispatching a queued task; once set, no further
/// side effects are committed for that logical request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Checkpoint helper for fetch loops.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}
