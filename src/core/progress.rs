use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanPhase {
    Signing,
    Comparing,
    Sorting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub value: usize,
    pub max: usize,
}

/// How a background job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Completed,
    Cancelled,
    Failed { processed: usize, message: String },
}

/// Receives progress from the scan worker.
///
/// Called on the worker thread; implementations marshal onto their own
/// context. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, _progress: ScanProgress) {}
    fn on_finished(&self, _status: &ScanStatus) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Cooperative cancellation flag shared between the controller and a worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }
}
