use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::core::duplicate::{DuplicateScanner, ScanError, ScanOutcome, guarded};
use crate::core::filter::{FilterError, filter_records, parse};
use crate::core::image::{ImageDecoder, ImageRecord};
use crate::core::progress::{CancelToken, ProgressReporter, ScanStatus};
use crate::core::similarity::{RankOutcome, SimilarityRanker};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("A scan is already running")]
    Busy,

    #[error("Failed to start scan worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Scan worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Result of a background job that may have stopped early.
pub trait JobOutcome {
    fn is_partial(&self) -> bool;
}

impl JobOutcome for ScanOutcome {
    fn is_partial(&self) -> bool {
        self.partial
    }
}

impl JobOutcome for RankOutcome {
    fn is_partial(&self) -> bool {
        self.partial
    }
}

/// A running background job.
pub struct ScanHandle<T> {
    handle: JoinHandle<Result<T, ScanError>>,
    cancel: CancelToken,
}

impl<T> ScanHandle<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker exits and take its result.
    pub fn join(self) -> Result<T, ControllerError> {
        let result = self
            .handle
            .join()
            .map_err(|_| ControllerError::WorkerPanicked)?;
        Ok(result?)
    }
}

type ActiveJob = Arc<Mutex<Option<CancelToken>>>;

/// Clears the running flag when the worker exits, however it exits.
struct RunningGuard {
    active: ActiveJob,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active = None;
    }
}

/// Entry point for the engine. Filtering runs on the caller's thread; duplicate
/// scans and similarity sorts run one at a time on a dedicated worker.
pub struct ScanController {
    config: EngineConfig,
    active: ActiveJob,
}

impl ScanController {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse `query` and return the matching records in input order.
    pub fn run_filter<'a>(
        &self,
        query: &str,
        records: &'a [ImageRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<&'a ImageRecord>, FilterError> {
        let expr = parse(query)?;
        Ok(filter_records(&expr, records, now))
    }

    pub fn run_duplicate_scan(
        &self,
        records: Arc<Vec<ImageRecord>>,
        decoder: Arc<dyn ImageDecoder>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ScanHandle<ScanOutcome>, ControllerError> {
        let scanner = DuplicateScanner::new(&self.config);
        self.spawn("duplicate-scan", reporter, move |reporter, cancel| {
            scanner.scan(&records, decoder.as_ref(), reporter, cancel)
        })
    }

    pub fn run_similarity_sort(
        &self,
        records: Arc<Vec<ImageRecord>>,
        decoder: Arc<dyn ImageDecoder>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ScanHandle<RankOutcome>, ControllerError> {
        self.spawn("similarity-sort", reporter, move |reporter, cancel| {
            SimilarityRanker::new().rank(&records, decoder.as_ref(), reporter, cancel)
        })
    }

    /// Request cancellation of the running job. Returns false when idle.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(token) => {
                log::info!("Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn spawn<T, F>(
        &self,
        name: &str,
        reporter: Arc<dyn ProgressReporter>,
        job: F,
    ) -> Result<ScanHandle<T>, ControllerError>
    where
        T: JobOutcome + Send + 'static,
        F: FnOnce(&dyn ProgressReporter, &CancelToken) -> Result<T, ScanError> + Send + 'static,
    {
        let cancel = CancelToken::new();
        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.is_some() {
                return Err(ControllerError::Busy);
            }
            *active = Some(cancel.clone());
        }

        let guard = RunningGuard {
            active: Arc::clone(&self.active),
        };
        let token = cancel.clone();
        let job_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                let result = guarded(|| job(reporter.as_ref(), &token)).unwrap_or_else(|message| {
                    Err(ScanError::Aborted {
                        processed: 0,
                        message,
                    })
                });

                let status = match &result {
                    Ok(outcome) if outcome.is_partial() => ScanStatus::Cancelled,
                    Ok(_) => ScanStatus::Completed,
                    Err(err) => ScanStatus::Failed {
                        processed: err.processed(),
                        message: err.to_string(),
                    },
                };
                log::info!("{} finished: {:?}", job_name, status);
                reporter.on_finished(&status);
                result
            })?;

        log::debug!("Started {} worker", name);
        Ok(ScanHandle { handle, cancel })
    }
}
