//! Query and duplicate-detection engine for photo collections.
//!
//! Records come from [`DirectoryEnumerator`], are narrowed with the filter
//! query language and grouped into near-duplicate clusters by perceptual
//! signature. Long scans run on a worker owned by [`ScanController`].

pub mod config;
pub mod core;

pub use crate::config::{ConfigError, EngineConfig};
pub use crate::core::controller::{ControllerError, JobOutcome, ScanController, ScanHandle};
pub use crate::core::duplicate::{
    DuplicateCluster, DuplicateScanner, ScanError, ScanOutcome, SkippedRecord,
};
pub use crate::core::filter::{FilterError, FilterExpression, filter_records, parse};
pub use crate::core::image::{DecodeError, FsDecoder, ImageDecoder, ImageRecord};
pub use crate::core::progress::{
    CancelToken, ProgressReporter, ScanPhase, ScanProgress, ScanStatus, SilentReporter,
};
pub use crate::core::scanner::{DirectoryEnumerator, EnumerateError};
pub use crate::core::signature::{Signature, SignatureComputer, SignatureKind};
pub use crate::core::similarity::{RankOutcome, SimilarityRanker};
