// Near-duplicate detection over a candidate record set:
// - Signing: decode every record and compute its perceptual signature
// - Comparing: leader clustering, candidates looked up through exact chunk keys
// - Sorting: lay clusters out for display, representative first

use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::core::image::{DecodeError, ImageDecoder, ImageRecord};
use crate::core::progress::{CancelToken, ProgressReporter, ScanPhase, ScanProgress};
use crate::core::signature::{CELL_COUNT, Signature, SignatureComputer};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan aborted after {processed} records: {message}")]
    Aborted { processed: usize, message: String },
}

impl ScanError {
    /// Records fully handled before the failure.
    pub fn processed(&self) -> usize {
        match self {
            ScanError::Aborted { processed, .. } => *processed,
        }
    }
}

/// Records sharing an equivalent signature. Indices point into the scanned
/// record slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCluster {
    pub representative: usize,
    pub duplicates: Vec<usize>,
}

impl DuplicateCluster {
    /// The representative is the earliest modified member, ties going to the
    /// smaller path. Returns `None` for an empty member list.
    pub fn from_members(records: &[ImageRecord], members: Vec<usize>) -> Option<Self> {
        let representative = members.iter().copied().min_by(|&a, &b| {
            let (a, b) = (&records[a], &records[b]);
            a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path))
        })?;
        let duplicates = members
            .into_iter()
            .filter(|&index| index != representative)
            .collect();

        Some(Self {
            representative,
            duplicates,
        })
    }

    pub fn len(&self) -> usize {
        1 + self.duplicates.len()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    /// Representative first, then duplicates in input order.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.representative).chain(self.duplicates.iter().copied())
    }

    fn first_index(&self) -> usize {
        self.members().min().unwrap_or(self.representative)
    }
}

/// A record left out of the scan because it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub path: PathBuf,
    pub reason: String,
}

/// State of one scan run. Written only by the worker that owns it and
/// consumed into a [`ScanOutcome`] when the run ends.
#[derive(Debug)]
pub struct ScanSession {
    phase: ScanPhase,
    value: usize,
    max: usize,
    scanned: usize,
    cancel: CancelToken,
    acknowledged: bool,
    clusters: Vec<DuplicateCluster>,
    skipped: Vec<SkippedRecord>,
}

impl ScanSession {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            phase: ScanPhase::Signing,
            value: 0,
            max: 0,
            scanned: 0,
            cancel,
            acknowledged: false,
            clusters: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn progress(&self) -> ScanProgress {
        ScanProgress {
            phase: self.phase,
            value: self.value,
            max: self.max,
        }
    }

    pub fn clusters(&self) -> &[DuplicateCluster] {
        &self.clusters
    }

    pub fn skipped(&self) -> &[SkippedRecord] {
        &self.skipped
    }

    pub(crate) fn enter(&mut self, phase: ScanPhase, max: usize, reporter: &dyn ProgressReporter) {
        self.phase = phase;
        self.value = 0;
        self.max = max;
        log::debug!("Entering {:?} phase with {} items", phase, max);
        if !self.cancel.is_cancelled() {
            reporter.on_progress(self.progress());
        }
    }

    pub(crate) fn advance(&mut self, reporter: &dyn ProgressReporter) {
        self.value += 1;
        reporter.on_progress(self.progress());
    }

    /// Polls the cancellation token. Once this returns true the caller must
    /// stop without reporting further progress.
    pub(crate) fn should_stop(&mut self) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        if !self.acknowledged {
            log::info!(
                "Cancelled during {:?} at {}/{}",
                self.phase,
                self.value,
                self.max
            );
            self.acknowledged = true;
        }
        true
    }

    pub(crate) fn skip(&mut self, index: usize, record: &ImageRecord, reason: String) {
        log::warn!("Skipping {}: {}", record.path.display(), reason);
        self.skipped.push(SkippedRecord {
            index,
            path: record.path.clone(),
            reason,
        });
    }

    fn into_outcome(self, total: usize, order: Vec<usize>, partial: bool) -> ScanOutcome {
        ScanOutcome {
            progress: self.progress(),
            clusters: self.clusters,
            order,
            skipped: self.skipped,
            scanned: self.scanned,
            total,
            partial,
        }
    }
}

/// Result of a scan. A cancelled scan still returns an outcome, flagged
/// `partial`, holding whatever clusters were built before the stop.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    /// Every cluster, singletons included.
    ///
    /// After a stop during Comparing this covers only the records compared so
    /// far. Representatives are picked among those, so a later record that
    /// would have joined a cluster is neither listed nor considered.
    pub clusters: Vec<DuplicateCluster>,
    /// Display order of record indices; empty when cancelled before Sorting
    pub order: Vec<usize>,
    pub skipped: Vec<SkippedRecord>,
    /// Records that went through the Signing phase
    pub scanned: usize,
    pub total: usize,
    pub partial: bool,
    /// Progress at the moment the scan ended
    pub progress: ScanProgress,
}

impl ScanOutcome {
    pub fn duplicate_clusters(&self) -> impl Iterator<Item = &DuplicateCluster> {
        self.clusters.iter().filter(|c| c.has_duplicates())
    }

    pub fn duplicate_count(&self) -> usize {
        self.clusters.iter().map(|c| c.duplicates.len()).sum()
    }

    /// `(duplicate count, records scanned)`
    pub fn summary(&self) -> (usize, usize) {
        (self.duplicate_count(), self.scanned)
    }
}

struct PendingCluster {
    anchor: Signature,
    members: Vec<usize>,
}

pub struct DuplicateScanner {
    computer: SignatureComputer,
    threshold: u32,
}

impl DuplicateScanner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            computer: SignatureComputer::from_config(config),
            threshold: config.threshold,
        }
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Run all three phases over `records`, polling `cancel` between records.
    ///
    /// Decode failures are skipped and listed in the outcome. Only a panic in
    /// the decoder or signature code aborts the scan.
    pub fn scan(
        &self,
        records: &[ImageRecord],
        decoder: &dyn ImageDecoder,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        let mut session = ScanSession::new(cancel.clone());
        log::info!("Searching duplicate images among {} files", records.len());

        let Some(signed) = self.sign(records, decoder, reporter, &mut session)? else {
            return Ok(session.into_outcome(records.len(), Vec::new(), true));
        };

        if !self.compare(records, &signed, reporter, &mut session) {
            return Ok(session.into_outcome(records.len(), Vec::new(), true));
        }

        let (order, complete) = self.sort(reporter, &mut session);
        let outcome = session.into_outcome(records.len(), order, !complete);
        let (duplicates, scanned) = outcome.summary();
        log::info!(
            "Found {} duplicates among {} files ({} skipped)",
            duplicates,
            scanned,
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    fn sign(
        &self,
        records: &[ImageRecord],
        decoder: &dyn ImageDecoder,
        reporter: &dyn ProgressReporter,
        session: &mut ScanSession,
    ) -> Result<Option<Vec<(usize, Signature)>>, ScanError> {
        session.enter(ScanPhase::Signing, records.len(), reporter);
        let mut signed = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            if session.should_stop() {
                session.scanned = index;
                return Ok(None);
            }

            match guarded(|| self.signature_for(record, decoder)) {
                Ok(Ok(signature)) => signed.push((index, signature)),
                Ok(Err(err)) => session.skip(index, record, err.to_string()),
                Err(message) => {
                    return Err(ScanError::Aborted {
                        processed: index,
                        message,
                    });
                }
            }
            session.advance(reporter);
        }

        session.scanned = records.len();
        Ok(Some(signed))
    }

    fn signature_for(
        &self,
        record: &ImageRecord,
        decoder: &dyn ImageDecoder,
    ) -> Result<Signature, DecodeError> {
        if let Some(cached) = record.signature() {
            if self.computer.produced(cached) {
                return Ok(cached.clone());
            }
        }

        let image = decoder.decode(&record.path)?;
        let signature = self.computer.signature(&image)?;
        record.cache_signature(signature.clone());
        Ok(signature)
    }

    /// Leader clustering: a record joins the earliest cluster whose anchor is
    /// within the threshold. Returns false when cancelled.
    ///
    /// Anchors are indexed by each of `threshold + 1` cell chunks; any anchor
    /// within the threshold matches a record exactly on at least one chunk.
    /// Thresholds with more chunks than cells fall back to a linear search.
    fn compare(
        &self,
        records: &[ImageRecord],
        signed: &[(usize, Signature)],
        reporter: &dyn ProgressReporter,
        session: &mut ScanSession,
    ) -> bool {
        session.enter(ScanPhase::Comparing, signed.len(), reporter);
        let chunk_count = self.threshold as usize + 1;
        let indexed = chunk_count <= CELL_COUNT;
        let mut pending: Vec<PendingCluster> = Vec::new();
        let mut chunks: HashMap<(usize, Vec<u8>), Vec<usize>> = HashMap::new();
        let mut complete = true;

        for (index, signature) in signed {
            if session.should_stop() {
                complete = false;
                break;
            }

            let found = if indexed {
                let mut candidates: Vec<usize> = signature
                    .chunks(chunk_count)
                    .enumerate()
                    .filter_map(|(slot, chunk)| chunks.get(&(slot, chunk.to_vec())))
                    .flatten()
                    .copied()
                    .collect();
                candidates.sort_unstable();
                candidates.dedup();
                candidates
                    .into_iter()
                    .find(|&c| pending[c].anchor.is_equivalent(signature, self.threshold))
            } else {
                pending
                    .iter()
                    .position(|p| p.anchor.is_equivalent(signature, self.threshold))
            };

            match found {
                Some(c) => pending[c].members.push(*index),
                None => {
                    if indexed {
                        for (slot, chunk) in signature.chunks(chunk_count).enumerate() {
                            chunks
                                .entry((slot, chunk.to_vec()))
                                .or_default()
                                .push(pending.len());
                        }
                    }
                    pending.push(PendingCluster {
                        anchor: signature.clone(),
                        members: vec![*index],
                    });
                }
            }
            session.advance(reporter);
        }

        log::debug!(
            "Compared {} signatures over {} chunk keys, {} clusters",
            signed.len(),
            chunks.len(),
            pending.len()
        );
        session.clusters = pending
            .into_iter()
            .filter_map(|p| DuplicateCluster::from_members(records, p.members))
            .collect();
        complete
    }

    /// Stable layout: clusters keep the position of their first member.
    fn sort(&self, reporter: &dyn ProgressReporter, session: &mut ScanSession) -> (Vec<usize>, bool) {
        session.enter(ScanPhase::Sorting, session.clusters.len(), reporter);
        session.clusters.sort_by_key(DuplicateCluster::first_index);

        let mut order = Vec::new();
        for i in 0..session.clusters.len() {
            if session.should_stop() {
                return (order, false);
            }
            order.extend(session.clusters[i].members());
            session.advance(reporter);
        }
        (order, true)
    }
}

/// Run `work`, turning a panic into its message.
pub(crate) fn guarded<T>(work: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(work)).map_err(panic_message)
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::progress::SilentReporter;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::path::Path;
    use std::sync::Mutex;

    /// Test pattern chosen by the first letter of the file name:
    /// `a` horizontal ramp, `b` vertical ramp, `c` flat grey, `x` undecodable.
    pub(crate) fn decode_by_name(path: &Path) -> Result<DynamicImage, DecodeError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let image = match name.chars().next() {
            Some('a') => ImageBuffer::from_fn(64, 64, |x, _| {
                let v = (x * 4) as u8;
                Rgb([v, v, v])
            }),
            Some('b') => ImageBuffer::from_fn(64, 64, |_, y| {
                let v = (y * 4) as u8;
                Rgb([v, v, v])
            }),
            Some('c') => ImageBuffer::from_pixel(64, 64, Rgb([128, 128, 128])),
            _ => {
                return Err(DecodeError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "corrupt test image",
                )));
            }
        };
        Ok(DynamicImage::ImageRgb8(image))
    }

    pub(crate) fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    pub(crate) fn records(specs: &[(&str, i64)]) -> Vec<ImageRecord> {
        specs
            .iter()
            .map(|(name, minutes)| {
                ImageRecord::new(
                    format!("/photos/{}.png", name),
                    1000,
                    base_time() + Duration::minutes(*minutes),
                )
            })
            .collect()
    }

    /// Collects progress and optionally cancels when a given step is reported.
    pub(crate) struct Recorder {
        pub events: Mutex<Vec<ScanProgress>>,
        pub cancel_at: Option<(ScanPhase, usize)>,
        pub token: CancelToken,
    }

    impl Recorder {
        pub fn new(token: CancelToken, cancel_at: Option<(ScanPhase, usize)>) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                cancel_at,
                token,
            }
        }
    }

    impl ProgressReporter for Recorder {
        fn on_progress(&self, progress: ScanProgress) {
            self.events.lock().unwrap().push(progress);
            if self.cancel_at == Some((progress.phase, progress.value)) {
                self.token.cancel();
            }
        }
    }

    fn scanner() -> DuplicateScanner {
        DuplicateScanner::new(&EngineConfig::default())
    }

    #[test]
    fn test_identical_signatures_form_one_cluster() {
        let records = records(&[("a4", 30), ("a2", 10), ("a1", 10), ("a3", 20)]);
        let outcome = scanner()
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();

        assert!(!outcome.partial);
        assert_eq!(outcome.clusters.len(), 1);
        let cluster = &outcome.clusters[0];
        assert_eq!(cluster.len(), 4);
        // a1 and a2 share the earliest mtime; a1 wins on path order
        assert_eq!(cluster.representative, 2);
        assert_eq!(cluster.duplicates, vec![0, 1, 3]);
        assert_eq!(outcome.summary(), (3, 4));
    }

    #[test]
    fn test_display_order_groups_clusters() {
        let records = records(&[("a1", 5), ("b1", 0), ("a2", 1), ("c1", 0), ("b2", 0)]);
        let outcome = scanner()
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.clusters.len(), 3);
        assert_eq!(outcome.duplicate_clusters().count(), 2);
        assert_eq!(outcome.order, vec![2, 0, 1, 4, 3]);
    }

    #[test]
    fn test_decode_failure_is_skipped() {
        let records = records(&[("a1", 0), ("x1", 0), ("a2", 1), ("b1", 0)]);
        let outcome = scanner()
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();

        assert!(!outcome.partial);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].index, 1);
        assert!(outcome.clusters.iter().all(|c| c.members().all(|m| m != 1)));
        assert!(!outcome.order.contains(&1));
        assert_eq!(outcome.summary(), (1, 4));
    }

    #[test]
    fn test_cancel_while_comparing_returns_partial() {
        let records = records(&[("a1", 0), ("b1", 0), ("a2", 0), ("c1", 0), ("b2", 0)]);
        let token = CancelToken::new();
        let recorder = Recorder::new(token.clone(), Some((ScanPhase::Comparing, 2)));

        let outcome = scanner()
            .scan(&records, &decode_by_name, &recorder, &token)
            .unwrap();

        assert!(outcome.partial);
        assert_eq!(outcome.progress.phase, ScanPhase::Comparing);
        assert!(outcome.progress.value < outcome.progress.max);
        assert!(outcome.order.is_empty());

        let events = recorder.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!((last.phase, last.value), (ScanPhase::Comparing, 2));

        // clusters built from the first two compared records survive; a2 would
        // have joined a1 but was never compared
        let members: Vec<usize> = outcome.clusters.iter().flat_map(|c| c.members()).collect();
        assert_eq!(members, vec![0, 1]);
        assert_eq!(outcome.duplicate_count(), 0);
    }

    #[test]
    fn test_cancel_while_signing() {
        let records = records(&[("a1", 0), ("a2", 0), ("a3", 0)]);
        let token = CancelToken::new();
        let recorder = Recorder::new(token.clone(), Some((ScanPhase::Signing, 1)));

        let outcome = scanner()
            .scan(&records, &decode_by_name, &recorder, &token)
            .unwrap();

        assert!(outcome.partial);
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.scanned, 1);
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_panicking_decoder_aborts() {
        let records = records(&[("a1", 0), ("a2", 0), ("boom", 0)]);
        let decoder = |path: &Path| -> Result<DynamicImage, DecodeError> {
            if path.to_string_lossy().contains("boom") {
                panic!("decoder exploded");
            }
            decode_by_name(path)
        };

        let err = scanner()
            .scan(&records, &decoder, &SilentReporter, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.processed(), 2);
        assert!(err.to_string().contains("decoder exploded"));
    }

    #[test]
    fn test_signatures_are_cached_on_records() {
        let records = records(&[("a1", 0), ("a2", 1)]);
        scanner()
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();
        assert!(records.iter().all(|r| r.signature().is_some()));

        let failing = |_: &Path| -> Result<DynamicImage, DecodeError> { Err(DecodeError::Empty) };
        let outcome = scanner()
            .scan(&records, &failing, &SilentReporter, &CancelToken::new())
            .unwrap();
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.duplicate_count(), 1);
    }

    #[test]
    fn test_zero_threshold_matches_exact_signatures_only() {
        let records = records(&[("a1", 0), ("c1", 0), ("a2", 0)]);
        let outcome = scanner()
            .with_threshold(0)
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.duplicate_count(), 1);
        assert_eq!(outcome.order, vec![0, 2, 1]);
    }

    /// Flat grey images whose top-left 8x8 block is `corner`, plus dark
    /// blocks at the given cell indices.
    fn grey_with_cells(corner: u8, dark: &[u32]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |x, y| {
            let cell = (y / 8) * 8 + x / 8;
            let v = if cell == 0 {
                corner
            } else if dark.contains(&cell) {
                100
            } else {
                128
            };
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_neighbours_across_level_boundary_cluster() {
        // 127 and 128 land in adjacent luminance levels of the first cell
        let records = records(&[("low", 0), ("high", 1)]);
        let decoder = |path: &Path| -> Result<DynamicImage, DecodeError> {
            let corner = if path.to_string_lossy().contains("low") { 127 } else { 128 };
            Ok(grey_with_cells(corner, &[]))
        };

        let outcome = scanner()
            .scan(&records, &decoder, &SilentReporter, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.duplicate_count(), 1);
        assert_eq!(outcome.clusters[0].representative, 0);
    }

    #[test]
    fn test_differences_spread_over_every_region_cluster() {
        // one level apart in six cells scattered over the grid, at the threshold
        let records = records(&[("plain", 0), ("spotted", 1), ("far", 2)]);
        let decoder = |path: &Path| -> Result<DynamicImage, DecodeError> {
            let name = path.to_string_lossy();
            Ok(if name.contains("plain") {
                grey_with_cells(128, &[])
            } else if name.contains("spotted") {
                grey_with_cells(127, &[9, 22, 35, 48, 63])
            } else {
                grey_with_cells(127, &[9, 22, 35, 48, 61, 63])
            })
        };

        let outcome = scanner()
            .with_threshold(6)
            .scan(&records, &decoder, &SilentReporter, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        assert_eq!(outcome.clusters[0].duplicates, vec![1]);
        assert_eq!(outcome.clusters[1].representative, 2);
    }

    #[test]
    fn test_threshold_beyond_cell_count_compares_everything() {
        let records = records(&[("a1", 0), ("b1", 0), ("c1", 0)]);
        let outcome = scanner()
            .with_threshold(1000)
            .scan(&records, &decode_by_name, &SilentReporter, &CancelToken::new())
            .unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.duplicate_count(), 2);
    }

    #[test]
    fn test_cancel_while_sorting_keeps_laid_out_prefix() {
        let records = records(&[("a1", 5), ("b1", 0), ("a2", 1), ("c1", 0), ("b2", 0)]);
        let token = CancelToken::new();
        let recorder = Recorder::new(token.clone(), Some((ScanPhase::Sorting, 1)));

        let outcome = scanner()
            .scan(&records, &decode_by_name, &recorder, &token)
            .unwrap();

        assert!(outcome.partial);
        assert_eq!(outcome.progress.phase, ScanPhase::Sorting);
        assert_eq!((outcome.progress.value, outcome.progress.max), (1, 3));
        // only the first cluster made it into the layout
        assert_eq!(outcome.order, vec![2, 0]);
        assert_eq!(outcome.clusters.len(), 3);
        assert_eq!(outcome.duplicate_count(), 2);

        let events = recorder.events.lock().unwrap();
        let last = events.last().unwrap();
        assert_eq!((last.phase, last.value), (ScanPhase::Sorting, 1));
    }

    #[test]
    fn test_progress_reaches_max_in_every_phase() {
        let records = records(&[("a1", 0), ("b1", 0), ("a2", 0)]);
        let token = CancelToken::new();
        let recorder = Recorder::new(token.clone(), None);
        scanner()
            .scan(&records, &decode_by_name, &recorder, &token)
            .unwrap();

        let events = recorder.events.lock().unwrap();
        for phase in [ScanPhase::Signing, ScanPhase::Comparing, ScanPhase::Sorting] {
            let last = events.iter().filter(|e| e.phase == phase).last().unwrap();
            assert_eq!(last.value, last.max, "{:?}", phase);
        }
    }
}
