use image::DynamicImage;
use image::imageops::FilterType;
use serde::Serialize;

use crate::core::duplicate::{ScanError, ScanSession, SkippedRecord, guarded};
use crate::core::image::{DecodeError, ImageDecoder, ImageRecord};
use crate::core::progress::{CancelToken, ProgressReporter, ScanPhase, ScanProgress};

const BINS: usize = 256;
/// Images are scaled to a square of this side before counting colours.
const SAMPLE_SIDE: u32 = 256;

/// Per-channel colour histogram.
#[derive(Debug, Clone)]
pub struct Histogram {
    red: [f32; BINS],
    green: [f32; BINS],
    blue: [f32; BINS],
}

impl Histogram {
    pub fn from_image(image: &DynamicImage) -> Result<Self, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty);
        }

        let sample = image
            .resize_exact(SAMPLE_SIDE, SAMPLE_SIDE, FilterType::Triangle)
            .to_rgb8();
        let mut histogram = Self {
            red: [0.0; BINS],
            green: [0.0; BINS],
            blue: [0.0; BINS],
        };
        for pixel in sample.pixels() {
            let [r, g, b] = pixel.0;
            histogram.red[usize::from(r)] += 1.0;
            histogram.green[usize::from(g)] += 1.0;
            histogram.blue[usize::from(b)] += 1.0;
        }
        Ok(histogram)
    }

    /// Sum of the Hellinger distances of the three channels, in `0.0..=3.0`.
    pub fn distance(&self, other: &Histogram) -> f32 {
        channel_distance(&self.red, &other.red)
            + channel_distance(&self.green, &other.green)
            + channel_distance(&self.blue, &other.blue)
    }
}

fn channel_distance(a: &[f32; BINS], b: &[f32; BINS]) -> f32 {
    let (mut len_a, mut len_b, mut overlap) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b.iter()) {
        len_a += x;
        len_b += y;
        overlap += (x * y).sqrt();
    }
    if len_a == 0.0 || len_b == 0.0 {
        return 1.0;
    }
    (1.0 - overlap / (len_a * len_b).sqrt()).max(0.0).sqrt()
}

#[derive(Debug, Clone, Serialize)]
pub struct RankOutcome {
    /// Record indices, similar images adjacent; undecodable records last
    pub order: Vec<usize>,
    pub skipped: Vec<SkippedRecord>,
    pub total: usize,
    pub partial: bool,
    pub progress: ScanProgress,
}

/// Orders records so that images with similar colour distributions sit next
/// to each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityRanker;

impl SimilarityRanker {
    pub fn new() -> Self {
        Self
    }

    /// Greedy nearest-neighbour chain starting at the first decodable record.
    /// Ties go to the later candidate. Cancellation before the Sorting phase
    /// leaves the order empty.
    pub fn rank(
        &self,
        records: &[ImageRecord],
        decoder: &dyn ImageDecoder,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<RankOutcome, ScanError> {
        let mut session = ScanSession::new(cancel.clone());
        let finish = |session: ScanSession, order: Vec<usize>, partial: bool| RankOutcome {
            order,
            skipped: session.skipped().to_vec(),
            total: records.len(),
            partial,
            progress: session.progress(),
        };

        // Signing: histograms for every decodable record
        session.enter(ScanPhase::Signing, records.len(), reporter);
        let mut histograms: Vec<(usize, Histogram)> = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if session.should_stop() {
                return Ok(finish(session, Vec::new(), true));
            }
            let result = guarded(|| {
                decoder
                    .decode(&record.path)
                    .and_then(|image| Histogram::from_image(&image))
            });
            match result {
                Ok(Ok(histogram)) => histograms.push((index, histogram)),
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

        // Comparing: chain[i + 1] becomes the closest remaining neighbour of chain[i]
        let steps = histograms.len().saturating_sub(1);
        session.enter(ScanPhase::Comparing, steps, reporter);
        let mut chain: Vec<usize> = (0..histograms.len()).collect();
        for i in 0..steps {
            if session.should_stop() {
                return Ok(finish(session, Vec::new(), true));
            }
            let current = &histograms[chain[i]].1;
            let nearest = (i + 1..chain.len())
                .map(|j| (j, current.distance(&histograms[chain[j]].1)))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)))
                .map_or(i + 1, |(j, _)| j);
            chain.swap(i + 1, nearest);
            session.advance(reporter);
        }

        // Sorting: chained records, then the skipped ones in input order
        let skipped: Vec<usize> = session.skipped().iter().map(|s| s.index).collect();
        let ranked: Vec<usize> = chain
            .into_iter()
            .map(|position| histograms[position].0)
            .chain(skipped)
            .collect();
        session.enter(ScanPhase::Sorting, ranked.len(), reporter);
        let mut order = Vec::with_capacity(ranked.len());
        for index in ranked {
            if session.should_stop() {
                return Ok(finish(session, order, true));
            }
            order.push(index);
            session.advance(reporter);
        }

        log::info!(
            "Sorted {} files by similarity ({} skipped)",
            records.len(),
            session.skipped().len()
        );
        Ok(finish(session, order, false))
    }
}
