use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::EngineConfig;
use crate::core::image::DecodeError;

pub const GRID_SIZE: usize = 8;
pub const CELL_COUNT: usize = GRID_SIZE * GRID_SIZE;

pub const DEFAULT_LEVELS: u8 = 8;
pub const MAX_LEVELS: u8 = 64;

/// Signatures whose L1 distance is at or below this count as duplicates.
pub const DEFAULT_THRESHOLD: u32 = 6;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Average luminance of an 8x8 grid, quantized into `levels` buckets
    #[default]
    Luminance,
    /// 8x8 horizontal gradient hash, one bit per cell
    Gradient,
}

/// Fixed-length perceptual fingerprint: 64 small integer cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    kind: SignatureKind,
    levels: u8,
    cells: [u8; CELL_COUNT],
}

impl Signature {
    pub fn from_cells(kind: SignatureKind, levels: u8, cells: [u8; CELL_COUNT]) -> Self {
        Self {
            kind,
            levels,
            cells,
        }
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// L1 distance between cells. For one-bit cells this is the Hamming distance.
    pub fn distance(&self, other: &Signature) -> u32 {
        debug_assert_eq!(self.kind, other.kind);
        self.cells
            .iter()
            .zip(other.cells.iter())
            .map(|(a, b)| u32::from(a.abs_diff(*b)))
            .sum()
    }

    pub fn is_equivalent(&self, other: &Signature, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }

    /// Split the cells into `count` contiguous chunks of near-equal length.
    ///
    /// Two signatures within L1 distance `d` agree exactly on at least one of
    /// `d + 1` chunks, so indexing chunks finds every candidate pair.
    pub fn chunks(&self, count: usize) -> impl Iterator<Item = &[u8]> + '_ {
        let count = count.clamp(1, CELL_COUNT);
        (0..count).map(move |i| &self.cells[i * CELL_COUNT / count..(i + 1) * CELL_COUNT / count])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in &self.cells {
            if self.levels <= 16 {
                write!(f, "{:x}", cell)?;
            } else {
                write!(f, "{:02x}", cell)?;
            }
        }
        Ok(())
    }
}

/// Computes signatures from decoded pixels. Pure: the same pixels always
/// give the same signature, independent of path or file metadata.
pub struct SignatureComputer {
    kind: SignatureKind,
    levels: u8,
    gradient: Option<Hasher>,
}

impl SignatureComputer {
    pub fn new(kind: SignatureKind, levels: u8) -> Self {
        let levels = match kind {
            SignatureKind::Luminance => levels.clamp(2, MAX_LEVELS),
            SignatureKind::Gradient => 2,
        };
        let gradient = match kind {
            SignatureKind::Gradient => Some(
                HasherConfig::new()
                    .hash_size(GRID_SIZE as u32, GRID_SIZE as u32)
                    .hash_alg(HashAlg::Gradient)
                    .to_hasher(),
            ),
            SignatureKind::Luminance => None,
        };

        Self {
            kind,
            levels,
            gradient,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.signature, config.levels)
    }

    pub fn kind(&self) -> SignatureKind {
        self.kind
    }

    pub fn levels(&self) -> u8 {
        self.levels
    }

    /// Whether `signature` was produced with this computer's settings.
    pub fn produced(&self, signature: &Signature) -> bool {
        signature.kind == self.kind && signature.levels == self.levels
    }

    pub fn signature(&self, image: &DynamicImage) -> Result<Signature, DecodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DecodeError::Empty);
        }

        let cells = match &self.gradient {
            Some(hasher) => gradient_cells(hasher, image),
            None => self.luminance_cells(image),
        };
        Ok(Signature::from_cells(self.kind, self.levels, cells))
    }

    fn luminance_cells(&self, image: &DynamicImage) -> [u8; CELL_COUNT] {
        let luma = image.to_luma8();
        let (width, height) = (u64::from(luma.width()), u64::from(luma.height()));
        let grid = GRID_SIZE as u64;
        let levels = u64::from(self.levels);
        let mut cells = [0u8; CELL_COUNT];

        for gy in 0..grid {
            let y0 = gy * height / grid;
            let y1 = ((gy + 1) * height / grid).max(y0 + 1);
            for gx in 0..grid {
                let x0 = gx * width / grid;
                let x1 = ((gx + 1) * width / grid).max(x0 + 1);

                let mut sum = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += u64::from(luma.get_pixel(x as u32, y as u32)[0]);
                    }
                }
                let average = sum / ((y1 - y0) * (x1 - x0));
                let bucket = (average * levels / 256).min(levels - 1);
                cells[(gy * grid + gx) as usize] = bucket as u8;
            }
        }
        cells
    }
}

fn gradient_cells(hasher: &Hasher, image: &DynamicImage) -> [u8; CELL_COUNT] {
    let hash = hasher.hash_image(image);
    let bytes = hash.as_bytes();
    let mut cells = [0u8; CELL_COUNT];
    for (i, cell) in cells.iter_mut().enumerate() {
        let byte = bytes.get(i / 8).copied().unwrap_or(0);
        *cell = (byte >> (i % 8)) & 1;
    }
    cells
}
