//! Items and the 16x16 palette grid they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Grid edge length in pixels.
pub const GRID_SIZE: usize = 16;

/// Pixels per grid.
pub const PIXEL_COUNT: usize = GRID_SIZE * GRID_SIZE;

/// Number of palette entries (color indices 0..=7).
pub const PALETTE_SIZE: usize = 8;

/// Palette index of the white background.
pub const BACKGROUND: u8 = 1;

/// Palette colors as RGB: black, white, red, orange, yellow, green, blue, purple.
pub const PALETTE: [[u8; 3]; PALETTE_SIZE] = [
    [0, 0, 0],
    [255, 255, 255],
    [255, 0, 0],
    [255, 165, 0],
    [255, 255, 0],
    [0, 128, 0],
    [0, 0, 255],
    [128, 0, 128],
];

/// Single-value "ink" encoding per palette index: 1 - Rec.709 luma of the
/// palette color, so the background is 0 and black is 1.
pub const PERCEPTUAL: [f64; PALETTE_SIZE] = [1.0, 0.0, 0.787, 0.325, 0.072, 0.641, 0.928, 0.857];

/// A 16x16 grid of palette indices, row-major.
///
/// Always holds exactly [`PIXEL_COUNT`] values in `0..PALETTE_SIZE`; the
/// sanitizing constructors make malformed input impossible to represent.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<i64>", into = "Vec<u8>")]
pub struct PixelGrid([u8; PIXEL_COUNT]);

impl PixelGrid {
    /// All-background grid.
    pub fn blank() -> Self {
        Self([BACKGROUND; PIXEL_COUNT])
    }

    /// Grid filled with one color (out-of-range colors become background).
    pub fn filled(color: u8) -> Self {
        Self([sanitize(color as i64); PIXEL_COUNT])
    }

    /// Build from arbitrary input.
    ///
    /// Truncates past 256 values, pads short input with background and
    /// replaces any index outside `0..=7` with background.
    pub fn from_raw(raw: &[i64]) -> Self {
        let mut pixels = [BACKGROUND; PIXEL_COUNT];
        for (slot, &value) in pixels.iter_mut().zip(raw.iter()) {
            *slot = sanitize(value);
        }
        Self(pixels)
    }

    /// Build from row-major palette indices, same sanitizing as [`from_raw`](Self::from_raw).
    pub fn from_indices(raw: &[u8]) -> Self {
        let mut pixels = [BACKGROUND; PIXEL_COUNT];
        for (slot, &value) in pixels.iter_mut().zip(raw.iter()) {
            *slot = sanitize(value as i64);
        }
        Self(pixels)
    }

    /// Color index at (row, col). Both must be below [`GRID_SIZE`].
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.0[row * GRID_SIZE + col]
    }

    /// Return a copy with one pixel changed.
    pub fn with_pixel(mut self, row: usize, col: usize, color: u8) -> Self {
        if row < GRID_SIZE && col < GRID_SIZE {
            self.0[row * GRID_SIZE + col] = sanitize(color as i64);
        }
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_ink(&self, row: usize, col: usize) -> bool {
        self.get(row, col) != BACKGROUND
    }

    /// Number of non-background pixels.
    pub fn ink_count(&self) -> usize {
        self.0.iter().filter(|&&p| p != BACKGROUND).count()
    }

    /// True when every pixel is background.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&p| p == BACKGROUND)
    }
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::blank()
    }
}

impl std::fmt::Debug for PixelGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PixelGrid [")?;
        for row in self.0.chunks(GRID_SIZE) {
            let line: String = row.iter().map(|p| char::from(b'0' + p)).collect();
            writeln!(f, "  {}", line)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<i64>> for PixelGrid {
    fn from(raw: Vec<i64>) -> Self {
        Self::from_raw(&raw)
    }
}

impl From<PixelGrid> for Vec<u8> {
    fn from(grid: PixelGrid) -> Self {
        grid.0.to_vec()
    }
}

#[inline]
fn sanitize(value: i64) -> u8 {
    if (0..PALETTE_SIZE as i64).contains(&value) {
        value as u8
    } else {
        BACKGROUND
    }
}

/// One drawing as delivered by the item source.
///
/// Immutable once created; the engine never edits pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub pixels: PixelGrid,
    #[serde(rename = "createdAt", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: impl Into<String>, pixels: PixelGrid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            pixels,
            created_at,
        }
    }
}
