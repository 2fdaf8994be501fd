//! Enhanced descriptor: 102 hand-crafted statistics.
//!
//! Layout of the vector (ranges are public so callers can slice groups):
//!
//! | range | group |
//! |---|---|
//! | `0..8` | color histogram |
//! | `8..72` | 8x8 color adjacency |
//! | `72..76` | symmetry: horizontal, vertical, diagonal, 180° |
//! | `76..82` | structure |
//! | `82..86` | connected components |
//! | `86..102` | 4x4 block density |

use super::components::connected_components;
use super::{ratio, FeatureWeights, ENHANCED_DIMS};
use crate::item::{PixelGrid, BACKGROUND, GRID_SIZE, PALETTE_SIZE, PIXEL_COUNT};
use std::ops::Range;

pub const HISTOGRAM: Range<usize> = 0..8;
pub const ADJACENCY: Range<usize> = 8..72;
pub const SYMMETRY: Range<usize> = 72..76;
pub const STRUCTURE: Range<usize> = 76..82;
pub const COMPONENTS: Range<usize> = 82..86;
pub const DENSITY: Range<usize> = 86..102;

/// Index of the 180° rotational score inside [`SYMMETRY`].
pub const ROTATIONAL: usize = 75;

/// Components beyond this count all map to 1.0.
const COMPONENT_CAP: f64 = 16.0;

/// Orthogonally adjacent pixel pairs in a 16x16 grid.
const ADJACENT_PAIRS: f64 = (2 * GRID_SIZE * (GRID_SIZE - 1)) as f64;

const LAST: usize = GRID_SIZE - 1;

pub fn extract(grid: &PixelGrid, weights: &FeatureWeights) -> Vec<f64> {
    let mut out = Vec::with_capacity(ENHANCED_DIMS);

    let color_gate = if weights.color > 0.0 { 1.0 } else { 0.0 };
    push_scaled(&mut out, &color_histogram(grid), color_gate);
    push_scaled(&mut out, &color_adjacency(grid), weights.adjacency);
    push_scaled(&mut out, &symmetry_scores(grid), weights.symmetry);
    push_scaled(&mut out, &structure(grid), weights.structure);
    push_scaled(&mut out, &component_stats(grid), weights.components);
    push_scaled(&mut out, &block_density(grid), weights.density);

    debug_assert_eq!(out.len(), ENHANCED_DIMS);
    out
}

fn push_scaled(out: &mut Vec<f64>, values: &[f64], weight: f64) {
    out.extend(values.iter().map(|v| v * weight));
}

fn color_histogram(grid: &PixelGrid) -> [f64; PALETTE_SIZE] {
    let mut bins = [0.0; PALETTE_SIZE];
    for &p in grid.as_bytes() {
        bins[p as usize] += 1.0;
    }
    for b in bins.iter_mut() {
        *b /= PIXEL_COUNT as f64;
    }
    bins
}

/// Symmetric co-occurrence of right and down neighbors, normalized to 1.
fn color_adjacency(grid: &PixelGrid) -> [f64; PALETTE_SIZE * PALETTE_SIZE] {
    let mut bins = [0.0; PALETTE_SIZE * PALETTE_SIZE];
    let mut bump = |a: u8, b: u8| {
        let (a, b) = (a as usize, b as usize);
        bins[a * PALETTE_SIZE + b] += 1.0;
        bins[b * PALETTE_SIZE + a] += 1.0;
    };

    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let here = grid.get(r, c);
            if c < LAST {
                bump(here, grid.get(r, c + 1));
            }
            if r < LAST {
                bump(here, grid.get(r + 1, c));
            }
        }
    }

    let total = 2.0 * ADJACENT_PAIRS;
    for b in bins.iter_mut() {
        *b /= total;
    }
    bins
}

fn symmetry_scores(grid: &PixelGrid) -> [f64; 4] {
    [
        mirror_score(grid, |r, c| (r, LAST - c)),
        mirror_score(grid, |r, c| (LAST - r, c)),
        mirror_score(grid, |r, c| (c, r)),
        mirror_score(grid, |r, c| (LAST - r, LAST - c)),
    ]
}

/// Fraction of positions whose color matches the mirrored position, counting
/// only positions where at least one side is ink. Blank grids score 0.
fn mirror_score(grid: &PixelGrid, mirror: impl Fn(usize, usize) -> (usize, usize)) -> f64 {
    let mut considered = 0usize;
    let mut matched = 0usize;

    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let (mr, mc) = mirror(r, c);
            let a = grid.get(r, c);
            let b = grid.get(mr, mc);
            if a == BACKGROUND && b == BACKGROUND {
                continue;
            }
            considered += 1;
            if a == b {
                matched += 1;
            }
        }
    }

    ratio(matched as f64, considered as f64)
}

/// Fill ratio, edge density, aspect/2, box coverage, centroid dispersion,
/// ink ratio. All zero for a blank grid.
fn structure(grid: &PixelGrid) -> [f64; 6] {
    let ink: Vec<(usize, usize)> = (0..GRID_SIZE)
        .flat_map(|r| (0..GRID_SIZE).map(move |c| (r, c)))
        .filter(|&(r, c)| grid.is_ink(r, c))
        .collect();

    if ink.is_empty() {
        return [0.0; 6];
    }

    let count = ink.len() as f64;
    let (mut min_r, mut max_r, mut min_c, mut max_c) = (LAST, 0, LAST, 0);
    let (mut sum_r, mut sum_c) = (0.0, 0.0);
    for &(r, c) in &ink {
        min_r = min_r.min(r);
        max_r = max_r.max(r);
        min_c = min_c.min(c);
        max_c = max_c.max(c);
        sum_r += r as f64;
        sum_c += c as f64;
    }

    let width = (max_c - min_c + 1) as f64;
    let height = (max_r - min_r + 1) as f64;
    let box_area = width * height;

    let mut edges = 0usize;
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let here = grid.get(r, c);
            if c < LAST && here != grid.get(r, c + 1) {
                edges += 1;
            }
            if r < LAST && here != grid.get(r + 1, c) {
                edges += 1;
            }
        }
    }

    let (cy, cx) = (sum_r / count, sum_c / count);
    let mean_spread = ink
        .iter()
        .map(|&(r, c)| ((r as f64 - cy).powi(2) + (c as f64 - cx).powi(2)).sqrt())
        .sum::<f64>()
        / count;
    // Farthest a pixel can sit from the grid center.
    let max_spread = (2.0 * (LAST as f64 / 2.0).powi(2)).sqrt();

    [
        ratio(count, box_area),
        edges as f64 / ADJACENT_PAIRS,
        (width / height).min(2.0) / 2.0,
        box_area / PIXEL_COUNT as f64,
        (mean_spread / max_spread).min(1.0),
        count / PIXEL_COUNT as f64,
    ]
}

/// Capped count, then largest, smallest and mean size over total ink.
fn component_stats(grid: &PixelGrid) -> [f64; 4] {
    let components = connected_components(grid);
    if components.is_empty() {
        return [0.0; 4];
    }

    let ink: usize = components.iter().map(|c| c.size).sum();
    let largest = components.iter().map(|c| c.size).max().unwrap_or(0);
    let smallest = components.iter().map(|c| c.size).min().unwrap_or(0);
    let mean = ink as f64 / components.len() as f64;

    [
        (components.len() as f64).min(COMPONENT_CAP) / COMPONENT_CAP,
        ratio(largest as f64, ink as f64),
        ratio(smallest as f64, ink as f64),
        ratio(mean, ink as f64),
    ]
}

/// Ink density of each 4x4 block, row-major over the 4x4 block grid.
fn block_density(grid: &PixelGrid) -> [f64; 16] {
    const BLOCK: usize = GRID_SIZE / 4;
    let mut out = [0.0; 16];
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            if grid.is_ink(r, c) {
                out[(r / BLOCK) * 4 + c / BLOCK] += 1.0;
            }
        }
    }
    for v in out.iter_mut() {
        *v /= (BLOCK * BLOCK) as f64;
    }
    out
}
