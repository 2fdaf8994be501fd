//! Invariant descriptor: orientation-averaged 8x8 thumbnail.
//!
//! 1. Encode each pixel with its perceptual ink value (background = 0).
//! 2. Shift the drawing so its ink-weighted centroid sits on the grid center.
//! 3. Build the 8 orientations (4 rotations, each with and without a
//!    horizontal flip) and downsample each to 8x8 by 2x2 averaging.
//! 4. Average the 8 thumbnails elementwise.

use super::INVARIANT_DIMS;
use crate::item::{PixelGrid, GRID_SIZE, PERCEPTUAL, PIXEL_COUNT};

const HALF: usize = GRID_SIZE / 2;
const LAST: usize = GRID_SIZE - 1;
const CENTER: f64 = LAST as f64 / 2.0;

type Plane = [f64; PIXEL_COUNT];

pub fn extract(grid: &PixelGrid) -> Vec<f64> {
    let plane = encode(grid);
    let Some((cy, cx)) = weighted_centroid(&plane) else {
        return vec![0.0; INVARIANT_DIMS];
    };
    let centered = shift(&plane, (CENTER - cy).round() as isize, (CENTER - cx).round() as isize);

    let mut acc = vec![0.0; INVARIANT_DIMS];
    for rotation in 0..4 {
        for flip in [false, true] {
            let oriented = orient(&centered, rotation, flip);
            for (slot, v) in acc.iter_mut().zip(downsample(&oriented)) {
                *slot += v;
            }
        }
    }
    for v in acc.iter_mut() {
        *v /= 8.0;
    }
    acc
}

fn encode(grid: &PixelGrid) -> Plane {
    let mut plane = [0.0; PIXEL_COUNT];
    for (slot, &p) in plane.iter_mut().zip(grid.as_bytes()) {
        *slot = PERCEPTUAL[p as usize];
    }
    plane
}

/// (row, col) centroid weighted by ink value, `None` for a blank plane.
fn weighted_centroid(plane: &Plane) -> Option<(f64, f64)> {
    let mut total = 0.0;
    let (mut sr, mut sc) = (0.0, 0.0);
    for (i, &w) in plane.iter().enumerate() {
        total += w;
        sr += w * (i / GRID_SIZE) as f64;
        sc += w * (i % GRID_SIZE) as f64;
    }
    if total > 0.0 {
        Some((sr / total, sc / total))
    } else {
        None
    }
}

/// Translate by (dr, dc); pixels pushed off the grid are dropped.
fn shift(plane: &Plane, dr: isize, dc: isize) -> Plane {
    let mut out = [0.0; PIXEL_COUNT];
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let (nr, nc) = (r as isize + dr, c as isize + dc);
            if (0..GRID_SIZE as isize).contains(&nr) && (0..GRID_SIZE as isize).contains(&nc) {
                out[nr as usize * GRID_SIZE + nc as usize] = plane[r * GRID_SIZE + c];
            }
        }
    }
    out
}

/// Rotate clockwise `quarter_turns` times, then optionally mirror left-right.
fn orient(plane: &Plane, quarter_turns: usize, flip: bool) -> Plane {
    let mut out = [0.0; PIXEL_COUNT];
    for r in 0..GRID_SIZE {
        for c in 0..GRID_SIZE {
            let c_src = if flip { LAST - c } else { c };
            let (sr, sc) = match quarter_turns % 4 {
                0 => (r, c_src),
                1 => (LAST - c_src, r),
                2 => (LAST - r, LAST - c_src),
                _ => (c_src, LAST - r),
            };
            out[r * GRID_SIZE + c] = plane[sr * GRID_SIZE + sc];
        }
    }
    out
}

fn downsample(plane: &Plane) -> [f64; INVARIANT_DIMS] {
    let mut out = [0.0; INVARIANT_DIMS];
    for r in 0..HALF {
        for c in 0..HALF {
            let (r2, c2) = (r * 2, c * 2);
            let sum = plane[r2 * GRID_SIZE + c2]
                + plane[r2 * GRID_SIZE + c2 + 1]
                + plane[(r2 + 1) * GRID_SIZE + c2]
                + plane[(r2 + 1) * GRID_SIZE + c2 + 1];
            out[r * HALF + c] = sum / 4.0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::BACKGROUND;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    /// An asymmetric glyph away from the center.
    fn glyph() -> PixelGrid {
        PixelGrid::blank()
            .with_pixel(2, 3, 0)
            .with_pixel(3, 3, 0)
            .with_pixel(4, 3, 2)
            .with_pixel(4, 4, 2)
            .with_pixel(4, 5, 6)
            .with_pixel(2, 4, 0)
            .with_pixel(3, 5, 6)
            .with_pixel(2, 5, 0)
    }

    fn transform(grid: &PixelGrid, f: impl Fn(usize, usize) -> (usize, usize)) -> PixelGrid {
        let mut out = PixelGrid::blank();
        for r in 0..GRID_SIZE {
            for c in 0..GRID_SIZE {
                let p = grid.get(r, c);
                if p != BACKGROUND {
                    let (nr, nc) = f(r, c);
                    out = out.with_pixel(nr, nc, p);
                }
            }
        }
        out
    }

    #[test]
    fn blank_is_all_zero() {
        let v = extract(&PixelGrid::blank());
        assert_eq!(v.len(), INVARIANT_DIMS);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn translation_invariant() {
        let g = glyph();
        let moved = transform(&g, |r, c| (r + 6, c + 4));
        assert!(close(&extract(&g), &extract(&moved)));
    }

    #[test]
    fn rotation_and_reflection_invariant() {
        let g = glyph();
        let base = extract(&g);
        let rotated = transform(&g, |r, c| (c, LAST - r));
        let mirrored = transform(&g, |r, c| (r, LAST - c));
        let upside_down = transform(&g, |r, c| (LAST - r, LAST - c));
        assert!(close(&base, &extract(&rotated)), "90° rotation changed the vector");
        assert!(close(&base, &extract(&mirrored)), "mirror changed the vector");
        assert!(close(&base, &extract(&upside_down)), "180° rotation changed the vector");
    }

    #[test]
    fn different_shapes_differ() {
        let line = PixelGrid::blank()
            .with_pixel(7, 4, 0)
            .with_pixel(7, 5, 0)
            .with_pixel(7, 6, 0)
            .with_pixel(7, 7, 0);
        assert!(!close(&extract(&glyph()), &extract(&line)));
    }

    #[test]
    fn mass_is_preserved_when_centered() {
        // A single black pixel lands on the center after recentering.
        let v = extract(&PixelGrid::blank().with_pixel(0, 0, 0));
        let total: f64 = v.iter().sum();
        assert!((total - 0.25).abs() < 1e-12, "total ink {}", total);
    }
}
