//! Place a new item next to its most similar neighbors without rerunning
//! the optimizer.

use crate::config::IncrementalConfig;
use crate::item::PixelGrid;
use crate::layout::{Position, PositionMap};
use crate::similarity::cosine_similarity;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::f64::consts::TAU;
use tracing::debug;

/// Position for a new item, or `None` when there is nothing to compare it
/// against (blank drawing, no placed items, or no cached vector of the same
/// length).
///
/// The result is the similarity²-weighted mean of the `config.neighbors`
/// most cosine-similar placed items, plus [`pixel_offset`].
pub fn project(
    pixels: &PixelGrid,
    vector: &[f64],
    positions: &PositionMap,
    vectors: &HashMap<String, Vec<f64>>,
    config: &IncrementalConfig,
) -> Option<Position> {
    if pixels.is_blank() {
        return None;
    }

    let mut scored: Vec<(&str, f64, Position)> = positions
        .iter()
        .filter_map(|(id, &pos)| {
            let cached = vectors.get(id)?;
            (cached.len() == vector.len()).then(|| (id.as_str(), cosine_similarity(vector, cached), pos))
        })
        .collect();

    if scored.is_empty() {
        return None;
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored.truncate(config.neighbors.max(1));

    let weights: Vec<f64> = scored.iter().map(|(_, sim, _)| sim.max(0.0).powi(2)).collect();
    let total: f64 = weights.iter().sum();

    let (mut x, mut y) = (0.0, 0.0);
    if total > 0.0 {
        for ((_, _, pos), w) in scored.iter().zip(&weights) {
            x += pos.x * w / total;
            y += pos.y * w / total;
        }
    } else {
        let n = scored.len() as f64;
        for (_, _, pos) in &scored {
            x += pos.x / n;
            y += pos.y / n;
        }
    }

    let [ox, oy] = pixel_offset(pixels, config.offset_scale);
    debug!(
        neighbors = scored.len(),
        best = scored[0].1,
        "projected new item incrementally"
    );
    Some(Position::new(x + ox, y + oy))
}

/// Deterministic offset derived from a SHA-256 digest of the pixels.
///
/// Direction comes from the first four digest bytes, radius from the next
/// four, scaled into `[scale/2, scale]`.
pub fn pixel_offset(pixels: &PixelGrid, scale: f64) -> [f64; 2] {
    let mut h = Sha256::new();
    h.update(pixels.as_bytes());
    let digest: [u8; 32] = h.finalize().into();

    let angle = unit(&digest[0..4]) * TAU;
    let radius = (0.5 + 0.5 * unit(&digest[4..8])) * scale;
    [angle.cos() * radius, angle.sin() * radius]
}

/// Four bytes as a fraction in `[0, 1]`.
fn unit(bytes: &[u8]) -> f64 {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    u32::from_be_bytes(word) as f64 / u32::MAX as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureWeights;
    use crate::features::{extract, FeatureVariant};
    use pretty_assertions::assert_eq;

    fn dot(row: usize, col: usize, color: u8) -> PixelGrid {
        PixelGrid::blank().with_pixel(row, col, color)
    }

    fn setup(entries: &[(&str, Position, Vec<f64>)]) -> (PositionMap, HashMap<String, Vec<f64>>) {
        let positions = entries
            .iter()
            .map(|(id, pos, _)| (id.to_string(), *pos))
            .collect();
        let vectors = entries
            .iter()
            .map(|(id, _, v)| (id.to_string(), v.clone()))
            .collect();
        (positions, vectors)
    }

    fn no_offset() -> IncrementalConfig {
        IncrementalConfig {
            offset_scale: 0.0,
            ..IncrementalConfig::default()
        }
    }

    #[test]
    fn blank_drawing_has_no_position() {
        let (positions, vectors) = setup(&[("a", Position::new(1.0, 1.0), vec![1.0, 0.0])]);
        let got = project(
            &PixelGrid::blank(),
            &[1.0, 0.0],
            &positions,
            &vectors,
            &IncrementalConfig::default(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn empty_map_has_no_position() {
        let got = project(
            &dot(0, 0, 0),
            &[1.0, 0.0],
            &PositionMap::new(),
            &HashMap::new(),
            &IncrementalConfig::default(),
        );
        assert_eq!(got, None);
    }

    #[test]
    fn mismatched_vectors_are_ignored() {
        let (positions, vectors) = setup(&[("a", Position::new(1.0, 1.0), vec![1.0, 0.0, 0.0])]);
        let got = project(&dot(0, 0, 0), &[1.0, 0.0], &positions, &vectors, &no_offset());
        assert_eq!(got, None);
    }

    #[test]
    fn weighted_toward_most_similar() {
        let (positions, vectors) = setup(&[
            ("same", Position::new(100.0, 0.0), vec![1.0, 0.0]),
            ("close", Position::new(0.0, 100.0), vec![1.0, 1.0]),
            ("opposite", Position::new(-500.0, -500.0), vec![-1.0, 0.0]),
        ]);
        let got = project(&dot(3, 3, 2), &[1.0, 0.0], &positions, &vectors, &no_offset()).unwrap();

        // weights 1.0 and 0.5; the opposite vector has negative similarity
        assert!((got.x - 100.0 / 1.5).abs() < 1e-9, "x = {}", got.x);
        assert!((got.y - 50.0 / 1.5).abs() < 1e-9, "y = {}", got.y);
    }

    #[test]
    fn only_top_neighbors_count() {
        let config = IncrementalConfig {
            neighbors: 1,
            ..no_offset()
        };
        let (positions, vectors) = setup(&[
            ("best", Position::new(10.0, 10.0), vec![1.0, 0.0]),
            ("second", Position::new(-10.0, -10.0), vec![1.0, 0.2]),
        ]);
        let got = project(&dot(0, 0, 0), &[1.0, 0.0], &positions, &vectors, &config).unwrap();
        assert_eq!(got, Position::new(10.0, 10.0));
    }

    #[test]
    fn zero_similarity_falls_back_to_plain_mean() {
        let (positions, vectors) = setup(&[
            ("a", Position::new(10.0, 0.0), vec![0.0, 1.0]),
            ("b", Position::new(-10.0, 4.0), vec![0.0, 2.0]),
        ]);
        let got = project(&dot(0, 0, 0), &[1.0, 0.0], &positions, &vectors, &no_offset()).unwrap();
        assert_eq!(got, Position::new(0.0, 2.0));
    }

    #[test]
    fn different_pixels_get_different_positions() {
        let weights = FeatureWeights::default();
        let anchor = dot(8, 8, 0);
        let (positions, vectors) = setup(&[(
            "anchor",
            Position::new(0.0, 0.0),
            extract(&anchor, FeatureVariant::Enhanced, &weights),
        )]);
        let config = IncrementalConfig::default();

        let a = dot(2, 2, 0);
        let b = dot(12, 5, 6);
        let pa = project(&a, &extract(&a, FeatureVariant::Enhanced, &weights), &positions, &vectors, &config)
            .unwrap();
        let pb = project(&b, &extract(&b, FeatureVariant::Enhanced, &weights), &positions, &vectors, &config)
            .unwrap();
        assert_ne!(pa, pb);
    }

    #[test]
    fn offset_is_deterministic_and_bounded() {
        let grid = dot(4, 9, 3);
        let first = pixel_offset(&grid, 6.0);
        assert_eq!(first, pixel_offset(&grid, 6.0));
        let radius = (first[0].powi(2) + first[1].powi(2)).sqrt();
        assert!((3.0 - 1e-9..=6.0 + 1e-9).contains(&radius), "radius {}", radius);
    }
}
