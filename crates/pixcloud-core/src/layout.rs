//! World-space layout: remap raw embeddings and relax collisions.

use crate::config::LayoutConfig;
use crate::item::Item;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use tracing::debug;

/// Seed for the coincident-point jiggle, so `place` is deterministic.
const JIGGLE_SEED: u64 = 0x7e1a;

/// Distances within this of the minimum spacing count as satisfied.
const SPACING_TOLERANCE: f64 = 1e-6;

/// World-space coordinates of one item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Item id to world position. The only artifact handed to renderers.
pub type PositionMap = HashMap<String, Position>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Both axes follow the embedding
    #[default]
    Cluster,
    /// x follows creation time, y follows the embedding's second axis
    Timeline,
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cluster" => Ok(LayoutMode::Cluster),
            "timeline" => Ok(LayoutMode::Timeline),
            other => Err(format!(
                "unknown layout mode '{}', expected cluster or timeline",
                other
            )),
        }
    }
}

/// Side length of the square the layout occupies for `n` items.
pub fn spread(n: usize, config: &LayoutConfig) -> f64 {
    ((n as f64).sqrt() * config.base_spacing * config.density_multiplier).max(config.min_spread)
}

/// Map an embedding (index-aligned with `items`) into world space and relax
/// overlaps.
///
/// Extra items or embedding rows beyond the shorter of the two are ignored.
/// `now` is the right edge of the timeline.
pub fn place(
    items: &[Item],
    embedding: &[[f64; 2]],
    mode: LayoutMode,
    config: &LayoutConfig,
    now: DateTime<Utc>,
) -> PositionMap {
    let n = items.len().min(embedding.len());
    let (items, embedding) = (&items[..n], &embedding[..n]);
    let spread = spread(n, config);

    let mut points: Vec<[f64; 2]> = match mode {
        LayoutMode::Cluster => {
            let xs = remap_axis(embedding.iter().map(|p| p[0]), spread);
            let ys = remap_axis(embedding.iter().map(|p| p[1]), spread);
            xs.into_iter().zip(ys).map(|(x, y)| [x, y]).collect()
        }
        LayoutMode::Timeline => {
            let xs = timeline_axis(items, now, spread);
            let ys = remap_axis(
                embedding.iter().map(|p| p[1]),
                spread * config.timeline_y_factor,
            );
            xs.into_iter().zip(ys).map(|(x, y)| [x, y]).collect()
        }
    };

    let mut rng = StdRng::seed_from_u64(JIGGLE_SEED);
    let stats = relax(&mut points, config.min_spacing, config.relax_passes, &mut rng);
    debug!(
        items = n,
        spread,
        passes = stats.passes_run,
        converged = stats.converged,
        "layout placed"
    );

    items
        .iter()
        .zip(points)
        .map(|(item, [x, y])| (item.id.clone(), Position { x, y }))
        .collect()
}

/// Linear remap of values onto `[-extent/2, extent/2]`; a flat axis maps to 0.
fn remap_axis(values: impl Iterator<Item = f64> + Clone, extent: f64) -> Vec<f64> {
    let (min, max) = values
        .clone()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    values
        .map(|v| {
            if range > 0.0 && range.is_finite() {
                ((v - min) / range - 0.5) * extent
            } else {
                0.0
            }
        })
        .collect()
}

/// Oldest item at the left edge, `now` at the right edge.
fn timeline_axis(items: &[Item], now: DateTime<Utc>, extent: f64) -> Vec<f64> {
    let Some(oldest) = items.iter().map(|item| item.created_at).min() else {
        return Vec::new();
    };
    let span = (now - oldest).num_milliseconds() as f64;
    items
        .iter()
        .map(|item| {
            if span <= 0.0 {
                return 0.0;
            }
            let t = ((item.created_at - oldest).num_milliseconds() as f64 / span).clamp(0.0, 1.0);
            (t - 0.5) * extent
        })
        .collect()
}

/// Outcome of a relaxation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaxStats {
    pub passes_run: usize,
    /// A pass completed without moving anything
    pub converged: bool,
}

/// Push apart points closer than `min_spacing`, for at most `max_passes`.
///
/// Each pass buckets points into a grid of `min_spacing` cells and compares
/// every point only with points in the surrounding 3x3 cells. Overlapping
/// pairs move apart symmetrically along the line between them until they are
/// exactly `min_spacing` apart; coincident pairs pick a random direction.
/// Stops early after a pass that moves nothing.
pub fn relax<R: Rng + ?Sized>(
    points: &mut [[f64; 2]],
    min_spacing: f64,
    max_passes: usize,
    rng: &mut R,
) -> RelaxStats {
    let mut stats = RelaxStats {
        passes_run: 0,
        converged: false,
    };
    if points.len() < 2 || !(min_spacing > 0.0) {
        stats.converged = true;
        return stats;
    }

    for _ in 0..max_passes {
        stats.passes_run += 1;
        let grid = bucket(points, min_spacing);
        let mut moved = false;

        for i in 0..points.len() {
            let (cx, cy) = cell_of(points[i], min_spacing);
            // cells saturate at the i64 range for tiny spacings
            for gx in cx.saturating_sub(1)..=cx.saturating_add(1) {
                for gy in cy.saturating_sub(1)..=cy.saturating_add(1) {
                    let Some(members) = grid.get(&(gx, gy)) else {
                        continue;
                    };
                    for &j in members {
                        if j <= i {
                            continue;
                        }
                        moved |= separate(points, i, j, min_spacing, rng);
                    }
                }
            }
        }

        if !moved {
            stats.converged = true;
            break;
        }
    }

    stats
}

fn cell_of(p: [f64; 2], cell: f64) -> (i64, i64) {
    ((p[0] / cell).floor() as i64, (p[1] / cell).floor() as i64)
}

fn bucket(points: &[[f64; 2]], cell: f64) -> AHashMap<(i64, i64), Vec<usize>> {
    let mut grid: AHashMap<(i64, i64), Vec<usize>> = AHashMap::new();
    for (i, &p) in points.iter().enumerate() {
        grid.entry(cell_of(p, cell)).or_default().push(i);
    }
    grid
}

/// Move `i` and `j` apart if they overlap. Returns whether anything moved.
fn separate<R: Rng + ?Sized>(
    points: &mut [[f64; 2]],
    i: usize,
    j: usize,
    min_spacing: f64,
    rng: &mut R,
) -> bool {
    let mut dx = points[j][0] - points[i][0];
    let mut dy = points[j][1] - points[i][1];
    let mut dist = (dx * dx + dy * dy).sqrt();

    if dist >= min_spacing - SPACING_TOLERANCE {
        return false;
    }

    if dist == 0.0 {
        let angle = rng.gen::<f64>() * TAU;
        dx = angle.cos();
        dy = angle.sin();
        dist = 1.0;
    }

    let push = (min_spacing - dist) / 2.0 / dist;
    points[i][0] -= dx * push;
    points[i][1] -= dy * push;
    points[j][0] += dx * push;
    points[j][1] += dy * push;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::PixelGrid;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn items(n: usize, start: DateTime<Utc>) -> Vec<Item> {
        (0..n)
            .map(|i| {
                Item::new(
                    format!("item-{}", i),
                    PixelGrid::blank(),
                    start + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn min_pairwise(points: &[[f64; 2]]) -> f64 {
        let mut best = f64::INFINITY;
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                let d = ((points[i][0] - points[j][0]).powi(2)
                    + (points[i][1] - points[j][1]).powi(2))
                .sqrt();
                best = best.min(d);
            }
        }
        best
    }

    #[test]
    fn spread_has_a_floor() {
        let config = LayoutConfig::default();
        assert_eq!(spread(4, &config), 400.0);
        assert_eq!(spread(400, &config), 800.0);
    }

    #[test]
    fn cluster_mode_fills_the_spread_square() {
        let config = LayoutConfig::default();
        let embedding = vec![[0.0, 0.0], [10.0, 5.0], [5.0, 10.0]];
        let placed = place(&items(3, start()), &embedding, LayoutMode::Cluster, &config, start());

        assert_eq!(placed["item-0"], Position::new(-200.0, -200.0));
        assert_eq!(placed["item-1"], Position::new(200.0, 0.0));
        assert_eq!(placed["item-2"], Position::new(0.0, 200.0));
    }

    #[test]
    fn timeline_mode_orders_by_creation_time() {
        let config = LayoutConfig::default();
        let set = items(3, start());
        let now = start() + Duration::minutes(4);
        let embedding = vec![[9.0, 0.0], [-9.0, 1.0], [0.0, 2.0]];
        let placed = place(&set, &embedding, LayoutMode::Timeline, &config, now);

        assert_eq!(placed["item-0"].x, -200.0);
        assert_eq!(placed["item-1"].x, -100.0);
        assert_eq!(placed["item-2"].x, 0.0);
        // y uses only the second component, over 0.6 of the spread
        assert_eq!(placed["item-0"].y, -120.0);
        assert_eq!(placed["item-2"].y, 120.0);
    }

    #[test]
    fn timeline_with_zero_span_is_centered() {
        let config = LayoutConfig::default();
        let set = items(1, start());
        let placed = place(&set, &[[1.0, 1.0]], LayoutMode::Timeline, &config, start());
        assert_eq!(placed["item-0"], Position::new(0.0, 0.0));
    }

    #[test]
    fn coincident_points_are_separated() {
        let config = LayoutConfig::default();
        let embedding = vec![[1.0, 1.0]; 6];
        let placed = place(&items(6, start()), &embedding, LayoutMode::Cluster, &config, start());
        let points: Vec<[f64; 2]> = placed.values().map(|p| [p.x, p.y]).collect();
        assert!(min_pairwise(&points) > 0.0, "points still coincide: {:?}", points);
    }

    #[test]
    fn relax_enforces_spacing_for_a_simple_overlap() {
        let mut points = vec![[0.0, 0.0], [10.0, 0.0], [100.0, 100.0]];
        let mut rng = StdRng::seed_from_u64(1);
        let stats = relax(&mut points, 36.0, 8, &mut rng);

        assert!(stats.converged);
        assert_eq!(stats.passes_run, 2);
        assert_eq!(points[0], [-13.0, 0.0]);
        assert_eq!(points[1], [23.0, 0.0]);
        assert_eq!(points[2], [100.0, 100.0]);
    }

    #[test]
    fn relax_is_idempotent_at_convergence() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut points: Vec<[f64; 2]> = (0..20)
            .map(|_| [rng.gen::<f64>() * 300.0, rng.gen::<f64>() * 300.0])
            .collect();
        let stats = relax(&mut points, 36.0, 1_000, &mut rng);
        assert!(stats.converged, "did not converge in {} passes", stats.passes_run);

        let before = points.clone();
        let again = relax(&mut points, 36.0, 8, &mut rng);
        assert_eq!(points, before);
        assert_eq!(again.passes_run, 1);
        assert!(again.converged);
    }

    #[test]
    fn relax_with_zero_passes_is_a_no_op() {
        let mut points = vec![[0.0, 0.0], [1.0, 0.0]];
        let stats = relax(&mut points, 36.0, 0, &mut StdRng::seed_from_u64(0));
        assert_eq!(stats.passes_run, 0);
        assert!(!stats.converged);
        assert_eq!(points, vec![[0.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn relax_handles_cells_at_the_edge_of_the_grid() {
        let original = vec![[1e10, 0.0], [-1e10, 0.0], [1e10, 1e-301]];
        let mut points = original.clone();
        let stats = relax(&mut points, 1e-300, 4, &mut StdRng::seed_from_u64(3));
        assert!(stats.passes_run >= 1);
        assert!(points.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(points[1], original[1]);
    }

    #[test]
    fn layout_mode_parses() {
        assert_eq!("Timeline".parse::<LayoutMode>(), Ok(LayoutMode::Timeline));
        assert!("spiral".parse::<LayoutMode>().is_err());
    }
}
