//! End-to-end behavior of the feature, reduction and layout pipeline.

use pixcloud_core::features::enhanced::{HISTOGRAM, ROTATIONAL};
use pixcloud_core::features::{extract, FeatureVariant};
use pixcloud_core::reduce::{self, Progress, RANDOM_HALF_EXTENT};
use pixcloud_core::{FeatureWeights, PixelGrid, ReduceConfig, TsneConfig, UmapConfig};

fn vectors(grids: &[PixelGrid], variant: FeatureVariant) -> Vec<Vec<f64>> {
    let weights = FeatureWeights::default();
    grids.iter().map(|g| extract(g, variant, &weights)).collect()
}

/// Three visually distinct families of drawings, `per` of each.
fn families(per: usize) -> Vec<PixelGrid> {
    let mut grids = Vec::new();
    // red squares growing from the top-left corner
    for i in 0..per {
        let side = 3 + i;
        let mut g = PixelGrid::blank();
        for r in 0..side {
            for c in 0..side {
                g = g.with_pixel(r, c, 2);
            }
        }
        grids.push(g);
    }
    // blue horizontal stripes
    for i in 0..per {
        let mut g = PixelGrid::blank();
        for r in (0..16).step_by(2).take(2 + i % 7) {
            for c in 0..16 {
                g = g.with_pixel(r, c, 6);
            }
        }
        grids.push(g);
    }
    // green vertical stripes with a black dot
    for i in 0..per {
        let mut g = PixelGrid::blank().with_pixel(15, 15 - i, 0);
        for c in (1..16).step_by(3).take(2 + i % 4) {
            for r in 0..16 {
                g = g.with_pixel(r, c, 5);
            }
        }
        grids.push(g);
    }
    grids
}

fn pairwise(embedding: &[[f64; 2]]) -> Vec<f64> {
    let mut out = Vec::new();
    for i in 0..embedding.len() {
        for j in (i + 1)..embedding.len() {
            let dx = embedding[i][0] - embedding[j][0];
            let dy = embedding[i][1] - embedding[j][1];
            out.push((dx * dx + dy * dy).sqrt());
        }
    }
    out
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let ma = a.iter().sum::<f64>() / n;
    let mb = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    cov / (va.sqrt() * vb.sqrt())
}

#[test]
fn identical_images_take_the_trivial_umap_path() {
    let grid = PixelGrid::blank().with_pixel(4, 4, 0).with_pixel(5, 5, 3);
    let data = vectors(&vec![grid; 5], FeatureVariant::Enhanced);
    let mut progress: Vec<Progress> = Vec::new();

    let out = reduce::reduce(&ReduceConfig::Umap(UmapConfig::default()), &data, &mut progress);

    assert_eq!(out.iterations, 0);
    assert!(!out.fallback);
    assert!(progress.is_empty(), "trivial path reported progress: {:?}", progress);
    assert_eq!(out.embedding.len(), 5);
    assert!(out
        .embedding
        .iter()
        .all(|p| p[0].abs() <= RANDOM_HALF_EXTENT && p[1].abs() <= RANDOM_HALF_EXTENT));
}

#[test]
fn black_and_white_pair_takes_the_fixed_tsne_layout() {
    let data = vectors(
        &[PixelGrid::filled(0), PixelGrid::blank()],
        FeatureVariant::Invariant,
    );
    let out = reduce::reduce(&ReduceConfig::Tsne(TsneConfig::default()), &data, &mut ());
    assert_eq!(out.embedding, vec![[-5.0, 0.0], [5.0, 0.0]]);
}

#[test]
fn half_turn_symmetric_image_scores_one() {
    // an S-like shape: (r, c) and (15 - r, 15 - c) always share a color
    let mut grid = PixelGrid::blank();
    for (r, c, color) in [(2, 3, 0), (2, 4, 0), (5, 9, 4), (7, 1, 6), (0, 15, 2)] {
        grid = grid
            .with_pixel(r, c, color)
            .with_pixel(15 - r, 15 - c, color);
    }
    let v = extract(&grid, FeatureVariant::Enhanced, &FeatureWeights::default());
    assert_eq!(v[ROTATIONAL], 1.0);
}

#[test]
fn histogram_sums_to_one_for_real_drawings() {
    for grid in families(4) {
        let v = extract(&grid, FeatureVariant::Enhanced, &FeatureWeights::default());
        let sum: f64 = v[HISTOGRAM].iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "histogram sums to {}", sum);
    }
}

#[test]
fn umap_distance_structure_is_stable_across_seeds() {
    let data = vectors(&families(8), FeatureVariant::Enhanced);
    let run = |seed| {
        let config = ReduceConfig::Umap(UmapConfig {
            n_neighbors: 5,
            seed: Some(seed),
            ..UmapConfig::default()
        });
        reduce::reduce(&config, &data, &mut ())
    };

    let first = run(1);
    let second = run(2);
    assert!(!first.fallback && !second.fallback);
    assert_eq!(first.iterations, 200);

    let r = pearson(&pairwise(&first.embedding), &pairwise(&second.embedding));
    assert!(r > 0.5, "pairwise distance correlation too low: {}", r);
}
