//! Vector similarity and distance helpers.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Cosine similarity between two slices.
///
/// Returns 0.0 if either vector has zero magnitude.
/// Panics if slices have different lengths.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(
        a.len(),
        b.len(),
        "vector dimension mismatch: {} vs {}",
        a.len(),
        b.len()
    );

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }

    dot / denom
}

/// Squared Euclidean distance. Panics on length mismatch.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "vector dimension mismatch");
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Squared distances from `rows[i]` to every row (entry `i` is 0).
pub fn distance_row(rows: &[Vec<f64>], i: usize) -> Vec<f64> {
    rows.iter()
        .enumerate()
        .map(|(j, row)| {
            if i == j {
                0.0
            } else {
                squared_euclidean(&rows[i], row)
            }
        })
        .collect()
}

/// Full symmetric squared-distance matrix, row-major `n * n`.
#[cfg(not(feature = "parallel"))]
pub fn pairwise_squared_distances(rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows.len();
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_euclidean(&rows[i], &rows[j]);
            out[i * n + j] = d;
            out[j * n + i] = d;
        }
    }
    out
}

/// Full symmetric squared-distance matrix, row-major `n * n`.
#[cfg(feature = "parallel")]
pub fn pairwise_squared_distances(rows: &[Vec<f64>]) -> Vec<f64> {
    (0..rows.len())
        .into_par_iter()
        .flat_map_iter(|i| distance_row(rows, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!(
            (sim - 1.0).abs() < 1e-12,
            "identical vectors should have similarity ~1.0, got {}",
            sim
        );
    }

    #[test]
    fn orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(
            sim.abs() < 1e-12,
            "orthogonal vectors should have similarity ~0.0, got {}",
            sim
        );
    }

    #[test]
    fn zero_vector() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0]);
        assert_eq!(sim, 0.0, "zero vector should yield similarity 0.0");
    }

    #[test]
    #[should_panic(expected = "vector dimension mismatch")]
    fn dimension_mismatch() {
        cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn known_similarity() {
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0]);
        // cos(45°) = 1/√2
        assert!((sim - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn distance_matrix_is_symmetric_with_zero_diagonal() {
        let rows = vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 1.0]];
        let d = pairwise_squared_distances(&rows);
        assert_eq!(d.len(), 9);
        assert_eq!(d[1], 25.0);
        assert_eq!(d[3], 25.0);
        assert_eq!(d[2], 2.0);
        for i in 0..3 {
            assert_eq!(d[i * 3 + i], 0.0);
        }
    }

    #[test]
    fn distance_row_matches_matrix() {
        let rows = vec![vec![1.0], vec![4.0], vec![-2.0]];
        let matrix = pairwise_squared_distances(&rows);
        assert_eq!(distance_row(&rows, 1), matrix[3..6].to_vec());
    }
}
