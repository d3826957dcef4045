//! Least squares for Anderson mixing.
//!
//! The problems have one unknown per retained residual difference (at most a
//! handful), so the normal equations are formed explicitly and factored with
//! Cholesky. The Gram matrix is symmetric positive semi-definite; a pivot that
//! collapses relative to its diagonal entry means the residual differences
//! are (nearly) linearly dependent.
use anyhow::{Result, bail, ensure};

use crate::vecutils::dot;

/// A Cholesky pivot below this fraction of its original diagonal entry
/// marks the Gram matrix as rank deficient.
const RANK_TOLERANCE: f64 = 1e-12;

/// Lower triangular Cholesky factor of the Gram matrix of `columns`.
fn gram_cholesky(columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let m = columns.len();
    let mut l = vec![vec![0.0; m]; m];
    for j in 0..m {
        let diag = dot(&columns[j], &columns[j]);
        ensure!(diag > 0.0, "column {j} is zero");
        let pivot = diag - l[j][..j].iter().map(|v| v * v).sum::<f64>();
        if !(pivot > RANK_TOLERANCE * diag) {
            bail!("column {j} is linearly dependent on the previous ones");
        }
        l[j][j] = pivot.sqrt();
        for i in (j + 1)..m {
            let gij = dot(&columns[i], &columns[j]);
            let known: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            l[i][j] = (gij - known) / l[j][j];
        }
    }
    Ok(l)
}

/// Coefficients `g` minimizing `|sum_j g[j] * columns[j] - b|`.
pub fn least_squares(columns: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>> {
    for (j, c) in columns.iter().enumerate() {
        ensure!(
            c.len() == b.len(),
            "column {j} has {} entries, right-hand side has {}",
            c.len(),
            b.len()
        );
    }
    let l = gram_cholesky(columns)?;
    let m = columns.len();

    // L y = C^T b
    let mut y = vec![0.0; m];
    for i in 0..m {
        let known: f64 = (0..i).map(|k| l[i][k] * y[k]).sum();
        y[i] = (dot(&columns[i], b) - known) / l[i][i];
    }
    // L^T g = y
    let mut g = vec![0.0; m];
    for i in (0..m).rev() {
        let known: f64 = ((i + 1)..m).map(|k| l[k][i] * g[k]).sum();
        g[i] = (y[i] - known) / l[i][i];
    }
    ensure!(g.iter().all(|v| v.is_finite()), "non-finite coefficients");
    Ok(g)
}
