use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::curve::{Maturity, RateMatrix};
use crate::error::{CurveModelError, Result};

/// Symmetric maturity × maturity covariance matrix with population
/// (divide-by-N) normalization, labelled on both axes in the column order of
/// the source rate matrix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    maturities: Vec<Maturity>,
    values: Array2<f64>,
}

impl CovarianceMatrix {
    /// Wraps a precomputed covariance matrix, checking squareness, label
    /// count, and symmetry up to floating-point tolerance.
    pub fn new(maturities: Vec<Maturity>, values: Array2<f64>) -> Result<Self> {
        let m = maturities.len();
        if values.nrows() != m || values.ncols() != m {
            return Err(CurveModelError::DimensionMismatch(format!(
                "covariance must be {m}x{m} to match {m} maturities, got {}x{}",
                values.nrows(),
                values.ncols()
            )));
        }
        let scale = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let tol = 1e-10 * scale.max(1.0);
        for i in 0..m {
            for j in (i + 1)..m {
                if (values[[i, j]] - values[[j, i]]).abs() > tol {
                    return Err(CurveModelError::NumericalAnomaly(format!(
                        "covariance entry ({i}, {j}) is not symmetric: {} vs {}",
                        values[[i, j]],
                        values[[j, i]]
                    )));
                }
            }
        }
        Ok(Self { maturities, values })
    }

    pub fn maturities(&self) -> &[Maturity] {
        &self.maturities
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.maturities.len()
    }
}

/// Computes the maturity covariance matrix of a rate series over its whole
/// time horizon, using the biased (divide-by-N) estimator so its scale is
/// consistent with the downstream eigen-decomposition.
///
/// Fails with `InsufficientData` when fewer than 2 observations are supplied.
pub fn covariance(rates: &RateMatrix) -> Result<CovarianceMatrix> {
    let n = rates.num_dates();
    if n < 2 {
        return Err(CurveModelError::InsufficientData(format!(
            "covariance requires at least 2 observations, got {n}"
        )));
    }

    let mut centered = rates.values().clone();
    let mean = centered
        .mean_axis(Axis(0))
        .ok_or_else(|| CurveModelError::InsufficientData("empty rate matrix".to_string()))?;
    centered -= &mean;

    let mut cov = centered.t().dot(&centered);
    cov /= n as f64;

    CovarianceMatrix::new(rates.maturities().to_vec(), cov)
}
