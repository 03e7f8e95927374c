use log::warn;
use ndarray::{s, Array1, Array2, Axis};
use ndarray_linalg::{Eig, Inverse};
use serde::{Deserialize, Serialize};

use crate::covariance::CovarianceMatrix;
use crate::curve::Maturity;
use crate::error::{CurveModelError, Result};

/// Relative tolerance for treating an imaginary eigen-solver residue as
/// negligible. The covariance matrix is real-symmetric, so anything above
/// this is a computation anomaly, not a valid result.
const IMAGINARY_RESIDUE_TOL: f64 = 1e-8;

/// Relative gap below which two eigenvalues are considered near-duplicates.
const DUPLICATE_EIGENVALUE_TOL: f64 = 1e-9;

/// The orthogonal component basis of a maturity covariance matrix.
///
/// Components are labelled `PC_1..PC_M` in descending-eigenvalue order
/// rather than the solver's native output order, so that truncating to the
/// first `k` columns always retains the largest-variance directions.
///
/// The inverse of the eigenvector matrix is computed eagerly; it is the
/// backtransformation matrix for mapping component scores back into rate
/// units.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EigenDecomposition {
    components: Vec<String>,
    maturities: Vec<Maturity>,
    /// Eigenvalues in component order. Shape: `(M,)`
    eigenvalues: Array1<f64>,
    /// Per-component share of total variance. Shape: `(M,)`
    relative: Array1<f64>,
    /// Running cumulative sum of `relative` in component order. Shape: `(M,)`
    cumulative: Array1<f64>,
    /// Eigenvectors as columns, one per component. Shape: `(M, M)`
    vectors: Array2<f64>,
    /// Inverse of `vectors`; rows correspond to components. Shape: `(M, M)`
    inverse: Array2<f64>,
}

/// Computes the eigen-decomposition of a covariance matrix.
///
/// Uses the general (non-symmetric) eigen-solver and retains only the real
/// part of eigenvalues and eigenvectors; a non-negligible imaginary residue
/// fails with `NumericalAnomaly`. A non-invertible eigenvector matrix fails
/// with `SingularBasis`; near-duplicate eigenvalues only emit a warning,
/// since the basis stays invertible but the component directions within the
/// duplicated subspace are not uniquely determined.
pub fn decompose(cov: &CovarianceMatrix) -> Result<EigenDecomposition> {
    let (complex_values, complex_vectors) = cov
        .values()
        .eig()
        .map_err(|e| CurveModelError::NumericalAnomaly(format!("eigen-solver failed: {e}")))?;

    let scale = complex_values
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.re.abs()));
    let imag_tol = IMAGINARY_RESIDUE_TOL * scale.max(1.0);

    let worst_imag = complex_values
        .iter()
        .map(|v| v.im.abs())
        .chain(complex_vectors.iter().map(|v| v.im.abs()))
        .fold(0.0f64, f64::max);
    if worst_imag > imag_tol {
        return Err(CurveModelError::NumericalAnomaly(format!(
            "eigen-decomposition of a real-symmetric matrix returned imaginary residue {worst_imag:e} (tolerance {imag_tol:e})"
        )));
    }

    let raw_values = complex_values.mapv(|v| v.re);
    let raw_vectors = complex_vectors.mapv(|v| v.re);

    // Descending-eigenvalue order; ties keep solver order.
    let mut order: Vec<usize> = (0..raw_values.len()).collect();
    order.sort_by(|&a, &b| {
        raw_values[b]
            .partial_cmp(&raw_values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues = Array1::from_iter(order.iter().map(|&i| raw_values[i]));
    let vectors = raw_vectors.select(Axis(1), &order);

    let gap_tol = DUPLICATE_EIGENVALUE_TOL * scale.max(1.0);
    for pair in eigenvalues.windows(2) {
        if (pair[0] - pair[1]).abs() <= gap_tol {
            warn!(
                "near-duplicate eigenvalues {} and {}; component directions in this subspace may be unstable",
                pair[0], pair[1]
            );
        }
    }

    let total: f64 = eigenvalues.sum();
    if total.abs() <= f64::EPSILON {
        return Err(CurveModelError::InsufficientData(
            "total variance is zero; the rate series is constant".to_string(),
        ));
    }
    let relative = eigenvalues.mapv(|v| v / total);
    let mut running = 0.0;
    let cumulative = relative.mapv(|v| {
        running += v;
        running
    });

    let inverse = vectors.inv().map_err(|_| CurveModelError::SingularBasis)?;

    let components = (1..=eigenvalues.len()).map(|i| format!("PC_{i}")).collect();

    Ok(EigenDecomposition {
        components,
        maturities: cov.maturities().to_vec(),
        eigenvalues,
        relative,
        cumulative,
        vectors,
        inverse,
    })
}

impl EigenDecomposition {
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn maturities(&self) -> &[Maturity] {
        &self.maturities
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn relative_variance(&self) -> &Array1<f64> {
        &self.relative
    }

    pub fn cumulative_variance(&self) -> &Array1<f64> {
        &self.cumulative
    }

    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    pub fn inverse(&self) -> &Array2<f64> {
        &self.inverse
    }

    /// Number of maturities / components (`M`).
    pub fn dim(&self) -> usize {
        self.eigenvalues.len()
    }

    /// Derives the rank-`k` view of this basis: the first `k` eigenvector
    /// columns and the first `k` rows of the inverse. Recomputed on demand;
    /// never cached or mutated independently of the source basis.
    pub fn retained(&self, k: usize) -> Result<RetainedBasis> {
        let m = self.dim();
        if k == 0 || k > m {
            return Err(CurveModelError::DimensionMismatch(format!(
                "retained component count must be in 1..={m}, got {k}"
            )));
        }
        Ok(RetainedBasis {
            components: self.components[..k].to_vec(),
            maturities: self.maturities.clone(),
            vectors: self.vectors.slice(s![.., ..k]).to_owned(),
            inverse_rows: self.inverse.slice(s![..k, ..]).to_owned(),
        })
    }
}

/// The first `k` columns of a component basis and the matching first `k`
/// rows of its inverse.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetainedBasis {
    components: Vec<String>,
    maturities: Vec<Maturity>,
    /// Shape: `(M, k)`
    vectors: Array2<f64>,
    /// Shape: `(k, M)`
    inverse_rows: Array2<f64>,
}

impl RetainedBasis {
    pub fn k(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn maturities(&self) -> &[Maturity] {
        &self.maturities
    }

    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    /// The k × M backtransformation matrix mapping retained scores into
    /// maturity units.
    pub fn inverse_rows(&self) -> &Array2<f64> {
        &self.inverse_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn cov(values: Array2<f64>) -> CovarianceMatrix {
        let maturities = (0..values.ncols())
            .map(|i| Maturity::from_years((i + 1) as f64))
            .collect();
        CovarianceMatrix::new(maturities, values).unwrap()
    }

    #[test]
    fn diagonal_covariance_sorted_descending() {
        let basis = decompose(&cov(array![[1.0, 0.0], [0.0, 4.0]])).unwrap();
        assert_abs_diff_eq!(basis.eigenvalues()[0], 4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(basis.eigenvalues()[1], 1.0, epsilon = 1e-10);
        assert_eq!(basis.components(), &["PC_1", "PC_2"]);
        // PC_1 is the second axis for this covariance.
        assert_abs_diff_eq!(basis.vectors()[[1, 0]].abs(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn variance_shares_and_cumulative() {
        let basis = decompose(&cov(array![[1.0, 0.0], [0.0, 4.0]])).unwrap();
        assert_abs_diff_eq!(basis.relative_variance()[0], 0.8, epsilon = 1e-10);
        assert_abs_diff_eq!(basis.relative_variance()[1], 0.2, epsilon = 1e-10);
        assert_abs_diff_eq!(basis.cumulative_variance()[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn off_diagonal_eigenvalues() {
        let basis = decompose(&cov(array![[2.0, 1.0], [1.0, 2.0]])).unwrap();
        assert_abs_diff_eq!(basis.eigenvalues()[0], 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(basis.eigenvalues()[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn inverse_reverses_vectors() {
        let basis = decompose(&cov(array![
            [2.0, 0.5, 0.1],
            [0.5, 1.5, 0.3],
            [0.1, 0.3, 1.0]
        ]))
        .unwrap();
        let identity = basis.inverse().dot(basis.vectors());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(identity[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn retained_bounds() {
        let basis = decompose(&cov(array![[2.0, 1.0], [1.0, 2.0]])).unwrap();
        assert!(basis.retained(0).is_err());
        assert!(basis.retained(3).is_err());
        let retained = basis.retained(1).unwrap();
        assert_eq!(retained.k(), 1);
        assert_eq!(retained.vectors().dim(), (2, 1));
        assert_eq!(retained.inverse_rows().dim(), (1, 2));
    }
}
