use chrono::NaiveDate;
use ndarray::{s, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::curve::RateMatrix;
use crate::eigen::{EigenDecomposition, RetainedBasis};
use crate::error::{CurveModelError, Result};

/// Date-indexed matrix of component scores, one column per principal
/// component.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreMatrix {
    dates: Vec<NaiveDate>,
    components: Vec<String>,
    /// Shape: `(num_dates, num_components)`
    values: Array2<f64>,
}

impl ScoreMatrix {
    pub(crate) fn from_parts(
        dates: Vec<NaiveDate>,
        components: Vec<String>,
        values: Array2<f64>,
    ) -> Self {
        debug_assert_eq!(values.nrows(), dates.len());
        debug_assert_eq!(values.ncols(), components.len());
        Self {
            dates,
            components,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// The score series of one component, if present.
    pub fn column(&self, component: &str) -> Option<ArrayView1<'_, f64>> {
        self.components
            .iter()
            .position(|c| c == component)
            .map(|idx| self.values.column(idx))
    }

    /// Keeps only the first `k` component columns.
    pub fn truncated(&self, k: usize) -> Result<ScoreMatrix> {
        if k == 0 || k > self.num_components() {
            return Err(CurveModelError::DimensionMismatch(format!(
                "cannot truncate {} score columns to {k}",
                self.num_components()
            )));
        }
        Ok(ScoreMatrix {
            dates: self.dates.clone(),
            components: self.components[..k].to_vec(),
            values: self.values.slice(s![.., ..k]).to_owned(),
        })
    }

    /// Writes the scores as a date-indexed CSV table with ISO dates in the
    /// first column and component labels as headers.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> std::result::Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = vec!["date".to_string()];
        header.extend(self.components.iter().cloned());
        out.write_record(&header)?;
        for (date, row) in self.dates.iter().zip(self.values.rows()) {
            let mut record = vec![date.format("%Y-%m-%d").to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Which component columns a forward projection keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Columns {
    All,
    First(usize),
}

/// Projects observations into component-score space:
/// `scores = observations × eigenvectors[:, ..k]`.
///
/// Observations stay in raw rate units; no centering or standardization is
/// applied. Row order and dates are preserved.
pub fn project(
    rates: &RateMatrix,
    basis: &EigenDecomposition,
    columns: Columns,
) -> Result<ScoreMatrix> {
    let m = basis.dim();
    if rates.num_maturities() != m {
        return Err(CurveModelError::DimensionMismatch(format!(
            "rate matrix has {} maturities but the basis was fitted on {m}",
            rates.num_maturities()
        )));
    }
    let k = match columns {
        Columns::All => m,
        Columns::First(k) if k >= 1 && k <= m => k,
        Columns::First(k) => {
            return Err(CurveModelError::DimensionMismatch(format!(
                "cannot project onto {k} of {m} components"
            )))
        }
    };

    let scores = rates.values().dot(&basis.vectors().slice(s![.., ..k]));
    Ok(ScoreMatrix::from_parts(
        rates.dates().to_vec(),
        basis.components()[..k].to_vec(),
        scores,
    ))
}

/// Backtransforms a k-column score matrix into maturity units:
/// `rates = scores × inverse_basis[..k, :]`.
///
/// Lossy whenever `k < M`; exact (up to floating point) when `k == M`. Fails
/// with `DimensionMismatch` when the score columns do not match the retained
/// basis.
pub fn reconstruct(scores: &ScoreMatrix, basis: &RetainedBasis) -> Result<RateMatrix> {
    if scores.num_components() != basis.k() {
        return Err(CurveModelError::DimensionMismatch(format!(
            "{} score columns cannot be reconstructed through a rank-{} inverse basis",
            scores.num_components(),
            basis.k()
        )));
    }
    if scores.components() != basis.components() {
        return Err(CurveModelError::DimensionMismatch(format!(
            "score columns {:?} do not line up with retained components {:?}",
            scores.components(),
            basis.components()
        )));
    }
    let rates = scores.values().dot(basis.inverse_rows());
    RateMatrix::new(scores.dates().to_vec(), basis.maturities().to_vec(), rates)
}

/// Out-of-sample projection: applies a basis fitted on training data to a
/// disjoint dataset, truncating to `k` components, with no re-fitting.
///
/// The reconstruction error against `rates` measures how well the training
/// basis explains unseen data.
pub fn project_oos(
    rates: &RateMatrix,
    basis: &EigenDecomposition,
    k: usize,
) -> Result<RateMatrix> {
    let scores = project(rates, basis, Columns::First(k))?;
    reconstruct(&scores, &basis.retained(k)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::covariance;
    use crate::curve::Maturity;
    use crate::eigen::decompose;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use ndarray::array;

    fn sample_rates() -> RateMatrix {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        let values = array![
            [0.52, 1.48, 2.05],
            [0.61, 1.39, 2.21],
            [0.58, 1.76, 1.93],
            [0.93, 1.41, 2.38],
            [0.71, 1.62, 2.10],
            [0.66, 1.55, 2.27]
        ];
        let dates = (0..values.nrows() as u64)
            .map(|i| start + chrono::Days::new(i))
            .collect();
        let maturities = vec![
            Maturity::new("1Y", 1.0),
            Maturity::new("5Y", 5.0),
            Maturity::new("10Y", 10.0),
        ];
        RateMatrix::new(dates, maturities, values).unwrap()
    }

    #[test]
    fn full_rank_reconstruction_is_identity() {
        let rates = sample_rates();
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let scores = project(&rates, &basis, Columns::All).unwrap();
        let rebuilt = reconstruct(&scores, &basis.retained(3).unwrap()).unwrap();
        for (a, b) in rates.values().iter().zip(rebuilt.values().iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
        assert_eq!(rates.dates(), rebuilt.dates());
    }

    #[test]
    fn truncated_reconstruction_is_lossy_but_close() {
        let rates = sample_rates();
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let scores = project(&rates, &basis, Columns::First(2)).unwrap();
        assert_eq!(scores.num_components(), 2);
        let rebuilt = reconstruct(&scores, &basis.retained(2).unwrap()).unwrap();
        let max_err = rates
            .values()
            .iter()
            .zip(rebuilt.values().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        assert!(max_err.is_finite());
        assert!(max_err > 1e-10, "rank-2 reconstruction should not be exact");
        assert!(max_err < 1.0);
    }

    #[test]
    fn mismatched_rank_is_rejected() {
        let rates = sample_rates();
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let scores = project(&rates, &basis, Columns::First(2)).unwrap();
        let err = reconstruct(&scores, &basis.retained(3).unwrap()).unwrap_err();
        assert!(matches!(err, CurveModelError::DimensionMismatch(_)));
    }

    #[test]
    fn column_lookup_by_label() {
        let rates = sample_rates();
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let scores = project(&rates, &basis, Columns::All).unwrap();
        assert!(scores.column("PC_1").is_some());
        assert!(scores.column("PC_9").is_none());
    }
}
