use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{CurveModelError, Result};

/// A point on the yield curve, identified by a label (e.g. `"3M"`, `"10Y"`)
/// and its numeric year-equivalent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Maturity {
    label: String,
    years: f64,
}

impl Maturity {
    pub fn new(label: impl Into<String>, years: f64) -> Self {
        Self {
            label: label.into(),
            years,
        }
    }

    /// Builds a maturity from its year-equivalent with a conventional label:
    /// whole years render as `"2Y"`, everything else in months (`0.25` ->
    /// `"3M"`, `1.5` -> `"18M"`).
    pub fn from_years(years: f64) -> Self {
        let months = (years * 12.0).round() as i64;
        let label = if months % 12 == 0 && months >= 12 {
            format!("{}Y", months / 12)
        } else {
            format!("{}M", months)
        };
        Self { label, years }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn years(&self) -> f64 {
        self.years
    }
}

/// An ordered-by-date series of yield-curve observations.
///
/// Rows are dates, columns are maturities; `values` has shape
/// `(num_dates, num_maturities)`. The constructor enforces the structural
/// invariants (every row complete, dates strictly increasing, no duplicate
/// dates); the crate performs no validation of raw formats beyond that.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateMatrix {
    dates: Vec<NaiveDate>,
    maturities: Vec<Maturity>,
    values: Array2<f64>,
}

impl RateMatrix {
    pub fn new(
        dates: Vec<NaiveDate>,
        maturities: Vec<Maturity>,
        values: Array2<f64>,
    ) -> Result<Self> {
        if maturities.is_empty() {
            return Err(CurveModelError::DimensionMismatch(
                "rate matrix needs at least one maturity column".to_string(),
            ));
        }
        if values.nrows() != dates.len() || values.ncols() != maturities.len() {
            return Err(CurveModelError::DimensionMismatch(format!(
                "rate values have shape ({}, {}) but {} dates and {} maturities were given",
                values.nrows(),
                values.ncols(),
                dates.len(),
                maturities.len()
            )));
        }
        if dates.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CurveModelError::DimensionMismatch(
                "dates must be strictly increasing with no duplicates".to_string(),
            ));
        }
        Ok(Self {
            dates,
            maturities,
            values,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn maturities(&self) -> &[Maturity] {
        &self.maturities
    }

    /// Maturity labels in column order.
    pub fn labels(&self) -> Vec<&str> {
        self.maturities.iter().map(Maturity::label).collect()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn num_maturities(&self) -> usize {
        self.maturities.len()
    }

    /// Splits the series at a pivot date: rows strictly before `pivot` form
    /// the first matrix, rows on or after it the second. Either side may be
    /// empty.
    pub fn split_at(&self, pivot: NaiveDate) -> (RateMatrix, RateMatrix) {
        let cut = self.dates.partition_point(|d| *d < pivot);
        let head = RateMatrix {
            dates: self.dates[..cut].to_vec(),
            maturities: self.maturities.clone(),
            values: self.values.slice(ndarray::s![..cut, ..]).to_owned(),
        };
        let tail = RateMatrix {
            dates: self.dates[cut..].to_vec(),
            maturities: self.maturities.clone(),
            values: self.values.slice(ndarray::s![cut.., ..]).to_owned(),
        };
        (head, tail)
    }

    /// Writes the matrix as a date-indexed CSV table with ISO dates in the
    /// first column and maturity labels as headers.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> std::result::Result<(), csv::Error> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = vec!["date".to_string()];
        header.extend(self.maturities.iter().map(|m| m.label().to_string()));
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
