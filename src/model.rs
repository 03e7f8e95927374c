use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::covariance::{covariance, CovarianceMatrix};
use crate::curve::{Maturity, RateMatrix};
use crate::eigen::{decompose, EigenDecomposition, RetainedBasis};
use crate::error::{CurveModelError, Result};
use crate::project::{project, project_oos, reconstruct, Columns, ScoreMatrix};
use crate::stress::{scenario_set, ScenarioSet};

/// A fitted curve factor model.
///
/// Holds everything derived once from a training rate matrix (covariance,
/// eigen-decomposition, and the full historical score matrix) and is
/// immutable thereafter: projections, reconstructions, and stress scenarios
/// are independent reads that never mutate the model. The serialized form is
/// sufficient to rebuild projections and scenarios without recomputation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CurveModel {
    config: ModelConfig,
    covariance: CovarianceMatrix,
    basis: EigenDecomposition,
    scores: ScoreMatrix,
}

impl CurveModel {
    /// Fits the full pipeline: covariance, eigen-decomposition, forward
    /// projection of every component.
    pub fn fit(rates: &RateMatrix, config: &ModelConfig) -> Result<Self> {
        let m = rates.num_maturities();
        let k = config.n_components;
        if k == 0 || k > m {
            return Err(CurveModelError::DimensionMismatch(format!(
                "n_components must be in 1..={m} for {m} maturities, got {k}"
            )));
        }

        let covariance = covariance(rates)?;
        let basis = decompose(&covariance)?;
        let scores = project(rates, &basis, Columns::All)?;

        info!(
            "fitted curve factor model: {} observations, {} maturities, k={}, cumulative variance {:.4}",
            rates.num_dates(),
            m,
            k,
            basis.cumulative_variance()[k - 1]
        );

        Ok(Self {
            config: *config,
            covariance,
            basis,
            scores,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of retained components.
    pub fn k(&self) -> usize {
        self.config.n_components
    }

    pub fn maturities(&self) -> &[Maturity] {
        self.basis.maturities()
    }

    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }

    pub fn basis(&self) -> &EigenDecomposition {
        &self.basis
    }

    /// Historical scores for all `M` components.
    pub fn scores(&self) -> &ScoreMatrix {
        &self.scores
    }

    /// The rank-`k` basis view used for reconstruction and stressing.
    pub fn retained_basis(&self) -> Result<RetainedBasis> {
        self.basis.retained(self.k())
    }

    /// Historical scores truncated to the retained components. This is the
    /// input time series consumed by downstream forecasting models.
    pub fn retained_scores(&self) -> Result<ScoreMatrix> {
        self.scores.truncated(self.k())
    }

    /// The k × M inverse-basis rows a downstream consumer needs to map its
    /// own score forecasts back into maturity units.
    pub fn backtransform_rows(&self) -> Result<Array2<f64>> {
        Ok(self.retained_basis()?.inverse_rows().clone())
    }

    /// In-sample rank-`k` reconstruction of the training data.
    pub fn reconstructed(&self) -> Result<RateMatrix> {
        reconstruct(&self.retained_scores()?, &self.retained_basis()?)
    }

    /// Applies this model's training basis to a disjoint dataset:
    /// forward-project, truncate to `k`, reconstruct. No re-fitting occurs.
    pub fn project_oos(&self, rates: &RateMatrix) -> Result<RateMatrix> {
        project_oos(rates, &self.basis, self.k())
    }

    /// Up and down stress scenarios for every retained component, using this
    /// model's stress configuration.
    pub fn stress_scenarios(&self) -> Result<ScenarioSet> {
        scenario_set(
            &self.retained_scores()?,
            &self.retained_basis()?,
            &self.config.stress,
        )
    }

    /// Persists the model bundle to a file with bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| CurveModelError::Serialization(e.to_string()))?;
        Ok(())
    }

    /// Loads a model bundle previously written by `save`, validating its
    /// internal consistency before use.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let model: CurveModel =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| CurveModelError::Serialization(e.to_string()))?;

        let m = model.basis.dim();
        let k = model.config.n_components;
        if k == 0 || k > m {
            return Err(CurveModelError::Serialization(format!(
                "loaded model retains {k} of {m} components"
            )));
        }
        if model.covariance.dim() != m
            || model.basis.maturities().len() != m
            || model.scores.num_components() != m
        {
            return Err(CurveModelError::Serialization(
                "loaded model has inconsistent dimensions".to_string(),
            ));
        }
        if model.scores.components() != model.basis.components() {
            return Err(CurveModelError::Serialization(
                "loaded model's score columns do not match its basis".to_string(),
            ));
        }

        Ok(model)
    }
}
