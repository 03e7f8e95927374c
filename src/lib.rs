// Yield-curve factor models via covariance eigen-decomposition

#![doc = include_str!("../README.md")]

pub mod config;
pub mod covariance;
pub mod curve;
pub mod eigen;
pub mod error;
pub mod model;
pub mod project;
pub mod stress;

pub use config::{ModelConfig, StressConfig};
pub use covariance::{covariance, CovarianceMatrix};
pub use curve::{Maturity, RateMatrix};
pub use eigen::{decompose, EigenDecomposition, RetainedBasis};
pub use error::{CurveModelError, Result};
pub use model::CurveModel;
pub use project::{project, project_oos, reconstruct, Columns, ScoreMatrix};
pub use stress::{
    rolling_perturbation, scenario_set, univariate_stress, Direction, ScenarioSet, StressScenario,
};
