use chrono::NaiveDate;
use ndarray::{s, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::StressConfig;
use crate::curve::RateMatrix;
use crate::eigen::RetainedBasis;
use crate::error::{CurveModelError, Result};
use crate::project::{reconstruct, ScoreMatrix};

/// Direction of a stress perturbation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Offsets every score column by `direction × sigma × rolling_std(window)`
/// of its own history.
///
/// The rolling standard deviation is the trailing sample standard deviation
/// over `window` observations; the first `window - 1` rows lack a full window
/// and are dropped, so `T` input rows yield `T - window + 1` output rows.
/// That warm-up is an expected boundary condition, not an error.
pub fn rolling_perturbation(
    scores: &ScoreMatrix,
    sigma: f64,
    window: usize,
    direction: Direction,
) -> Result<ScoreMatrix> {
    if window < 2 {
        return Err(CurveModelError::InsufficientData(format!(
            "rolling window must cover at least 2 observations, got {window}"
        )));
    }
    let t = scores.num_dates();
    if t < window {
        return Err(CurveModelError::InsufficientData(format!(
            "rolling window of {window} needs at least {window} observations, got {t}"
        )));
    }

    let out_rows = t - window + 1;
    let mut stressed = Array2::zeros((out_rows, scores.num_components()));
    for (j, column) in scores.values().columns().into_iter().enumerate() {
        for r in 0..out_rows {
            let trailing = column.slice(s![r..r + window]);
            let mean = trailing.sum() / window as f64;
            let var = trailing.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
                / (window as f64 - 1.0);
            stressed[[r, j]] =
                column[r + window - 1] + direction.sign() * sigma * var.sqrt();
        }
    }

    Ok(ScoreMatrix::from_parts(
        scores.dates()[window - 1..].to_vec(),
        scores.components().to_vec(),
        stressed,
    ))
}

/// Reconstructs the rate curves implied by stressing exactly one component.
///
/// Builds a mixed score matrix: the stressed column for `target`, the
/// unstressed historical column for every other retained component, aligned
/// on the date intersection of both inputs (rows inside the rolling warm-up
/// window drop out here). Columns are restored to the canonical retained
/// order before reconstruction, since the backtransformation is a matrix
/// product against the fixed inverse-basis row order.
pub fn univariate_stress(
    historical: &ScoreMatrix,
    stressed: &ScoreMatrix,
    target: &str,
    basis: &RetainedBasis,
) -> Result<RateMatrix> {
    if !basis.components().iter().any(|c| c == target) {
        return Err(CurveModelError::DimensionMismatch(format!(
            "target component {target:?} is not among the retained components {:?}",
            basis.components()
        )));
    }

    let aligned = intersect_dates(historical.dates(), stressed.dates());
    if aligned.is_empty() {
        return Err(CurveModelError::DimensionMismatch(
            "historical and stressed scores share no dates".to_string(),
        ));
    }

    let k = basis.k();
    let mut mixed = Array2::zeros((aligned.len(), k));
    for (j, component) in basis.components().iter().enumerate() {
        let use_stressed = component == target;
        let source = if use_stressed { stressed } else { historical };
        let column = source.column(component).ok_or_else(|| {
            CurveModelError::DimensionMismatch(format!(
                "component {component:?} is missing from the score matrix"
            ))
        })?;
        for (r, (_, rows)) in aligned.iter().enumerate() {
            mixed[[r, j]] = column[if use_stressed { rows.1 } else { rows.0 }];
        }
    }

    let dates = aligned.iter().map(|(d, _)| *d).collect();
    let mixed_scores = ScoreMatrix::from_parts(dates, basis.components().to_vec(), mixed);
    reconstruct(&mixed_scores, basis)
}

/// One stressed rate-curve scenario: a single component shocked in a single
/// direction, all other retained components at their historical trajectory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StressScenario {
    pub component: String,
    pub direction: Direction,
    pub rates: RateMatrix,
}

/// The full per-component scenario grid plus the stressed score matrices it
/// was derived from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub up_scores: ScoreMatrix,
    pub down_scores: ScoreMatrix,
    pub scenarios: Vec<StressScenario>,
}

/// Generates up and down stress scenarios for every retained component.
///
/// The two stressed score matrices are computed once from the same history;
/// the per-component reconstructions are independent reads of the immutable
/// basis and run in parallel.
pub fn scenario_set(
    scores: &ScoreMatrix,
    basis: &RetainedBasis,
    config: &StressConfig,
) -> Result<ScenarioSet> {
    let retained = if scores.num_components() == basis.k() {
        scores.clone()
    } else {
        scores.truncated(basis.k())?
    };
    if retained.components() != basis.components() {
        return Err(CurveModelError::DimensionMismatch(format!(
            "score columns {:?} do not match retained components {:?}",
            retained.components(),
            basis.components()
        )));
    }

    let up_scores = rolling_perturbation(&retained, config.sigma, config.window, Direction::Up)?;
    let down_scores =
        rolling_perturbation(&retained, config.sigma, config.window, Direction::Down)?;

    let grid: Vec<(String, Direction)> = basis
        .components()
        .iter()
        .flat_map(|c| [(c.clone(), Direction::Up), (c.clone(), Direction::Down)])
        .collect();

    let scenarios = grid
        .into_par_iter()
        .map(|(component, direction)| {
            let stressed = match direction {
                Direction::Up => &up_scores,
                Direction::Down => &down_scores,
            };
            let rates = univariate_stress(&retained, stressed, &component, basis)?;
            Ok(StressScenario {
                component,
                direction,
                rates,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ScenarioSet {
        up_scores,
        down_scores,
        scenarios,
    })
}

/// Intersects two strictly increasing date sequences, returning each common
/// date with its row position in either input.
fn intersect_dates(a: &[NaiveDate], b: &[NaiveDate]) -> Vec<(NaiveDate, (usize, usize))> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push((a[i], (i, j)));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::covariance;
    use crate::curve::Maturity;
    use crate::eigen::decompose;
    use crate::project::{project, Columns};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + chrono::Days::new(n)
    }

    fn score_matrix(columns: Vec<(&str, Vec<f64>)>) -> ScoreMatrix {
        let rows = columns[0].1.len();
        let labels = columns.iter().map(|(l, _)| l.to_string()).collect();
        let values = Array2::from_shape_fn((rows, columns.len()), |(r, c)| columns[c].1[r]);
        ScoreMatrix::from_parts((0..rows as u64).map(day).collect(), labels, values)
    }

    fn sample_std(window: &[f64]) -> f64 {
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        (window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (window.len() as f64 - 1.0))
            .sqrt()
    }

    #[test]
    fn warm_up_rows_are_dropped() {
        let series: Vec<f64> = (0..12).map(|i| (i as f64 * 0.7).sin()).collect();
        let scores = score_matrix(vec![("PC_1", series)]);
        let stressed = rolling_perturbation(&scores, 1.0, 5, Direction::Up).unwrap();
        assert_eq!(stressed.num_dates(), 12 - 5 + 1);
        assert_eq!(stressed.dates()[0], day(4));
    }

    #[test]
    fn perturbation_arithmetic_matches_hand_computation() {
        let series = vec![1.0, 2.0, 4.0, 3.0, 5.0, 6.0];
        let scores = score_matrix(vec![("PC_1", series.clone())]);
        let stressed = rolling_perturbation(&scores, 2.0, 3, Direction::Down).unwrap();
        // Last output row: original score minus 2 x std of the last 3 scores.
        let expected = series[5] - 2.0 * sample_std(&series[3..]);
        assert_abs_diff_eq!(stressed.values()[[3, 0]], expected, epsilon = 1e-12);
    }

    #[test]
    fn window_larger_than_history_is_rejected() {
        let scores = score_matrix(vec![("PC_1", vec![1.0, 2.0, 3.0])]);
        let err = rolling_perturbation(&scores, 2.0, 4, Direction::Up).unwrap_err();
        assert!(matches!(err, CurveModelError::InsufficientData(_)));
        let err = rolling_perturbation(&scores, 2.0, 1, Direction::Up).unwrap_err();
        assert!(matches!(err, CurveModelError::InsufficientData(_)));
    }

    #[test]
    fn zero_sigma_stress_reproduces_unstressed_reconstruction() {
        let rates = sample_rates(14);
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let retained = basis.retained(2).unwrap();
        let scores = project(&rates, &basis, Columns::First(2)).unwrap();

        let stressed = rolling_perturbation(&scores, 0.0, 5, Direction::Up).unwrap();
        let mixed = univariate_stress(&scores, &stressed, "PC_1", &retained).unwrap();

        let baseline = reconstruct(&scores, &retained).unwrap();
        // Compare on the dates that survived the warm-up window.
        for (r, date) in mixed.dates().iter().enumerate() {
            let base_row = baseline.dates().iter().position(|d| d == date).unwrap();
            for c in 0..mixed.num_maturities() {
                assert_abs_diff_eq!(
                    mixed.values()[[r, c]],
                    baseline.values()[[base_row, c]],
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn unknown_target_component_is_rejected() {
        let rates = sample_rates(14);
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let retained = basis.retained(2).unwrap();
        let scores = project(&rates, &basis, Columns::First(2)).unwrap();
        let stressed = rolling_perturbation(&scores, 2.0, 5, Direction::Up).unwrap();
        let err = univariate_stress(&scores, &stressed, "PC_3", &retained).unwrap_err();
        assert!(matches!(err, CurveModelError::DimensionMismatch(_)));
    }

    #[test]
    fn scenario_grid_covers_components_and_directions() {
        let rates = sample_rates(20);
        let basis = decompose(&covariance(&rates).unwrap()).unwrap();
        let retained = basis.retained(2).unwrap();
        let scores = project(&rates, &basis, Columns::All).unwrap();
        let config = StressConfig {
            sigma: 2.0,
            window: 6,
        };
        let set = scenario_set(&scores, &retained, &config).unwrap();
        assert_eq!(set.scenarios.len(), 4);
        assert_eq!(set.up_scores.num_dates(), 20 - 6 + 1);
        assert!(set
            .scenarios
            .iter()
            .any(|s| s.component == "PC_2" && s.direction == Direction::Down));
    }

    fn sample_rates(rows: usize) -> RateMatrix {
        let maturities = vec![
            Maturity::new("1Y", 1.0),
            Maturity::new("5Y", 5.0),
            Maturity::new("10Y", 10.0),
        ];
        let values = Array2::from_shape_fn((rows, 3), |(t, m)| {
            let level = Array1::linspace(0.0, 1.0, rows)[t];
            1.0 + 0.3 * m as f64
                + 0.2 * (t as f64 * 0.9 + m as f64).sin()
                + 0.05 * level * (m as f64 + 1.0)
        });
        RateMatrix::new(
            (0..rows as u64).map(day).collect(),
            maturities,
            values,
        )
        .unwrap()
    }
}
