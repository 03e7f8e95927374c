use serde::{Deserialize, Serialize};

/// Parameters for one stress-scenario computation.
///
/// `window` is the number of trailing observations used for the rolling
/// standard deviation; rows inside the warm-up window are dropped from the
/// stressed output. `sigma` is the multiple of that rolling volatility added
/// to (or subtracted from) the historical scores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StressConfig {
    pub sigma: f64,
    pub window: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            window: 30,
        }
    }
}

/// Configuration for fitting a curve factor model.
///
/// Passed explicitly into each pipeline invocation; the crate keeps no
/// module-level configuration state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of principal components to retain for reconstruction and
    /// stressing (`k`). Must satisfy `1 <= k <= M`.
    pub n_components: usize,
    pub stress: StressConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            stress: StressConfig::default(),
        }
    }
}
