//! Configuration for planning cycles and the engine itself
//!
//! `ResourceConfig` travels inside each snapshot and tunes scoring.
//! `EngineSettings` is process-level and tunes the learning loop.

use serde::{Deserialize, Serialize};

use crate::types::CycleWarning;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Per-snapshot scoring knobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceConfig {
    pub delivery_slippage_weight: f64,
    pub cost_overrun_weight: f64,
    pub overwork_weight: f64,
    pub on_time_bonus_weight: f64,
    pub top_k: usize,
    /// Burnout score (0-100) at or above which a member counts as at risk
    pub burnout_threshold: f64,
    pub overwork_hours_weekly: f64,
    /// Utilization percentage below which a member counts as idle
    pub idle_threshold_percent: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            delivery_slippage_weight: 0.40,
            cost_overrun_weight: 0.20,
            overwork_weight: 0.25,
            on_time_bonus_weight: 0.15,
            top_k: 5,
            burnout_threshold: 70.0,
            overwork_hours_weekly: 45.0,
            idle_threshold_percent: 30.0,
        }
    }
}

impl ResourceConfig {
    fn weights(&self) -> [f64; 4] {
        [
            self.delivery_slippage_weight,
            self.cost_overrun_weight,
            self.overwork_weight,
            self.on_time_bonus_weight,
        ]
    }

    /// Return a copy whose four impact weights sum to 1.0 and whose top-K is usable.
    ///
    /// Weights that merely fail to sum to 1.0 are rescaled; weights that are
    /// negative, non-finite, or sum to zero are replaced by the defaults.
    /// Either way the cycle proceeds and the caller gets a warning.
    pub fn normalized(&self) -> (ResourceConfig, Vec<CycleWarning>) {
        let mut config = self.clone();
        let mut warnings = Vec::new();
        let defaults = ResourceConfig::default();

        let weights = self.weights();
        let sum: f64 = weights.iter().sum();

        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            warnings.push(CycleWarning::WeightsReset {
                reason: format!("weight {} is negative or not finite", bad),
            });
            config.reset_weights(&defaults);
        } else if sum <= 0.0 {
            warnings.push(CycleWarning::WeightsReset {
                reason: "weights sum to zero".to_string(),
            });
            config.reset_weights(&defaults);
        } else if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            warnings.push(CycleWarning::WeightsNormalized { original_sum: sum });
            config.delivery_slippage_weight /= sum;
            config.cost_overrun_weight /= sum;
            config.overwork_weight /= sum;
            config.on_time_bonus_weight /= sum;
        }

        if config.top_k == 0 {
            warnings.push(CycleWarning::TopKReset {
                requested: 0,
                used: defaults.top_k,
            });
            config.top_k = defaults.top_k;
        }

        if !config.burnout_threshold.is_finite() {
            config.burnout_threshold = defaults.burnout_threshold;
        }

        (config, warnings)
    }

    fn reset_weights(&mut self, defaults: &ResourceConfig) {
        self.delivery_slippage_weight = defaults.delivery_slippage_weight;
        self.cost_overrun_weight = defaults.cost_overrun_weight;
        self.overwork_weight = defaults.overwork_weight;
        self.on_time_bonus_weight = defaults.on_time_bonus_weight;
    }
}

/// Engine-wide learning settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Probability that a candidate skips its Thompson draw entirely
    pub exploration_floor: f64,
    /// Attempts at the arm compare-and-swap before giving up
    pub max_update_retries: u32,
    /// Forgetting factor applied by `apply_decay` when none is given
    pub decay_factor: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            exploration_floor: 0.0,
            max_update_retries: 5,
            decay_factor: None,
        }
    }
}

impl EngineSettings {
    /// Read overrides from `ADVISOR_*` environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(floor) = env_parse::<f64>("ADVISOR_EXPLORATION_FLOOR") {
            settings.exploration_floor = floor;
        }
        if let Some(retries) = env_parse::<u32>("ADVISOR_MAX_RETRIES") {
            settings.max_update_retries = retries;
        }
        if let Some(factor) = env_parse::<f64>("ADVISOR_DECAY_FACTOR") {
            settings.decay_factor = Some(factor);
        }

        settings.sanitized()
    }

    pub fn sanitized(mut self) -> Self {
        self.exploration_floor = if self.exploration_floor.is_finite() {
            self.exploration_floor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.max_update_retries = self.max_update_retries.max(1);
        self.decay_factor = self
            .decay_factor
            .filter(|f| f.is_finite() && *f > 0.0 && *f <= 1.0);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
