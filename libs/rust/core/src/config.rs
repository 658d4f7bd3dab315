//! Coordinator configuration.
//!
//! Sources are layered with the `config` crate:
//! defaults -> optional file (`FEDERATED_CONFIG_FILE`) -> env (`FEDERATED__*`).
//! A config is immutable once a coordinator has been built from it.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{FederatedError, Result};

pub const DEFAULT_MIN_AGENTS: usize = 3;
pub const DEFAULT_EPSILON: f64 = 1.0;
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationStrategy { #[default] FedAvg, Weighted, Secure }

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self { AggregationStrategy::FedAvg => "fedavg", AggregationStrategy::Weighted => "weighted", AggregationStrategy::Secure => "secure" };
        f.write_str(s)
    }
}

impl FromStr for AggregationStrategy {
    type Err = FederatedError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fedavg" => Ok(AggregationStrategy::FedAvg),
            "weighted" => Ok(AggregationStrategy::Weighted),
            "secure" => Ok(AggregationStrategy::Secure),
            other => Err(FederatedError::InvalidConfig(format!("unknown aggregation strategy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    pub min_agents_for_aggregation: usize,
    pub aggregation_strategy: AggregationStrategy,
    pub enable_differential_privacy: bool,
    pub privacy_epsilon: f64,
    pub learning_rate: f32,
    pub dimension: usize,
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            min_agents_for_aggregation: DEFAULT_MIN_AGENTS,
            aggregation_strategy: AggregationStrategy::FedAvg,
            enable_differential_privacy: false,
            privacy_epsilon: DEFAULT_EPSILON,
            learning_rate: DEFAULT_LEARNING_RATE,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl FederatedConfig {
    pub fn with_dimension(mut self, dimension: usize) -> Self { self.dimension = dimension; self }
    pub fn with_min_agents(mut self, min: usize) -> Self { self.min_agents_for_aggregation = min; self }
    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self { self.aggregation_strategy = strategy; self }
    pub fn with_learning_rate(mut self, lr: f32) -> Self { self.learning_rate = lr; self }

    /// Enables differential privacy with the given per-round budget.
    pub fn with_privacy(mut self, epsilon: f64) -> Self {
        self.enable_differential_privacy = true;
        self.privacy_epsilon = epsilon;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 { return Err(FederatedError::InvalidConfig("dimension must be positive".into())); }
        if self.min_agents_for_aggregation == 0 { return Err(FederatedError::InvalidConfig("min_agents_for_aggregation must be at least 1".into())); }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 { return Err(FederatedError::InvalidConfig(format!("learning_rate must be positive, got {}", self.learning_rate))); }
        if self.enable_differential_privacy && (!self.privacy_epsilon.is_finite() || self.privacy_epsilon <= 0.0) {
            return Err(FederatedError::InvalidConfig(format!("privacy_epsilon must be positive, got {}", self.privacy_epsilon)));
        }
        Ok(())
    }

    /// Loads from `FEDERATED_CONFIG_FILE` (if set) and `FEDERATED__*` env vars.
    pub fn load() -> Result<Self> {
        let file = std::env::var("FEDERATED_CONFIG_FILE").ok();
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let d = FederatedConfig::default();
        let mut builder = config::Config::builder()
            .set_default("min_agents_for_aggregation", d.min_agents_for_aggregation as i64)?
            .set_default("aggregation_strategy", d.aggregation_strategy.to_string())?
            .set_default("enable_differential_privacy", d.enable_differential_privacy)?
            .set_default("privacy_epsilon", d.privacy_epsilon)?
            .set_default("learning_rate", d.learning_rate as f64)?
            .set_default("dimension", d.dimension as i64)?;
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("FEDERATED").separator("__").try_parsing(true));
        let cfg: FederatedConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        tracing::debug!(dimension = cfg.dimension, strategy = %cfg.aggregation_strategy, "federated config loaded");
        Ok(cfg)
    }
}
