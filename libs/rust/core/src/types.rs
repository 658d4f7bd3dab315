//! Value objects crossing component boundaries.
//!
//! `AgentState` and `AggregatedKnowledge` carry derived numeric state only;
//! raw pattern content never leaves the agent that processed it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type AgentId = String;
pub type Version = u64;

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 { chrono::Utc::now().timestamp_millis() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub embedding: Vec<f32>,
    pub quality: f32, // 0.0 - 1.0
    pub category: String,
    pub agent_id: AgentId,
    pub created_at: i64,
}

impl LearnedPattern {
    pub fn new(agent_id: impl Into<AgentId>, category: impl Into<String>, embedding: Vec<f32>, quality: f32) -> Self {
        Self { embedding, quality, category: category.into(), agent_id: agent_id.into(), created_at: now_millis() }
    }
}

/// Snapshot exported by an agent for submission to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub version: Version,
    pub weights: Vec<f32>,
    pub gradients: Vec<f32>,
    /// Patterns folded into `version`; 0 when the version was already submitted.
    pub pattern_count: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedKnowledge {
    pub version: Version,
    pub global_weights: Vec<f32>,
    pub categories: BTreeSet<String>,
    pub contributors: usize,
    pub timestamp: i64,
}

macro_rules! impl_json {
    ($($t:ty),*) => {$(
        impl $t {
            pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string(self) }
            pub fn from_json(s: &str) -> serde_json::Result<Self> { serde_json::from_str(s) }
        }
    )*};
}

impl_json!(AgentState, AggregatedKnowledge);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederatedMetrics {
    pub total_aggregations: u64,
    pub total_patterns_shared: u64,
    pub active_agents: usize,
    pub convergence_rate: f64,
    pub privacy_budget_used: f64,
    pub last_aggregation: Option<i64>,
}
