//! Ephemeral agent: one participant's local learner.
//!
//! Holds a weight vector and a gradient buffer. Embeddings are folded into
//! the buffer and dropped; nothing about an individual pattern is retained.

use tracing::{debug, warn};

use crate::error::{check_dimension, Result};
use crate::types::{now_millis, AgentId, AgentState, AggregatedKnowledge, Version};

/// Share of the local weights kept when importing global knowledge.
pub const LOCAL_BLEND: f32 = 0.7;
pub const GLOBAL_BLEND: f32 = 1.0 - LOCAL_BLEND;

#[derive(Debug, Clone)]
pub struct EphemeralAgent {
    agent_id: AgentId,
    dimension: usize,
    learning_rate: f32,
    weights: Vec<f32>,
    gradients: Vec<f32>,
    pending_patterns: u64,
    folded_patterns: u64,
    version: Version,
}

impl EphemeralAgent {
    pub fn new(agent_id: impl Into<AgentId>, dimension: usize, learning_rate: f32) -> Self {
        Self { agent_id: agent_id.into(), dimension, learning_rate, weights: vec![0.0; dimension], gradients: vec![0.0; dimension], pending_patterns: 0, folded_patterns: 0, version: 0 }
    }

    pub fn agent_id(&self) -> &str { &self.agent_id }
    pub fn dimension(&self) -> usize { self.dimension }
    pub fn version(&self) -> Version { self.version }
    /// Patterns processed since the last `apply_gradients`.
    pub fn pending_patterns(&self) -> u64 { self.pending_patterns }
    /// Patterns folded into the current version.
    pub fn pattern_count(&self) -> u64 { self.folded_patterns }

    /// Accumulates `(quality - 0.5) * 2 * embedding * lr` into the gradient buffer.
    pub fn process_pattern(&mut self, embedding: &[f32], quality: f32) -> Result<()> {
        if let Err(e) = check_dimension(self.dimension, embedding.len()) {
            warn!(agent_id = %self.agent_id, error = %e, "rejected pattern");
            return Err(e);
        }
        let quality_factor = (quality - 0.5) * 2.0;
        for (g, e) in self.gradients.iter_mut().zip(embedding) { *g += quality_factor * e * self.learning_rate; }
        self.pending_patterns += 1;
        debug!(agent_id = %self.agent_id, quality, pending = self.pending_patterns, "pattern processed");
        Ok(())
    }

    /// Commits the averaged gradient into the weights and returns how many
    /// patterns were folded in. No-op (returns 0) without pending patterns.
    pub fn apply_gradients(&mut self) -> u64 {
        if self.pending_patterns == 0 { return 0; }
        let n = self.pending_patterns as f32;
        for (w, g) in self.weights.iter_mut().zip(self.gradients.iter_mut()) {
            *w += *g / n;
            *g = 0.0;
        }
        self.folded_patterns = self.pending_patterns;
        self.pending_patterns = 0;
        self.version += 1;
        debug!(agent_id = %self.agent_id, version = self.version, patterns = self.folded_patterns, "gradients applied");
        self.folded_patterns
    }

    pub fn export_state(&self) -> AgentState {
        AgentState {
            agent_id: self.agent_id.clone(),
            version: self.version,
            weights: self.weights.clone(),
            gradients: self.gradients.clone(),
            pattern_count: self.folded_patterns,
            timestamp: now_millis(),
        }
    }

    /// Commits pending patterns and exports the state to submit. `pattern_count`
    /// covers only this commit, so an agent with nothing new contributes 0.
    pub fn commit_update(&mut self) -> AgentState {
        let committed = self.apply_gradients();
        AgentState { pattern_count: committed, ..self.export_state() }
    }

    /// Blends global weights into the local ones and adopts the global version.
    /// On error the agent is left untouched.
    pub fn import_state(&mut self, knowledge: &AggregatedKnowledge) -> Result<()> {
        check_dimension(self.dimension, knowledge.global_weights.len())?;
        for (w, g) in self.weights.iter_mut().zip(&knowledge.global_weights) { *w = LOCAL_BLEND * *w + GLOBAL_BLEND * g; }
        // version now tracks the federation round last observed
        self.version = knowledge.version;
        self.folded_patterns = 0;
        debug!(agent_id = %self.agent_id, version = self.version, "imported global knowledge");
        Ok(())
    }

    pub fn weights(&self) -> Vec<f32> { self.weights.clone() }
}
