//! Threshold-triggered round coordinator over agent state snapshots.

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::aggregation;
use crate::config::{AggregationStrategy, FederatedConfig};
use crate::error::{check_dimension, Result};
use crate::events::{EventBus, FederatedEvent};
use crate::metrics_ext::FEDERATION_METRICS;
use crate::privacy::apply_differential_privacy;
use crate::types::{now_millis, AgentState, AggregatedKnowledge, FederatedMetrics, Version};

/// Initial global weights are drawn from `[-INIT_WEIGHT_SCALE/2, INIT_WEIGHT_SCALE/2)`.
pub const INIT_WEIGHT_SCALE: f32 = 0.001;

pub type SharedRng = Box<dyn RngCore + Send>;

pub struct FederatedCoordinator {
    config: FederatedConfig,
    events: EventBus,
    inner: Mutex<Inner>,
}

struct Inner {
    version: Version,
    global_weights: Vec<f32>,
    pending: Vec<AgentState>,
    categories: BTreeSet<String>,
    contributors: usize,
    metrics: FederatedMetrics,
    rng: SharedRng,
}

impl Inner {
    fn fresh(dim: usize, mut rng: SharedRng) -> Self {
        let global_weights = random_weights(dim, rng.as_mut());
        Self { version: 0, global_weights, pending: Vec::new(), categories: BTreeSet::new(), contributors: 0, metrics: FederatedMetrics::default(), rng }
    }

    /// Back to the freshly-built state; the random source is kept.
    fn reset(&mut self, dim: usize) {
        self.global_weights = random_weights(dim, self.rng.as_mut());
        self.version = 0;
        self.pending.clear();
        self.categories.clear();
        self.contributors = 0;
        self.metrics = FederatedMetrics::default();
    }

    fn knowledge(&self) -> AggregatedKnowledge {
        AggregatedKnowledge { version: self.version, global_weights: self.global_weights.clone(), categories: self.categories.clone(), contributors: self.contributors, timestamp: now_millis() }
    }
}

fn random_weights(dim: usize, rng: &mut dyn RngCore) -> Vec<f32> {
    (0..dim).map(|_| (rng.gen::<f32>() - 0.5) * INIT_WEIGHT_SCALE).collect()
}

impl FederatedCoordinator {
    pub fn new(config: FederatedConfig, events: EventBus) -> Self {
        Self::with_rng(config, events, Box::new(StdRng::from_entropy()))
    }

    /// Builds a coordinator drawing masks, noise and initial weights from `rng`.
    pub fn with_rng(config: FederatedConfig, events: EventBus, rng: SharedRng) -> Self {
        let inner = Inner::fresh(config.dimension, rng);
        info!(dimension = config.dimension, strategy = %config.aggregation_strategy, min_agents = config.min_agents_for_aggregation, privacy = config.enable_differential_privacy, "federated_coordinator_initialized");
        Self { config, events, inner: Mutex::new(inner) }
    }

    pub fn config(&self) -> &FederatedConfig { &self.config }

    /// Queues an agent state. Aggregates before returning once the queue
    /// reaches `min_agents_for_aggregation`.
    pub fn submit_update(&self, state: AgentState) -> Result<Option<AggregatedKnowledge>> {
        self.validate(&state)?;
        let mut inner = self.inner.lock();
        self.enqueue_locked(&mut inner, state);
        if inner.pending.len() >= self.config.min_agents_for_aggregation {
            return Ok(Some(self.aggregate_locked(&mut inner)));
        }
        Ok(None)
    }

    /// Queues every state and aggregates them as one round, ignoring the threshold.
    /// Nothing is queued if any state fails validation.
    pub fn submit_batch(&self, states: Vec<AgentState>) -> Result<AggregatedKnowledge> {
        for s in &states { self.validate(s)?; }
        let mut inner = self.inner.lock();
        for s in states { self.enqueue_locked(&mut inner, s); }
        Ok(self.aggregate_locked(&mut inner))
    }

    pub fn aggregate(&self) -> AggregatedKnowledge {
        let mut inner = self.inner.lock();
        self.aggregate_locked(&mut inner)
    }

    fn validate(&self, state: &AgentState) -> Result<()> {
        let res = check_dimension(self.config.dimension, state.weights.len()).and_then(|_| check_dimension(self.config.dimension, state.gradients.len()));
        if let Err(e) = &res {
            FEDERATION_METRICS.rejected_updates_total.add(1, &[]);
            warn!(agent_id = %state.agent_id, error = %e, "rejected agent update");
        }
        res
    }

    fn enqueue_locked(&self, inner: &mut Inner, state: AgentState) {
        FEDERATION_METRICS.updates_total.add(1, &[]);
        FEDERATION_METRICS.patterns_shared_total.add(state.pattern_count, &[]);
        inner.metrics.total_patterns_shared += state.pattern_count;
        let (agent_id, pattern_count) = (state.agent_id.clone(), state.pattern_count);
        inner.pending.push(state);
        debug!(agent_id = %agent_id, pattern_count, pending = inner.pending.len(), "update received");
        self.events.publish(FederatedEvent::UpdateReceived { agent_id, pattern_count, pending: inner.pending.len() });
    }

    fn aggregate_locked(&self, inner: &mut Inner) -> AggregatedKnowledge {
        let started = Instant::now();
        let batch = std::mem::take(&mut inner.pending);
        let dim = self.config.dimension;
        if !batch.is_empty() {
            let next = match self.config.aggregation_strategy {
                AggregationStrategy::FedAvg => Some(aggregation::fed_avg(&batch, dim)),
                AggregationStrategy::Weighted => aggregation::weighted_avg(&batch, dim),
                AggregationStrategy::Secure => Some(aggregation::secure_avg(&batch, dim, inner.rng.as_mut())),
            };
            match next {
                Some(w) => inner.global_weights = w,
                None => debug!("weighted aggregation skipped: batch carries no patterns"),
            }
            if self.config.enable_differential_privacy {
                let used = apply_differential_privacy(&mut inner.global_weights, self.config.privacy_epsilon, inner.rng.as_mut());
                inner.metrics.privacy_budget_used += used;
            }
            inner.metrics.convergence_rate = aggregation::convergence_rate(&batch, dim);
        }
        inner.version += 1;
        inner.contributors = batch.len();
        let timestamp = now_millis();
        inner.metrics.total_aggregations += 1;
        inner.metrics.active_agents = batch.len();
        inner.metrics.last_aggregation = Some(timestamp);
        FEDERATION_METRICS.rounds_total.add(1, &[]);
        FEDERATION_METRICS.participants_total.add(batch.len() as u64, &[]);
        FEDERATION_METRICS.aggregation_latency_ms.record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        info!(version = inner.version, contributors = batch.len(), convergence = inner.metrics.convergence_rate, "aggregation_complete");
        self.events.publish(FederatedEvent::AggregationComplete { version: inner.version, contributors: batch.len(), timestamp });
        let mut knowledge = inner.knowledge();
        knowledge.timestamp = timestamp;
        knowledge
    }

    pub fn export_knowledge(&self) -> AggregatedKnowledge { self.inner.lock().knowledge() }

    pub fn add_category(&self, name: impl Into<String>) { self.inner.lock().categories.insert(name.into()); }

    /// New random weights, zeroed metrics, empty queue and category set.
    pub fn reset(&self) {
        self.inner.lock().reset(self.config.dimension);
        info!("federated_coordinator_reset");
    }

    pub fn metrics(&self) -> FederatedMetrics { self.inner.lock().metrics.clone() }
    pub fn version(&self) -> Version { self.inner.lock().version }
    pub fn pending_count(&self) -> usize { self.inner.lock().pending.len() }
    pub fn categories(&self) -> BTreeSet<String> { self.inner.lock().categories.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederatedError;

    fn coordinator(cfg: FederatedConfig) -> FederatedCoordinator {
        FederatedCoordinator::with_rng(cfg, EventBus::default(), Box::new(StdRng::seed_from_u64(42)))
    }

    fn state(id: &str, weights: Vec<f32>, pattern_count: u64) -> AgentState {
        AgentState { agent_id: id.into(), version: 1, gradients: vec![0.0; weights.len()], weights, pattern_count, timestamp: 0 }
    }

    #[test]
    fn round_triggers_at_threshold() {
        let fed = coordinator(FederatedConfig::default().with_dimension(2).with_min_agents(2));
        assert!(fed.submit_update(state("n1", vec![1.0, 2.0], 10)).unwrap().is_none());
        assert_eq!(fed.pending_count(), 1);
        let agg = fed.submit_update(state("n2", vec![3.0, 4.0], 10)).unwrap().expect("threshold reached");
        assert_eq!(agg.version, 1);
        assert_eq!(agg.contributors, 2);
        assert_eq!(agg.global_weights, vec![2.0, 3.0]);
        assert_eq!(fed.pending_count(), 0);
        let m = fed.metrics();
        assert_eq!(m.total_aggregations, 1);
        assert_eq!(m.total_patterns_shared, 20);
        assert_eq!(m.active_agents, 2);
    }

    #[test]
    fn empty_round_bumps_version_only() {
        let fed = coordinator(FederatedConfig::default().with_dimension(3).with_privacy(0.5));
        let before = fed.export_knowledge();
        let after = fed.aggregate();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.global_weights, before.global_weights);
        assert_eq!(after.contributors, 0);
        assert_eq!(fed.metrics().privacy_budget_used, 0.0);
    }

    #[test]
    fn mismatched_update_is_rejected_without_queueing() {
        let fed = coordinator(FederatedConfig::default().with_dimension(3).with_min_agents(1));
        let err = fed.submit_update(state("n1", vec![1.0], 1)).unwrap_err();
        assert!(matches!(err, FederatedError::DimensionMismatch { expected: 3, actual: 1 }));
        assert_eq!(fed.pending_count(), 0);
        assert_eq!(fed.metrics().total_patterns_shared, 0);
        assert_eq!(fed.version(), 0);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let fed = coordinator(FederatedConfig::default().with_dimension(2));
        let res = fed.submit_batch(vec![state("n1", vec![1.0, 1.0], 1), state("n2", vec![1.0], 1)]);
        assert!(res.is_err());
        assert_eq!(fed.pending_count(), 0);
        assert_eq!(fed.version(), 0);
    }

    #[test]
    fn weighted_with_zero_counts_keeps_weights() {
        let fed = coordinator(FederatedConfig::default().with_dimension(2).with_min_agents(10).with_strategy(AggregationStrategy::Weighted));
        let before = fed.export_knowledge().global_weights;
        fed.submit_update(state("n1", vec![5.0, 5.0], 0)).unwrap();
        fed.submit_update(state("n2", vec![7.0, 7.0], 0)).unwrap();
        let agg = fed.aggregate();
        assert_eq!(agg.global_weights, before);
        assert_eq!(agg.version, 1);
    }

    #[test]
    fn privacy_budget_accumulates_per_round() {
        let fed = coordinator(FederatedConfig::default().with_dimension(4).with_min_agents(1).with_privacy(0.5));
        fed.submit_update(state("n1", vec![0.1; 4], 1)).unwrap();
        assert!((fed.metrics().privacy_budget_used - 2.0).abs() < 1e-12);
        fed.submit_update(state("n1", vec![0.1; 4], 1)).unwrap();
        assert!((fed.metrics().privacy_budget_used - 4.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_everything() {
        let fed = coordinator(FederatedConfig::default().with_dimension(2).with_min_agents(5));
        fed.add_category("ui");
        fed.submit_update(state("n1", vec![1.0, 1.0], 3)).unwrap();
        fed.aggregate();
        fed.submit_update(state("n2", vec![1.0, 1.0], 3)).unwrap();
        fed.reset();
        assert_eq!(fed.pending_count(), 0);
        assert_eq!(fed.version(), 0);
        assert!(fed.categories().is_empty());
        assert_eq!(fed.metrics(), FederatedMetrics::default());
        assert!(fed.export_knowledge().global_weights.iter().all(|w| w.abs() <= INIT_WEIGHT_SCALE));
    }

    #[test]
    fn reset_keeps_drawing_from_injected_rng() {
        let a = coordinator(FederatedConfig::default().with_dimension(4));
        let b = coordinator(FederatedConfig::default().with_dimension(4));
        let initial = a.export_knowledge().global_weights;
        a.reset();
        b.reset();
        let after = a.export_knowledge().global_weights;
        assert_ne!(after, initial);
        assert_eq!(after, b.export_knowledge().global_weights);
    }

    #[test]
    fn events_follow_submission_and_round() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let fed = FederatedCoordinator::with_rng(FederatedConfig::default().with_dimension(1).with_min_agents(1), bus, Box::new(StdRng::seed_from_u64(3)));
        fed.submit_update(state("n1", vec![0.5], 4)).unwrap();
        let events = rx.drain();
        assert_eq!(events[0], FederatedEvent::UpdateReceived { agent_id: "n1".into(), pattern_count: 4, pending: 1 });
        assert!(matches!(events[1], FederatedEvent::AggregationComplete { version: 1, contributors: 1, .. }));
    }
}
