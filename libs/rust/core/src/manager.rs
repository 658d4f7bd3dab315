//! Orchestration surface: agent registry plus the coordinator it feeds.
//!
//! The registry lock is only held long enough to clone an agent handle; it is
//! never held across a call into the coordinator.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agent::EphemeralAgent;
use crate::config::FederatedConfig;
use crate::error::{FederatedError, Result};
use crate::events::{EventBus, EventReceiver, FederatedEvent};
use crate::federated_learning::{FederatedCoordinator, SharedRng};
use crate::types::{AgentId, AggregatedKnowledge, FederatedMetrics, LearnedPattern};

pub type AgentHandle = Arc<Mutex<EphemeralAgent>>;

pub struct FederatedManager {
    coordinator: FederatedCoordinator,
    agents: RwLock<BTreeMap<AgentId, AgentHandle>>,
    events: EventBus,
}

impl FederatedManager {
    pub fn new(config: FederatedConfig) -> Self { Self::with_event_bus(config, EventBus::default()) }

    /// Use when subscribers must observe the `Initialized` event.
    pub fn with_event_bus(config: FederatedConfig, events: EventBus) -> Self {
        let coordinator = FederatedCoordinator::new(config, events.clone());
        Self::from_parts(coordinator, events)
    }

    pub fn with_rng(config: FederatedConfig, events: EventBus, rng: SharedRng) -> Self {
        let coordinator = FederatedCoordinator::with_rng(config, events.clone(), rng);
        Self::from_parts(coordinator, events)
    }

    fn from_parts(coordinator: FederatedCoordinator, events: EventBus) -> Self {
        let cfg = coordinator.config();
        events.publish(FederatedEvent::Initialized { dimension: cfg.dimension, strategy: cfg.aggregation_strategy, min_agents: cfg.min_agents_for_aggregation });
        info!("federated_manager_initialized");
        Self { coordinator, agents: RwLock::new(BTreeMap::new()), events }
    }

    pub fn config(&self) -> &FederatedConfig { self.coordinator.config() }
    pub fn subscribe(&self) -> EventReceiver { self.events.subscribe() }

    /// Returns the existing agent when `id` is already registered.
    pub fn register_agent(&self, id: &str) -> AgentHandle {
        let mut agents = self.agents.write();
        if let Some(existing) = agents.get(id) { return existing.clone(); }
        let cfg = self.coordinator.config();
        let handle = Arc::new(Mutex::new(EphemeralAgent::new(id, cfg.dimension, cfg.learning_rate)));
        agents.insert(id.to_string(), handle.clone());
        drop(agents);
        info!(agent_id = id, "agent_registered");
        self.events.publish(FederatedEvent::AgentRegistered { agent_id: id.to_string() });
        handle
    }

    pub fn unregister_agent(&self, id: &str) -> bool {
        let removed = self.agents.write().remove(id).is_some();
        if removed {
            info!(agent_id = id, "agent_unregistered");
            self.events.publish(FederatedEvent::AgentUnregistered { agent_id: id.to_string() });
        }
        removed
    }

    fn handle(&self, id: &str) -> Result<AgentHandle> {
        self.agents.read().get(id).cloned().ok_or_else(|| FederatedError::UnknownAgent(id.to_string()))
    }

    pub fn agent(&self, id: &str) -> Option<AgentHandle> { self.agents.read().get(id).cloned() }

    /// Local only: folds the pattern into the agent's gradient buffer.
    pub fn share_pattern(&self, id: &str, pattern: &LearnedPattern) -> Result<()> {
        let handle = self.handle(id)?;
        handle.lock().process_pattern(&pattern.embedding, pattern.quality)?;
        self.coordinator.add_category(pattern.category.clone());
        debug!(agent_id = id, category = %pattern.category, "pattern_shared");
        self.events.publish(FederatedEvent::PatternShared { agent_id: id.to_string(), category: pattern.category.clone() });
        Ok(())
    }

    /// Commits the agent's gradients and submits its state. Returns the new
    /// knowledge if the submission completed a round.
    pub fn submit_agent_update(&self, id: &str) -> Result<Option<AggregatedKnowledge>> {
        let handle = self.handle(id)?;
        let state = handle.lock().commit_update();
        self.coordinator.submit_update(state)
    }

    pub fn sync_from_team(&self, id: &str) -> Result<AggregatedKnowledge> {
        let handle = self.handle(id)?;
        let knowledge = self.coordinator.export_knowledge();
        handle.lock().import_state(&knowledge)?;
        debug!(agent_id = id, version = knowledge.version, "agent_synced");
        self.events.publish(FederatedEvent::AgentSynced { agent_id: id.to_string(), version: knowledge.version });
        Ok(knowledge)
    }

    /// Submits every registered agent (sorted by id) as one batch and runs a single round.
    pub fn force_aggregation(&self) -> Result<AggregatedKnowledge> {
        let handles: Vec<AgentHandle> = self.agents.read().values().cloned().collect();
        let states = handles.iter().map(|h| h.lock().commit_update()).collect();
        self.coordinator.submit_batch(states)
    }

    pub fn get_metrics(&self) -> FederatedMetrics { self.coordinator.metrics() }
    pub fn get_agent_ids(&self) -> Vec<AgentId> { self.agents.read().keys().cloned().collect() }
    pub fn get_knowledge(&self) -> AggregatedKnowledge { self.coordinator.export_knowledge() }
    pub fn agent_count(&self) -> usize { self.agents.read().len() }

    pub fn shutdown(&self) {
        self.agents.write().clear();
        self.coordinator.reset();
        info!("federated_manager_shutdown");
        self.events.publish(FederatedEvent::Shutdown);
    }
}
