use anyhow::Result;
use rand::Rng;
use tracing::info;
use federated_core::{FederatedConfig, FederatedEvent, FederatedManager, LearnedPattern};

const CATEGORIES: [&str; 4] = ["ui", "api", "performance", "security"];

pub struct FederationModule {
    manager: FederatedManager,
    agents: Vec<String>,
}

impl FederationModule {
    pub async fn new(config: FederatedConfig, agent_count: usize) -> Result<Self> {
        let manager = FederatedManager::new(config);
        let mut rx = manager.subscribe();
        tokio::spawn(async move {
            while let Ok(evt) = rx.recv().await {
                let json = serde_json::to_string(&evt).unwrap_or_default();
                info!(target: "federation_events", event = %json);
                if matches!(evt, FederatedEvent::Shutdown) { break; }
            }
        });
        let agents: Vec<String> = (0..agent_count).map(|i| format!("agent-{i}")).collect();
        for id in &agents { manager.register_agent(id); }
        info!(agents = agents.len(), "federation_module_initialized");
        Ok(Self { manager, agents })
    }

    /// One round: every agent shares synthetic patterns, the team aggregates,
    /// and every agent pulls the result back.
    pub async fn run_round(&self, patterns_per_agent: usize) -> Result<()> {
        let dim = self.manager.config().dimension;
        {
            let mut rng = rand::thread_rng();
            for (slot, id) in self.agents.iter().enumerate() {
                for _ in 0..patterns_per_agent {
                    let mut embedding: Vec<f32> = (0..dim).map(|_| rng.gen_range(-0.1..0.1)).collect();
                    // each agent leans toward its own region of the embedding space
                    embedding[slot % dim] += 1.0;
                    let quality = rng.gen_range(0.4..1.0);
                    let category = CATEGORIES[slot % CATEGORIES.len()];
                    self.manager.share_pattern(id, &LearnedPattern::new(id.as_str(), category, embedding, quality))?;
                }
            }
        }
        let knowledge = self.manager.force_aggregation()?;
        for id in &self.agents { self.manager.sync_from_team(id)?; }
        let metrics = self.manager.get_metrics();
        info!(version = knowledge.version, contributors = knowledge.contributors, convergence = metrics.convergence_rate, privacy_budget = metrics.privacy_budget_used, "federation_round_complete");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let metrics = self.manager.get_metrics();
        info!(rounds = metrics.total_aggregations, patterns = metrics.total_patterns_shared, "federation_module_shutdown");
        self.manager.shutdown();
        Ok(())
    }
}
