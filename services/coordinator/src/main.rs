use anyhow::Result;
use tracing::info;
use federated_core::FederatedConfig;

mod federation;
use federation::FederationModule;

fn env_usize(key: &str, default: usize) -> usize { std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default) }

#[tokio::main]
async fn main() -> Result<()> {
    federated_core::init_tracing("coordinator-service")?;
    let config = FederatedConfig::load()?;
    info!(target: "coordinator-service", dimension = config.dimension, strategy = %config.aggregation_strategy, "Starting coordinator-service");
    let agents = env_usize("FEDERATED_SIM_AGENTS", 4);
    let rounds = env_usize("FEDERATED_SIM_ROUNDS", 3);
    let patterns = env_usize("FEDERATED_SIM_PATTERNS", 8);
    let module = FederationModule::new(config, agents).await?;
    for _ in 0..rounds { module.run_round(patterns).await?; }
    module.shutdown().await?;
    // let the event logger drain
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    Ok(())
}
