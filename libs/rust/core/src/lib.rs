//! Core federated pattern-learning primitives.
//!
//! Ephemeral agents fold patterns into local weights, a coordinator combines
//! their exported states into team knowledge, and a manager orchestrates both.

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the fmt subscriber once per process. JSON output when
/// `FEDERATED_JSON_LOG` is `1` or `true`.
pub fn init_tracing(service: &str) -> std::result::Result<(), tracing_subscriber::util::TryInitError> {
    TRACING_INIT.get_or_try_init(|| {
        let json = std::env::var("FEDERATED_JSON_LOG").ok().map(|v| v=="1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry.with(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false)).try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true)).try_init()
        }
    })?;
    info!(target: "federated", service, "tracing initialized");
    Ok(())
}

pub mod error;
pub mod config;
pub mod types;
pub mod events;
pub mod privacy;
pub mod agent;
pub mod federated_learning;
pub mod manager;
mod metrics_ext; // opentelemetry instruments

pub use error::{FederatedError, Result};
pub use crate::config::{FederatedConfig, AggregationStrategy};
pub use types::{AgentId, Version, LearnedPattern, AgentState, AggregatedKnowledge, FederatedMetrics};
pub use events::{EventBus, EventReceiver, EventBusError, FederatedEvent};
pub use agent::EphemeralAgent;
pub use federated_learning::{FederatedCoordinator, SharedRng};
pub use manager::{FederatedManager, AgentHandle};
pub use metrics_ext::{FEDERATION_METRICS, FederationMetrics};
