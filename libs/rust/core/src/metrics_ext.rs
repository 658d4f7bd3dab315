//! OpenTelemetry instruments for federated rounds.
//!
//! Mirrors the in-memory `FederatedMetrics` snapshot for export; no-ops until a
//! meter provider is installed by the host.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub struct FederationMetrics {
    pub updates_total: Counter<u64>,
    pub rejected_updates_total: Counter<u64>,
    pub rounds_total: Counter<u64>,
    pub participants_total: Counter<u64>,
    pub patterns_shared_total: Counter<u64>,
    pub aggregation_latency_ms: Histogram<f64>,
}

static FED_METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("federated_learning"));

pub static FEDERATION_METRICS: Lazy<FederationMetrics> = Lazy::new(|| {
    FederationMetrics {
        updates_total: FED_METER.u64_counter("fed_updates_total").with_description("Total agent updates received").build(),
        rejected_updates_total: FED_METER.u64_counter("fed_rejected_updates_total").with_description("Updates rejected on dimension validation").build(),
        rounds_total: FED_METER.u64_counter("fed_rounds_completed_total").with_description("Federated rounds completed").build(),
        participants_total: FED_METER.u64_counter("fed_participants_total").with_description("Total contributors folded into rounds").build(),
        patterns_shared_total: FED_METER.u64_counter("fed_patterns_shared_total").with_description("Patterns folded into submitted updates").build(),
        aggregation_latency_ms: FED_METER.f64_histogram("fed_aggregation_latency_ms").with_description("Aggregation latency ms").with_unit("ms").build(),
    }
});
