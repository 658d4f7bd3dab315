//! Federated Learning module (threshold-triggered coordinator)

pub(crate) mod aggregation;
pub mod coordinator;
pub use coordinator::{
    FederatedCoordinator,
    SharedRng,
    INIT_WEIGHT_SCALE,
};
