//! The authoritative backend contract.
//!
//! The engine is transport-agnostic: it depends only on the four remote
//! operations below. Game rules (combat outcomes, upgrade costs, training
//! timers) execute server-side; the client consumes their outputs and never
//! re-implements them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use village_core::{CostVector, ProductionSource, ResourceSnapshot};

/// A server-validated action the player can trigger.
///
/// The local affordability check is advisory UX only; the backend
/// re-validates every action and its response is the sole source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionId {
    /// Bank everything produced since the last authoritative update.
    Collect,
    /// Upgrade one production building by type.
    UpgradeBuilding {
        /// Building type identifier, e.g. "gathering_grove".
        building: String,
    },
    /// Upgrade the shared storage, raising `storage_cap`.
    UpgradeStorage,
    /// Start training one unit of the given kind.
    TrainUnit {
        /// Unit kind identifier, e.g. "theropod".
        kind: String,
    },
}

/// Failures surfaced by a backend implementation.
#[derive(Debug, Error, PartialEq)]
pub enum BackendError {
    /// Transient transport or server failure; retrying later may succeed.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The server refused the request, e.g. insufficient resources.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// The four remote operations the engine consumes.
#[allow(async_fn_in_trait)]
pub trait VillageBackend {
    /// Fetch the current authoritative snapshot, including `storage_cap`.
    async fn fetch_snapshot(&self) -> Result<ResourceSnapshot, BackendError>;

    /// Fetch the per-building production contributions.
    async fn fetch_rate_sources(&self) -> Result<Vec<ProductionSource>, BackendError>;

    /// Fetch the current cost of a specific action.
    async fn fetch_cost(&self, action: &ActionId) -> Result<CostVector, BackendError>;

    /// Execute an action server-side and return the post-action snapshot.
    async fn perform_action(&self, action: &ActionId) -> Result<ResourceSnapshot, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_format() {
        let a = ActionId::UpgradeBuilding {
            building: "bone_pit".into(),
        };
        let s = serde_json::to_string(&a).unwrap();
        assert_eq!(s, r#"{"action":"upgrade_building","building":"bone_pit"}"#);
        let back: ActionId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, a);

        let s = serde_json::to_string(&ActionId::UpgradeStorage).unwrap();
        assert_eq!(s, r#"{"action":"upgrade_storage"}"#);
    }

    #[test]
    fn rejection_is_distinguishable_from_outage() {
        let rejected = BackendError::Rejected("insufficient resources".into());
        let outage = BackendError::Unavailable("timeout".into());
        assert_ne!(rejected, outage);
        assert!(rejected.to_string().contains("insufficient"));
    }
}
