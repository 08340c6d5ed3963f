//! Scenario and order-version models.
//!
//! A scenario is a named branch of scheduling decisions; scenarios form
//! a derivation tree. Each scenario maps order → order version: which
//! snapshot of scheduling facts that order uses under this scenario.
//! Deriving a scenario clones the mapping, so the child initially
//! shares every version with its parent — copy-on-write happens at the
//! order level on the child's first mutating save, when a fresh version
//! is forked (see [`crate::planning`]).
//!
//! An [`OrderVersion`] is immutable once saved; the scenario that
//! created it is its *owner*.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::fresh_id;

/// Snapshot identifier for one order's scheduling facts under one
/// scenario lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderVersion {
    /// Generated version identity.
    pub id: String,
    /// The scenario that created this version.
    pub owner_scenario_id: String,
    /// Whether the version has been saved through its owner.
    pub saved_through_owner: bool,
}

impl OrderVersion {
    /// Allocates a fresh version owned by `scenario`.
    pub fn initial_version(scenario: &Scenario) -> Self {
        Self {
            id: fresh_id(),
            owner_scenario_id: scenario.id.clone(),
            saved_through_owner: false,
        }
    }

    /// Whether a scenario is this version's owner.
    pub fn is_owned_by(&self, scenario_id: &str) -> bool {
        self.owner_scenario_id == scenario_id
    }

    /// Marks the version as saved through its owner.
    pub fn saving_through_owner(&mut self) {
        self.saved_through_owner = true;
    }
}

/// A named branch of scheduling decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique scenario identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Scenario this one was derived from; `None` for the main line.
    pub parent_id: Option<String>,
    /// Order → version mapping under this scenario.
    pub order_versions: HashMap<String, OrderVersion>,
}

impl Scenario {
    /// Creates the main (underived) scenario.
    pub fn main() -> Self {
        Self::new("master", "Master")
    }

    /// Creates a named root scenario.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            order_versions: HashMap::new(),
        }
    }

    /// Derives a child scenario sharing this one's version mapping.
    pub fn derive(&self, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: Some(self.id.clone()),
            order_versions: self.order_versions.clone(),
        }
    }

    /// Whether this scenario was derived from another.
    pub fn is_derived(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Registers an order under this scenario with a fresh version
    /// owned by it, and returns that version.
    pub fn add_order(&mut self, order_id: impl Into<String>) -> OrderVersion {
        let version = OrderVersion::initial_version(self);
        self.order_versions
            .insert(order_id.into(), version.clone());
        version
    }

    /// The version this scenario uses for an order, if any.
    pub fn order_version(&self, order_id: &str) -> Option<&OrderVersion> {
        self.order_versions.get(order_id)
    }

    /// Points this scenario's mapping for an order at a version.
    pub fn set_order_version(&mut self, order_id: impl Into<String>, version: OrderVersion) {
        self.order_versions.insert(order_id.into(), version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_order_creates_owned_version() {
        let mut main = Scenario::main();
        let version = main.add_order("O1");
        assert!(version.is_owned_by("master"));
        assert!(!version.saved_through_owner);
        assert_eq!(main.order_version("O1"), Some(&version));
    }

    #[test]
    fn test_derive_shares_versions() {
        let mut main = Scenario::main();
        let v1 = main.add_order("O1");

        let branch = main.derive("branch", "What-if");
        assert!(branch.is_derived());
        assert_eq!(branch.parent_id.as_deref(), Some("master"));
        // Shares the parent's version until its first write.
        assert_eq!(branch.order_version("O1"), Some(&v1));
        assert!(!branch
            .order_version("O1")
            .unwrap()
            .is_owned_by("branch"));
    }

    #[test]
    fn test_set_order_version_diverges_child_only() {
        let mut main = Scenario::main();
        let v1 = main.add_order("O1");

        let mut branch = main.derive("branch", "What-if");
        let v2 = OrderVersion::initial_version(&branch);
        branch.set_order_version("O1", v2.clone());

        assert_eq!(branch.order_version("O1"), Some(&v2));
        assert_eq!(main.order_version("O1"), Some(&v1));
    }

    #[test]
    fn test_saving_through_owner() {
        let main = Scenario::main();
        let mut version = OrderVersion::initial_version(&main);
        assert!(!version.saved_through_owner);
        version.saving_through_owner();
        assert!(version.saved_through_owner);
    }
}
