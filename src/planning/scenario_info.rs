//! Scenario ownership and the copy-on-write fork.
//!
//! A planning state works either as the *owner* of the version it edits
//! or on a version inherited from a parent scenario. The non-owner case
//! forks a fresh version the moment the state is built, snapshotting
//! the day assignments that existed before the fork so later reads can
//! filter them out. After the first successful commit a forked state
//! promotes itself to owner and keeps behaving as one.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{PlanningError, Result};
use crate::models::{DayAssignment, Order, OrderVersion, Resource, Scenario, VersionInfo};
use crate::planning::sync::{self, TaskSourcePersistence};
use crate::stores::Stores;

/// How day assignments are read back from a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentsOnResource {
    /// Every assignment the resource carries.
    AllResourceAssignments,
    /// Everything except the assignments that predate a fork.
    AvoidStaleAssignments {
        /// Ids of the assignments captured before the fork.
        previous: HashSet<String>,
    },
}

impl AssignmentsOnResource {
    /// The assignments of `resource` visible under this calculator.
    pub fn assignments(&self, resource: &Resource) -> Vec<DayAssignment> {
        match self {
            Self::AllResourceAssignments => resource.assignments.clone(),
            Self::AvoidStaleAssignments { previous } => resource
                .assignments
                .iter()
                .filter(|a| !previous.contains(&a.id))
                .cloned()
                .collect(),
        }
    }
}

/// Ownership state of a planning session over its version.
#[derive(Debug, Clone)]
enum Ownership {
    /// The bound scenario owns the version; saves write in place.
    Owner,
    /// The version was forked off a parent scenario's data; the first
    /// save publishes `new_version` to the scenario tree.
    Derived { new_version: OrderVersion },
}

/// Scenario binding of a planning session: which scenario the edits
/// belong to, whether that scenario owns the version, and how resource
/// assignments are read back.
#[derive(Debug, Clone)]
pub struct ScenarioInfo {
    scenario: Scenario,
    ownership: Ownership,
    calculator: AssignmentsOnResource,
}

impl ScenarioInfo {
    /// Binds `order` to `current`, forking a fresh version when the
    /// scenario does not own the one it reads.
    ///
    /// The fork rewrites the order's scheduling facts into the new
    /// version, moves every allocation and day assignment onto the
    /// current scenario, and snapshots the pre-fork assignment ids so
    /// they can be excluded from later reads.
    pub(crate) fn build(order: &mut Order, current: &Scenario) -> Result<Self> {
        if current.id.is_empty() {
            return Err(PlanningError::Precondition("scenario id must not be empty"));
        }
        if order.id.is_empty() {
            return Err(PlanningError::Precondition("order id must not be empty"));
        }

        if order.is_using_the_owner_scenario() {
            return Ok(Self {
                scenario: current.clone(),
                ownership: Ownership::Owner,
                calculator: AssignmentsOnResource::AllResourceAssignments,
            });
        }

        let previous: HashSet<String> = order
            .day_assignments()
            .iter()
            .map(|a| a.id.clone())
            .collect();

        let new_version = OrderVersion::initial_version(current);
        info!(
            order = %order.id,
            scenario = %current.id,
            version = %new_version.id,
            "forking order version for non-owner scenario"
        );
        order.write_scheduling_data_changes_to(current.id.clone(), new_version.clone());
        if let Some(root) = order.root.as_mut() {
            for child in &mut root.children {
                child.for_each_allocation_mut(&mut |allocation| {
                    allocation.switch_to_scenario(&current.id);
                });
            }
        }

        Ok(Self {
            scenario: current.clone(),
            ownership: Ownership::Derived { new_version },
            calculator: AssignmentsOnResource::AvoidStaleAssignments { previous },
        })
    }

    /// Whether the bound scenario owns the version being edited.
    pub fn is_using_the_owner_scenario(&self) -> bool {
        matches!(self.ownership, Ownership::Owner)
    }

    /// The scenario the session's edits belong to.
    pub fn current_scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// How resource assignments are read back under this binding.
    pub fn assignments_calculator(&self) -> &AssignmentsOnResource {
        &self.calculator
    }

    /// Writes versioning bookkeeping as part of a save.
    pub(crate) fn save_versioning_info(&mut self, order: &mut Order, stores: &Stores) -> Result<()> {
        match &self.ownership {
            Ownership::Owner => self.save_as_owner(order, stores),
            Ownership::Derived { new_version } => {
                let new_version = new_version.clone();
                self.save_as_derived(order, stores, new_version)
            }
        }
    }

    fn save_as_owner(&mut self, order: &mut Order, stores: &Stores) -> Result<()> {
        let info = order
            .current_version_info()
            .cloned()
            .ok_or_else(|| PlanningError::illegal_state("saving an order with no bound version"))?;
        if !info.version.is_owned_by(&self.scenario.id) {
            return Err(PlanningError::illegal_state(format!(
                "scenario {} is not the owner of version {}",
                self.scenario.id, info.version.id
            )));
        }

        let mut version = info.version;
        version.saving_through_owner();
        if order.new_object {
            // A brand-new order: scenarios derived from this one have
            // no version for it yet and must adopt this one.
            stores.scenarios.update_derived_scenarios_with_new_version(
                None,
                &order.id,
                &self.scenario.id,
                &version,
            );
        }
        order.set_version_for_scenario(self.scenario.id.clone(), version.clone());
        order.current = Some(VersionInfo {
            scenario_id: self.scenario.id.clone(),
            version,
        });

        let actions = sync::synchronizations_needed(order);
        debug!(order = %order.id, actions = actions.len(), "saving through owner scenario");
        if order.new_object {
            sync::apply(
                order,
                actions,
                &TaskSourcePersistence::persist_but_keep_orphans(stores.task_sources.as_ref()),
            );
        } else {
            sync::apply(
                order,
                actions,
                &TaskSourcePersistence::persist(stores.task_sources.as_ref()),
            );
        }
        order.write_scheduling_data_changes();
        Ok(())
    }

    fn save_as_derived(
        &mut self,
        order: &mut Order,
        stores: &Stores,
        new_version: OrderVersion,
    ) -> Result<()> {
        let bound = order
            .current_version_info()
            .ok_or_else(|| PlanningError::illegal_state("saving an order with no bound version"))?;
        if bound.version.id != new_version.id {
            return Err(PlanningError::illegal_state(
                "the forked version is no longer the one the order is bound to",
            ));
        }

        for source in order.all_task_sources_bottom_up() {
            stores.task_sources.reattach_source(source);
        }

        let previous = self.scenario.order_version(&order.id).cloned();
        self.scenario
            .set_order_version(order.id.clone(), new_version.clone());
        stores.scenarios.update_derived_scenarios_with_new_version(
            previous.as_ref().map(|v| v.id.as_str()),
            &order.id,
            &self.scenario.id,
            &new_version,
        );

        let actions = sync::synchronizations_needed(order);
        debug!(
            order = %order.id,
            version = %new_version.id,
            actions = actions.len(),
            "first save of forked version"
        );
        // Inherited task sources must survive for the parent scenario.
        sync::apply(
            order,
            actions,
            &TaskSourcePersistence::persist_but_keep_orphans(stores.task_sources.as_ref()),
        );
        order.write_scheduling_data_changes();
        Ok(())
    }

    /// Promotes a forked binding to owner after a successful commit.
    /// The stale-assignment filter is kept: pre-fork assignments stay
    /// invisible for the rest of the session.
    pub(crate) fn after_commit(&mut self) {
        if let Ownership::Derived { new_version } = &self.ownership {
            info!(
                scenario = %self.scenario.id,
                version = %new_version.id,
                "promoting forked session to owner"
            );
            self.ownership = Ownership::Owner;
        }
    }
}
