// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accumulated component state.
//!
//! Applying a policy toggles only the components the policy names; everything
//! else keeps its previous state. The accumulated policy is the left-fold of
//! every applied policy over the initial all-disabled state.

use axle_core::{PowerComponent, PowerPolicy, ServiceError};
use std::collections::BTreeMap;

pub struct ComponentState {
    states: BTreeMap<u8, bool>,
    custom_states: BTreeMap<i32, bool>,
    last_policy_id: String,
}

fn index_of(component: PowerComponent) -> u8 {
    // ALL is the canonical order; position doubles as a stable sort key.
    PowerComponent::ALL
        .iter()
        .position(|c| *c == component)
        .unwrap_or_default() as u8
}

impl ComponentState {
    /// Initial state: every standard component disabled, no custom components.
    pub fn new() -> Self {
        let states =
            PowerComponent::ALL.iter().map(|c| (index_of(*c), false)).collect();
        Self { states, custom_states: BTreeMap::new(), last_policy_id: String::new() }
    }

    /// Fold one policy into the accumulated state.
    pub fn apply(&mut self, policy: &PowerPolicy) {
        for &component in &policy.enabled {
            self.states.insert(index_of(component), true);
        }
        for &component in &policy.disabled {
            self.states.insert(index_of(component), false);
        }
        for &id in &policy.enabled_custom {
            self.custom_states.insert(id, true);
        }
        for &id in &policy.disabled_custom {
            self.custom_states.insert(id, false);
        }
        self.last_policy_id = policy.id.clone();
    }

    pub fn state(&self, component: PowerComponent) -> bool {
        self.states.get(&index_of(component)).copied().unwrap_or(false)
    }

    pub fn custom_state(&self, id: i32) -> Result<bool, ServiceError> {
        self.custom_states
            .get(&id)
            .copied()
            .ok_or_else(|| ServiceError::invalid_argument(format!("unknown custom component {id}")))
    }

    /// The accumulated policy: enabled/disabled sets in canonical component
    /// order, id of the last applied policy.
    pub fn accumulated(&self) -> PowerPolicy {
        let mut policy = PowerPolicy { id: self.last_policy_id.clone(), ..Default::default() };
        for component in PowerComponent::ALL {
            if self.state(component) {
                policy.enabled.push(component);
            } else {
                policy.disabled.push(component);
            }
        }
        for (&id, &enabled) in &self.custom_states {
            if enabled {
                policy.enabled_custom.push(id);
            } else {
                policy.disabled_custom.push(id);
            }
        }
        policy
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "component_state_tests.rs"]
mod tests;
