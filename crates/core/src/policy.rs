// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Power policy data model: policies, policy metadata, and policy groups.

use crate::component::PowerComponent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reserved prefix for system policy ids. Vendor policies may not use it.
pub const SYSTEM_POLICY_PREFIX: &str = "system_power_policy_";

pub const POLICY_ID_ALL_ON: &str = "system_power_policy_all_on";
pub const POLICY_ID_INITIAL_ON: &str = "system_power_policy_initial_on";
pub const POLICY_ID_NO_USER_INTERACTION: &str = "system_power_policy_no_user_interaction";
pub const POLICY_ID_SUSPEND_PREP: &str = "system_power_policy_suspend_prep";

/// Components of the preemptive system policy that a vendor override may move
/// between the enabled and disabled sets.
pub const NO_USER_INTERACTION_CONFIGURABLE: [PowerComponent; 3] = [
    PowerComponent::Bluetooth,
    PowerComponent::Nfc,
    PowerComponent::TrustedDeviceDetection,
];

/// A named pair of component sets defining a target power state.
///
/// A component appears in at most one of {enabled, disabled}; components in
/// neither set are untouched when the policy is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPolicy {
    pub id: String,
    pub enabled: Vec<PowerComponent>,
    pub disabled: Vec<PowerComponent>,
    pub enabled_custom: Vec<i32>,
    pub disabled_custom: Vec<i32>,
}

impl PowerPolicy {
    pub fn new(
        id: impl Into<String>,
        enabled: Vec<PowerComponent>,
        disabled: Vec<PowerComponent>,
    ) -> Self {
        Self { id: id.into(), enabled, disabled, ..Default::default() }
    }

    /// Resolve a standard component against this policy.
    ///
    /// Returns `Some(true)` if enabled, `Some(false)` if disabled, `None` if
    /// the policy leaves the component untouched.
    pub fn state_of(&self, component: PowerComponent) -> Option<bool> {
        if self.enabled.contains(&component) {
            Some(true)
        } else if self.disabled.contains(&component) {
            Some(false)
        } else {
            None
        }
    }

    /// Resolve a custom component against this policy.
    pub fn state_of_custom(&self, id: i32) -> Option<bool> {
        if self.enabled_custom.contains(&id) {
            Some(true)
        } else if self.disabled_custom.contains(&id) {
            Some(false)
        } else {
            None
        }
    }

    /// Whether any component appears in both the enabled and disabled sets.
    pub fn has_conflict(&self) -> bool {
        self.enabled.iter().any(|c| self.disabled.contains(c))
            || self.enabled_custom.iter().any(|c| self.disabled_custom.contains(c))
    }

    pub fn is_system_policy(&self) -> bool {
        self.id.starts_with(SYSTEM_POLICY_PREFIX)
    }
}

impl fmt::Display for PowerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |v: &[PowerComponent]| {
            v.iter().map(|c| c.as_str().to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "{}: enabled=[{}], disabled=[{}]",
            self.id,
            names(&self.enabled),
            names(&self.disabled)
        )
    }
}

/// A registered policy together with its preemptive bit.
#[derive(Debug, Clone)]
pub struct PolicyMeta {
    pub policy: Arc<PowerPolicy>,
    pub is_preemptive: bool,
}

impl PolicyMeta {
    pub fn regular(policy: PowerPolicy) -> Self {
        Self { policy: Arc::new(policy), is_preemptive: false }
    }

    pub fn preemptive(policy: PowerPolicy) -> Self {
        Self { policy: Arc::new(policy), is_preemptive: true }
    }

    pub fn id(&self) -> &str {
        &self.policy.id
    }
}

/// Vehicle power states a policy group can map to a default policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    WaitForVhal,
    On,
}

impl PowerState {
    pub const ALL: [PowerState; 2] = [PowerState::WaitForVhal, PowerState::On];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::WaitForVhal => "WaitForVHAL",
            PowerState::On => "On",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial map from vehicle power state to the policy applied by default in
/// that state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyGroup {
    defaults: HashMap<PowerState, String>,
}

impl PolicyGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&mut self, state: PowerState, policy_id: impl Into<String>) {
        self.defaults.insert(state, policy_id.into());
    }

    pub fn default_for(&self, state: PowerState) -> Option<&str> {
        self.defaults.get(&state).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }
}

fn all_on() -> PowerPolicy {
    PowerPolicy::new(POLICY_ID_ALL_ON, PowerComponent::ALL.to_vec(), Vec::new())
}

fn initial_on() -> PowerPolicy {
    let enabled = vec![PowerComponent::Audio, PowerComponent::Display, PowerComponent::Cpu];
    let disabled =
        PowerComponent::ALL.iter().copied().filter(|c| !enabled.contains(c)).collect();
    PowerPolicy::new(POLICY_ID_INITIAL_ON, enabled, disabled)
}

fn no_user_interaction() -> PowerPolicy {
    PowerPolicy::new(
        POLICY_ID_NO_USER_INTERACTION,
        vec![
            PowerComponent::Wifi,
            PowerComponent::Cellular,
            PowerComponent::Ethernet,
            PowerComponent::TrustedDeviceDetection,
            PowerComponent::Cpu,
        ],
        vec![
            PowerComponent::Audio,
            PowerComponent::Media,
            PowerComponent::Display,
            PowerComponent::Bluetooth,
            PowerComponent::Projection,
            PowerComponent::Nfc,
            PowerComponent::Input,
            PowerComponent::VoiceInteraction,
            PowerComponent::VisualInteraction,
            PowerComponent::Location,
            PowerComponent::Microphone,
        ],
    )
}

fn suspend_prep() -> PowerPolicy {
    PowerPolicy::new(
        POLICY_ID_SUSPEND_PREP,
        Vec::new(),
        vec![
            PowerComponent::Audio,
            PowerComponent::Bluetooth,
            PowerComponent::Wifi,
            PowerComponent::Location,
            PowerComponent::Microphone,
            PowerComponent::Cpu,
        ],
    )
}

/// The built-in system policies. `no_user_interaction` and `suspend_prep`
/// are preemptive: applying one locks out non-forced regular policies until
/// cleared with a forced apply.
pub fn system_policies() -> Vec<PolicyMeta> {
    vec![
        PolicyMeta::regular(all_on()),
        PolicyMeta::regular(initial_on()),
        PolicyMeta::preemptive(no_user_interaction()),
        PolicyMeta::preemptive(suspend_prep()),
    ]
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
