// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy catalog: registered power policies, policy groups, and the vendor
//! catalog ingestion rules.
//!
//! Regular policies (built-in non-preemptive ones plus vendor and runtime
//! definitions) and preemptive policies live in separate registries; lookups
//! search regular first. A malformed vendor catalog leaves the built-ins in
//! place and rejects only the offending entries.

use axle_core::{
    is_valid_custom_component, system_policies, PolicyGroup, PolicyMeta, PowerComponent,
    PowerPolicy, PowerState, ServiceError, NO_USER_INTERACTION_CONFIGURABLE,
    POLICY_ID_NO_USER_INTERACTION, SYSTEM_POLICY_PREFIX,
};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("power policy {0} is already registered")]
    AlreadyDefined(String),
    #[error("invalid power component: {0}")]
    InvalidComponent(String),
    #[error("power policy {0} is not found")]
    PolicyNotFound(String),
    #[error("power policy group {0} is not found")]
    GroupNotFound(String),
    #[error("invalid power policy group: {0}")]
    InvalidGroup(String),
    #[error("policy id {0} may not use the system policy prefix")]
    ReservedPrefix(String),
    #[error("system policy override is not allowed: {0}")]
    InvalidOverride(String),
}

impl From<CatalogError> for ServiceError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::PolicyNotFound(_) | CatalogError::GroupNotFound(_) => {
                ServiceError::NotFound(error.to_string())
            }
            _ => ServiceError::InvalidArgument(error.to_string()),
        }
    }
}

/// Behavior for components a policy definition does not name explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherComponents {
    On,
    Off,
    Untouched,
}

/// One policy definition from the vendor catalog, before resolution.
#[derive(Debug, Clone, Default)]
pub struct PolicyDefinition {
    pub id: String,
    pub enabled: Vec<PowerComponent>,
    pub disabled: Vec<PowerComponent>,
    pub enabled_custom: Vec<i32>,
    pub disabled_custom: Vec<i32>,
    /// How components absent from the explicit sets are folded in.
    pub other_components: Option<OtherComponents>,
}

/// A pre-parsed vendor policy file.
///
/// The XML-to-value step happens outside the daemon; this is the contract the
/// catalog consumes.
#[derive(Debug, Clone, Default)]
pub struct VendorCatalog {
    pub custom_components: Vec<i32>,
    pub policies: Vec<PolicyDefinition>,
    /// Overrides merged into `no_user_interaction`; only the configurable
    /// component subset may appear.
    pub system_policy_overrides: Vec<PolicyDefinition>,
    /// group id -> [policy for WaitForVHAL, policy for On]; empty entry means
    /// unset for that state.
    pub policy_groups: Vec<(String, [String; 2])>,
    pub default_policy_group: Option<String>,
}

/// Holds registered policies and groups; answers lookups.
pub struct PolicyCatalog {
    regular: IndexMap<String, Arc<PowerPolicy>>,
    preemptive: IndexMap<String, Arc<PowerPolicy>>,
    groups: IndexMap<String, PolicyGroup>,
    default_group: String,
    custom_components: BTreeSet<i32>,
}

impl PolicyCatalog {
    /// Catalog with only the built-in system policies registered.
    pub fn new() -> Self {
        let mut regular = IndexMap::new();
        let mut preemptive = IndexMap::new();
        for meta in system_policies() {
            let registry = if meta.is_preemptive { &mut preemptive } else { &mut regular };
            registry.insert(meta.id().to_string(), Arc::clone(&meta.policy));
        }
        Self {
            regular,
            preemptive,
            groups: IndexMap::new(),
            default_group: String::new(),
            custom_components: BTreeSet::new(),
        }
    }

    /// Look up a policy by id, searching regular policies first.
    pub fn get_policy(&self, policy_id: &str) -> Result<PolicyMeta, CatalogError> {
        if let Some(policy) = self.regular.get(policy_id) {
            return Ok(PolicyMeta { policy: Arc::clone(policy), is_preemptive: false });
        }
        if let Some(policy) = self.preemptive.get(policy_id) {
            return Ok(PolicyMeta { policy: Arc::clone(policy), is_preemptive: true });
        }
        Err(CatalogError::PolicyNotFound(policy_id.to_string()))
    }

    /// The default policy for `state` in the given group. An empty `group_id`
    /// selects the stored default group.
    pub fn default_for_state(
        &self,
        group_id: &str,
        state: PowerState,
    ) -> Result<Arc<PowerPolicy>, CatalogError> {
        let group_id = if group_id.is_empty() { &self.default_group } else { group_id };
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| CatalogError::GroupNotFound(group_id.to_string()))?;
        let policy_id = group
            .default_for(state)
            .ok_or_else(|| CatalogError::PolicyNotFound(format!("policy for {state}")))?;
        Ok(Arc::clone(&self.get_policy(policy_id)?.policy))
    }

    pub fn is_group_available(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    pub fn default_group_id(&self) -> &str {
        &self.default_group
    }

    /// Define a policy at runtime from component name strings. Accepts
    /// standard component names and numeric custom component ids.
    pub fn define_policy(
        &mut self,
        policy_id: &str,
        enabled: &[String],
        disabled: &[String],
    ) -> Result<(), CatalogError> {
        if self.regular.contains_key(policy_id) {
            return Err(CatalogError::AlreadyDefined(policy_id.to_string()));
        }
        let mut policy = PowerPolicy { id: policy_id.to_string(), ..Default::default() };
        for name in enabled {
            match parse_component(name)? {
                ParsedComponent::Standard(c) => policy.enabled.push(c),
                ParsedComponent::Custom(id) => policy.enabled_custom.push(id),
            }
        }
        for name in disabled {
            match parse_component(name)? {
                ParsedComponent::Standard(c) => policy.disabled.push(c),
                ParsedComponent::Custom(id) => policy.disabled_custom.push(id),
            }
        }
        if policy.has_conflict() {
            return Err(CatalogError::InvalidComponent(format!(
                "policy {policy_id} lists a component as both enabled and disabled"
            )));
        }
        self.regular.insert(policy_id.to_string(), Arc::new(policy));
        Ok(())
    }

    /// Define a policy group. Exactly two entries: the WaitForVHAL policy and
    /// the On policy. An empty entry leaves that state unset; a non-empty
    /// entry must name a registered policy.
    pub fn define_policy_group(
        &mut self,
        group_id: &str,
        policy_per_state: &[String],
    ) -> Result<(), CatalogError> {
        if self.is_group_available(group_id) {
            return Err(CatalogError::AlreadyDefined(group_id.to_string()));
        }
        if policy_per_state.len() != 2 {
            return Err(CatalogError::InvalidGroup(
                "power policies for both WaitForVHAL and On should be given".to_string(),
            ));
        }
        let mut group = PolicyGroup::new();
        for (state, policy_id) in PowerState::ALL.iter().zip(policy_per_state) {
            if policy_id.is_empty() {
                continue;
            }
            self.get_policy(policy_id)?;
            group.set_default(*state, policy_id.clone());
        }
        self.groups.insert(group_id.to_string(), group);
        Ok(())
    }

    /// Ingest a pre-parsed vendor catalog.
    ///
    /// Per-entry failures reject that entry and continue; the built-in system
    /// policies always survive.
    pub fn load_vendor_catalog(&mut self, catalog: &VendorCatalog) {
        for &id in &catalog.custom_components {
            if !is_valid_custom_component(id) {
                tracing::warn!(id, "ignoring custom component below the minimum value");
                continue;
            }
            self.custom_components.insert(id);
        }

        for definition in &catalog.policies {
            if let Err(e) = self.register_vendor_policy(definition) {
                tracing::warn!(policy = %definition.id, error = %e, "rejecting vendor policy");
            }
        }

        for (group_id, per_state) in &catalog.policy_groups {
            if let Err(e) = self.define_policy_group(group_id, per_state.as_slice()) {
                tracing::warn!(group = %group_id, error = %e, "rejecting vendor policy group");
            }
        }
        if let Some(default_group) = &catalog.default_policy_group {
            if self.is_group_available(default_group) {
                self.default_group = default_group.clone();
            } else {
                tracing::warn!(group = %default_group, "default policy group is not registered");
            }
        }

        for definition in &catalog.system_policy_overrides {
            if let Err(e) = self.apply_system_policy_override(definition) {
                tracing::warn!(policy = %definition.id, error = %e, "rejecting system policy override");
            }
        }
    }

    fn register_vendor_policy(&mut self, definition: &PolicyDefinition) -> Result<(), CatalogError> {
        if definition.id.starts_with(SYSTEM_POLICY_PREFIX) {
            return Err(CatalogError::ReservedPrefix(definition.id.clone()));
        }
        if self.regular.contains_key(&definition.id) {
            return Err(CatalogError::AlreadyDefined(definition.id.clone()));
        }
        for &id in definition.enabled_custom.iter().chain(&definition.disabled_custom) {
            if !self.custom_components.contains(&id) {
                return Err(CatalogError::InvalidComponent(format!(
                    "custom component {id} is not declared"
                )));
            }
        }
        let policy = self.resolve_definition(definition)?;
        self.regular.insert(definition.id.clone(), Arc::new(policy));
        Ok(())
    }

    /// Fold the `other_components` directive into explicit sets.
    fn resolve_definition(&self, definition: &PolicyDefinition) -> Result<PowerPolicy, CatalogError> {
        let mut policy = PowerPolicy {
            id: definition.id.clone(),
            enabled: definition.enabled.clone(),
            disabled: definition.disabled.clone(),
            enabled_custom: definition.enabled_custom.clone(),
            disabled_custom: definition.disabled_custom.clone(),
        };
        if policy.has_conflict() {
            return Err(CatalogError::InvalidComponent(format!(
                "policy {} lists a component as both enabled and disabled",
                policy.id
            )));
        }
        match definition.other_components {
            None | Some(OtherComponents::Untouched) => {}
            Some(behavior) => {
                let target_enabled = behavior == OtherComponents::On;
                for component in PowerComponent::ALL {
                    if policy.state_of(component).is_none() {
                        if target_enabled {
                            policy.enabled.push(component);
                        } else {
                            policy.disabled.push(component);
                        }
                    }
                }
                for &id in &self.custom_components {
                    if policy.state_of_custom(id).is_none() {
                        if target_enabled {
                            policy.enabled_custom.push(id);
                        } else {
                            policy.disabled_custom.push(id);
                        }
                    }
                }
            }
        }
        Ok(policy)
    }

    /// Merge an override into `no_user_interaction`. Only the configurable
    /// component subset may be moved between sets.
    fn apply_system_policy_override(
        &mut self,
        definition: &PolicyDefinition,
    ) -> Result<(), CatalogError> {
        if definition.id != POLICY_ID_NO_USER_INTERACTION {
            return Err(CatalogError::InvalidOverride(format!(
                "only {POLICY_ID_NO_USER_INTERACTION} accepts overrides, got {}",
                definition.id
            )));
        }
        for component in definition.enabled.iter().chain(&definition.disabled) {
            if !NO_USER_INTERACTION_CONFIGURABLE.contains(component) {
                return Err(CatalogError::InvalidOverride(format!(
                    "component {component} is not configurable"
                )));
            }
        }
        let current = self
            .preemptive
            .get(POLICY_ID_NO_USER_INTERACTION)
            .ok_or_else(|| CatalogError::PolicyNotFound(POLICY_ID_NO_USER_INTERACTION.into()))?;
        let mut merged = PowerPolicy::clone(current);
        for &component in &definition.enabled {
            merged.disabled.retain(|c| *c != component);
            if !merged.enabled.contains(&component) {
                merged.enabled.push(component);
            }
        }
        for &component in &definition.disabled {
            merged.enabled.retain(|c| *c != component);
            if !merged.disabled.contains(&component) {
                merged.disabled.push(component);
            }
        }
        self.preemptive
            .insert(POLICY_ID_NO_USER_INTERACTION.to_string(), Arc::new(merged));
        Ok(())
    }

    /// Every registered policy, regular first, in registration order.
    pub fn registered_policies(&self) -> Vec<Arc<PowerPolicy>> {
        self.regular.values().chain(self.preemptive.values()).map(Arc::clone).collect()
    }

    pub fn custom_component_ids(&self) -> Vec<i32> {
        self.custom_components.iter().copied().collect()
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Registered power policies:");
        for policy in self.regular.values() {
            let _ = writeln!(out, "  {policy}");
        }
        let _ = writeln!(out, "Preemptive power policies:");
        for policy in self.preemptive.values() {
            let _ = writeln!(out, "  {policy}");
        }
        let _ = writeln!(out, "Policy groups: {}", self.groups.keys().cloned().collect::<Vec<_>>().join(", "));
        let _ = writeln!(out, "Default policy group: {}", self.default_group);
        let _ = writeln!(
            out,
            "Custom components: {}",
            self.custom_components.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
        );
        out
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::new()
    }
}

enum ParsedComponent {
    Standard(PowerComponent),
    Custom(i32),
}

fn parse_component(name: &str) -> Result<ParsedComponent, CatalogError> {
    if let Some(component) = PowerComponent::from_name(name) {
        return Ok(ParsedComponent::Standard(component));
    }
    if let Ok(id) = name.parse::<i32>() {
        if is_valid_custom_component(id) {
            return Ok(ParsedComponent::Custom(id));
        }
    }
    Err(CatalogError::InvalidComponent(name.to_string()))
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
