// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axle_core::{POLICY_ID_ALL_ON, POLICY_ID_INITIAL_ON, POLICY_ID_SUSPEND_PREP};
use yare::parameterized;

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn builtins_are_registered_at_construction() {
    let catalog = PolicyCatalog::new();
    assert!(!catalog.get_policy(POLICY_ID_ALL_ON).unwrap().is_preemptive);
    assert!(!catalog.get_policy(POLICY_ID_INITIAL_ON).unwrap().is_preemptive);
    assert!(catalog.get_policy(POLICY_ID_NO_USER_INTERACTION).unwrap().is_preemptive);
    assert!(catalog.get_policy(POLICY_ID_SUSPEND_PREP).unwrap().is_preemptive);
    assert!(matches!(
        catalog.get_policy("vendor_unknown"),
        Err(CatalogError::PolicyNotFound(_))
    ));
}

#[test]
fn define_policy_round_trips_component_sets() {
    let mut catalog = PolicyCatalog::new();
    catalog
        .define_policy("vendor_media_off", &strings(&["AUDIO", "CPU"]), &strings(&["MEDIA"]))
        .unwrap();

    let meta = catalog.get_policy("vendor_media_off").unwrap();
    assert_eq!(meta.policy.enabled, vec![PowerComponent::Audio, PowerComponent::Cpu]);
    assert_eq!(meta.policy.disabled, vec![PowerComponent::Media]);
    assert!(!meta.is_preemptive);
}

#[test]
fn define_policy_accepts_numeric_custom_components() {
    let mut catalog = PolicyCatalog::new();
    catalog
        .define_policy("vendor_custom", &strings(&["1000"]), &strings(&["1001"]))
        .unwrap();
    let meta = catalog.get_policy("vendor_custom").unwrap();
    assert_eq!(meta.policy.enabled_custom, vec![1000]);
    assert_eq!(meta.policy.disabled_custom, vec![1001]);
}

#[parameterized(
    unknown_name = { "TURBO" },
    lowercase = { "audio" },
    below_minimum_custom = { "999" },
)]
fn define_policy_rejects_invalid_components(name: &str) {
    let mut catalog = PolicyCatalog::new();
    let err = catalog
        .define_policy("vendor_bad", &strings(&[name]), &[])
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidComponent(_)));
}

#[test]
fn define_policy_rejects_duplicates_and_conflicts() {
    let mut catalog = PolicyCatalog::new();
    catalog.define_policy("vendor_a", &strings(&["AUDIO"]), &[]).unwrap();
    assert!(matches!(
        catalog.define_policy("vendor_a", &strings(&["CPU"]), &[]),
        Err(CatalogError::AlreadyDefined(_))
    ));
    assert!(matches!(
        catalog.define_policy("vendor_b", &strings(&["AUDIO"]), &strings(&["AUDIO"])),
        Err(CatalogError::InvalidComponent(_))
    ));
}

#[test]
fn policy_group_requires_two_entries_and_known_policies() {
    let mut catalog = PolicyCatalog::new();
    catalog.define_policy("vendor_a", &strings(&["AUDIO"]), &[]).unwrap();

    assert!(matches!(
        catalog.define_policy_group("basic", &strings(&["vendor_a"])),
        Err(CatalogError::InvalidGroup(_))
    ));
    assert!(matches!(
        catalog.define_policy_group("basic", &strings(&["vendor_a", "vendor_missing"])),
        Err(CatalogError::PolicyNotFound(_))
    ));

    catalog.define_policy_group("basic", &strings(&["vendor_a", ""])).unwrap();
    assert!(catalog.is_group_available("basic"));

    let policy = catalog.default_for_state("basic", PowerState::WaitForVhal).unwrap();
    assert_eq!(policy.id, "vendor_a");
    assert!(matches!(
        catalog.default_for_state("basic", PowerState::On),
        Err(CatalogError::PolicyNotFound(_))
    ));
}

#[test]
fn empty_group_id_uses_default_group() {
    let mut catalog = PolicyCatalog::new();
    catalog.define_policy("vendor_a", &strings(&["AUDIO"]), &[]).unwrap();
    let vendor = VendorCatalog {
        policy_groups: vec![("mixed".to_string(), ["vendor_a".to_string(), String::new()])],
        default_policy_group: Some("mixed".to_string()),
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);

    assert_eq!(catalog.default_group_id(), "mixed");
    let policy = catalog.default_for_state("", PowerState::WaitForVhal).unwrap();
    assert_eq!(policy.id, "vendor_a");
}

#[test]
fn vendor_policies_resolve_other_components() {
    let mut catalog = PolicyCatalog::new();
    let vendor = VendorCatalog {
        custom_components: vec![1000, 1001],
        policies: vec![PolicyDefinition {
            id: "vendor_low_power".to_string(),
            enabled: vec![PowerComponent::Cpu],
            disabled: vec![PowerComponent::Display],
            enabled_custom: vec![1000],
            other_components: Some(OtherComponents::Off),
            ..Default::default()
        }],
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);

    let meta = catalog.get_policy("vendor_low_power").unwrap();
    assert_eq!(meta.policy.state_of(PowerComponent::Cpu), Some(true));
    assert_eq!(meta.policy.state_of(PowerComponent::Display), Some(false));
    // every unnamed standard component folded into disabled
    assert_eq!(meta.policy.state_of(PowerComponent::Audio), Some(false));
    assert_eq!(meta.policy.enabled.len() + meta.policy.disabled.len(), 16);
    // declared custom component 1001 folded too
    assert_eq!(meta.policy.state_of_custom(1001), Some(false));
    assert_eq!(meta.policy.state_of_custom(1000), Some(true));
}

#[test]
fn vendor_policy_with_reserved_prefix_is_rejected() {
    let mut catalog = PolicyCatalog::new();
    let vendor = VendorCatalog {
        policies: vec![PolicyDefinition {
            id: "system_power_policy_sneaky".to_string(),
            enabled: vec![PowerComponent::Audio],
            ..Default::default()
        }],
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);
    assert!(catalog.get_policy("system_power_policy_sneaky").is_err());
    // built-ins unaffected
    assert!(catalog.get_policy(POLICY_ID_ALL_ON).is_ok());
}

#[test]
fn vendor_policy_with_undeclared_custom_component_is_rejected() {
    let mut catalog = PolicyCatalog::new();
    let vendor = VendorCatalog {
        custom_components: vec![1000],
        policies: vec![PolicyDefinition {
            id: "vendor_bad_custom".to_string(),
            enabled_custom: vec![2000],
            ..Default::default()
        }],
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);
    assert!(catalog.get_policy("vendor_bad_custom").is_err());
}

#[test]
fn system_policy_override_merges_configurable_components() {
    let mut catalog = PolicyCatalog::new();
    let vendor = VendorCatalog {
        system_policy_overrides: vec![PolicyDefinition {
            id: POLICY_ID_NO_USER_INTERACTION.to_string(),
            enabled: vec![PowerComponent::Bluetooth, PowerComponent::Nfc],
            disabled: vec![PowerComponent::TrustedDeviceDetection],
            ..Default::default()
        }],
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);

    let meta = catalog.get_policy(POLICY_ID_NO_USER_INTERACTION).unwrap();
    assert_eq!(meta.policy.state_of(PowerComponent::Bluetooth), Some(true));
    assert_eq!(meta.policy.state_of(PowerComponent::Nfc), Some(true));
    assert_eq!(meta.policy.state_of(PowerComponent::TrustedDeviceDetection), Some(false));
    // untouched parts of the built-in remain
    assert_eq!(meta.policy.state_of(PowerComponent::Wifi), Some(true));
    assert_eq!(meta.policy.state_of(PowerComponent::Display), Some(false));
    assert!(!meta.policy.has_conflict());
}

#[test]
fn system_policy_override_rejects_non_configurable_components() {
    let mut catalog = PolicyCatalog::new();
    let vendor = VendorCatalog {
        system_policy_overrides: vec![PolicyDefinition {
            id: POLICY_ID_NO_USER_INTERACTION.to_string(),
            enabled: vec![PowerComponent::Display],
            ..Default::default()
        }],
        ..Default::default()
    };
    catalog.load_vendor_catalog(&vendor);

    let meta = catalog.get_policy(POLICY_ID_NO_USER_INTERACTION).unwrap();
    assert_eq!(meta.policy.state_of(PowerComponent::Display), Some(false));
}

#[test]
fn registered_policies_keep_registration_order() {
    let mut catalog = PolicyCatalog::new();
    catalog.define_policy("vendor_a", &strings(&["AUDIO"]), &[]).unwrap();
    catalog.define_policy("vendor_b", &strings(&["CPU"]), &[]).unwrap();

    let ids: Vec<String> =
        catalog.registered_policies().iter().map(|p| p.id.clone()).collect();
    let pos_a = ids.iter().position(|id| id == "vendor_a").unwrap();
    let pos_b = ids.iter().position(|id| id == "vendor_b").unwrap();
    assert!(pos_a < pos_b);
    // preemptive policies listed after regular ones
    let pos_nui = ids.iter().position(|id| id == POLICY_ID_NO_USER_INTERACTION).unwrap();
    assert!(pos_b < pos_nui);
}

#[test]
fn dump_mentions_registered_state() {
    let mut catalog = PolicyCatalog::new();
    catalog.define_policy("vendor_a", &strings(&["AUDIO"]), &[]).unwrap();
    let dump = catalog.dump();
    assert!(dump.contains("vendor_a"));
    assert!(dump.contains("Preemptive power policies:"));
}
