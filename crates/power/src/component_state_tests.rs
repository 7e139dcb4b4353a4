// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn initial_state_is_all_disabled() {
    let state = ComponentState::new();
    for component in PowerComponent::ALL {
        assert!(!state.state(component));
    }
    let accumulated = state.accumulated();
    assert!(accumulated.enabled.is_empty());
    assert_eq!(accumulated.disabled.len(), 16);
    assert!(accumulated.id.is_empty());
}

#[test]
fn apply_toggles_only_named_components() {
    let mut state = ComponentState::new();
    state.apply(&PowerPolicy::new(
        "vendor_a",
        vec![PowerComponent::Audio, PowerComponent::Display],
        vec![],
    ));
    state.apply(&PowerPolicy::new(
        "vendor_b",
        vec![PowerComponent::Cpu],
        vec![PowerComponent::Audio],
    ));

    assert!(!state.state(PowerComponent::Audio));
    assert!(state.state(PowerComponent::Display));
    assert!(state.state(PowerComponent::Cpu));
    assert!(!state.state(PowerComponent::Media));
    assert_eq!(state.accumulated().id, "vendor_b");
}

#[test]
fn custom_components_appear_once_applied() {
    let mut state = ComponentState::new();
    assert!(state.custom_state(1000).is_err());

    state.apply(&PowerPolicy {
        id: "vendor_custom".to_string(),
        enabled_custom: vec![1000],
        disabled_custom: vec![1001],
        ..Default::default()
    });
    assert_eq!(state.custom_state(1000).unwrap(), true);
    assert_eq!(state.custom_state(1001).unwrap(), false);

    let accumulated = state.accumulated();
    assert_eq!(accumulated.enabled_custom, vec![1000]);
    assert_eq!(accumulated.disabled_custom, vec![1001]);
}

#[test]
fn accumulated_partitions_every_standard_component() {
    let mut state = ComponentState::new();
    state.apply(&PowerPolicy::new("vendor_a", vec![PowerComponent::Wifi], vec![]));
    let accumulated = state.accumulated();
    assert_eq!(accumulated.enabled.len() + accumulated.disabled.len(), 16);
    assert!(!accumulated.has_conflict());
}

fn arb_component() -> impl Strategy<Value = PowerComponent> {
    (0usize..16).prop_map(|i| PowerComponent::ALL[i])
}

fn arb_policy() -> impl Strategy<Value = PowerPolicy> {
    (
        proptest::collection::vec(arb_component(), 0..6),
        proptest::collection::vec(arb_component(), 0..6),
    )
        .prop_map(|(enabled, mut disabled)| {
            // keep the at-most-one-set invariant
            disabled.retain(|c| !enabled.contains(c));
            PowerPolicy::new("prop_policy", enabled, disabled)
        })
}

proptest! {
    // The accumulated state equals the left-fold of apply over the initial
    // all-disabled state.
    #[test]
    fn accumulated_equals_left_fold(policies in proptest::collection::vec(arb_policy(), 0..12)) {
        let mut state = ComponentState::new();
        let mut expected: std::collections::HashMap<PowerComponent, bool> =
            PowerComponent::ALL.iter().map(|c| (*c, false)).collect();

        for policy in &policies {
            state.apply(policy);
            for c in &policy.enabled {
                expected.insert(*c, true);
            }
            for c in &policy.disabled {
                expected.insert(*c, false);
            }
        }

        for component in PowerComponent::ALL {
            prop_assert_eq!(state.state(component), expected[&component]);
        }
    }
}
