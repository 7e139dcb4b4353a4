// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn all_lists_every_component_once() {
    let mut seen = std::collections::HashSet::new();
    for c in PowerComponent::ALL {
        assert!(seen.insert(c), "duplicate component {c}");
    }
    assert_eq!(seen.len(), 16);
}

#[parameterized(
    audio = { PowerComponent::Audio, "AUDIO" },
    voice = { PowerComponent::VoiceInteraction, "VOICE_INTERACTION" },
    tdd = { PowerComponent::TrustedDeviceDetection, "TRUSTED_DEVICE_DETECTION" },
    cpu = { PowerComponent::Cpu, "CPU" },
)]
fn name_round_trips(component: PowerComponent, name: &str) {
    assert_eq!(component.as_str(), name);
    assert_eq!(PowerComponent::from_name(name), Some(component));
}

#[test]
fn from_name_rejects_unknown() {
    assert_eq!(PowerComponent::from_name("TURBO_ENCABULATOR"), None);
    assert_eq!(PowerComponent::from_name("audio"), None);
}

#[parameterized(
    minimum = { 1000, true },
    above = { 1234, true },
    below = { 999, false },
    negative = { -1, false },
)]
fn custom_component_range(id: i32, valid: bool) {
    assert_eq!(is_valid_custom_component(id), valid);
}

#[test]
fn serde_uses_canonical_names() {
    let json = serde_json::to_string(&PowerComponent::TrustedDeviceDetection).unwrap();
    assert_eq!(json, "\"TRUSTED_DEVICE_DETECTION\"");
    let back: PowerComponent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, PowerComponent::TrustedDeviceDetection);
}
