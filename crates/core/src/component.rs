// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Power component enumeration.
//!
//! Standard components are a closed set. Vendors may additionally declare
//! custom components, which are plain integers at or above
//! [`MIN_CUSTOM_COMPONENT`] so they can never collide with the standard set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest value a vendor-declared custom component may take.
pub const MIN_CUSTOM_COMPONENT: i32 = 1000;

/// A standard power-managed component of the vehicle platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerComponent {
    Audio,
    Media,
    Display,
    Bluetooth,
    Wifi,
    Cellular,
    Ethernet,
    Projection,
    Nfc,
    Input,
    VoiceInteraction,
    VisualInteraction,
    TrustedDeviceDetection,
    Location,
    Microphone,
    Cpu,
}

impl PowerComponent {
    /// All standard components, in canonical order.
    pub const ALL: [PowerComponent; 16] = [
        PowerComponent::Audio,
        PowerComponent::Media,
        PowerComponent::Display,
        PowerComponent::Bluetooth,
        PowerComponent::Wifi,
        PowerComponent::Cellular,
        PowerComponent::Ethernet,
        PowerComponent::Projection,
        PowerComponent::Nfc,
        PowerComponent::Input,
        PowerComponent::VoiceInteraction,
        PowerComponent::VisualInteraction,
        PowerComponent::TrustedDeviceDetection,
        PowerComponent::Location,
        PowerComponent::Microphone,
        PowerComponent::Cpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerComponent::Audio => "AUDIO",
            PowerComponent::Media => "MEDIA",
            PowerComponent::Display => "DISPLAY",
            PowerComponent::Bluetooth => "BLUETOOTH",
            PowerComponent::Wifi => "WIFI",
            PowerComponent::Cellular => "CELLULAR",
            PowerComponent::Ethernet => "ETHERNET",
            PowerComponent::Projection => "PROJECTION",
            PowerComponent::Nfc => "NFC",
            PowerComponent::Input => "INPUT",
            PowerComponent::VoiceInteraction => "VOICE_INTERACTION",
            PowerComponent::VisualInteraction => "VISUAL_INTERACTION",
            PowerComponent::TrustedDeviceDetection => "TRUSTED_DEVICE_DETECTION",
            PowerComponent::Location => "LOCATION",
            PowerComponent::Microphone => "MICROPHONE",
            PowerComponent::Cpu => "CPU",
        }
    }

    /// Parse a canonical component name.
    pub fn from_name(name: &str) -> Option<PowerComponent> {
        PowerComponent::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for PowerComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `id` is in the value space reserved for custom components.
pub fn is_valid_custom_component(id: i32) -> bool {
    id >= MIN_CUSTOM_COMPONENT
}

#[cfg(test)]
#[path = "component_tests.rs"]
mod tests;
