// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! axle-power: the power policy coordinator daemon core.
//!
//! Owns the mapping from abstract power policies to component on/off state
//! from boot until the application framework takes over: policy catalog,
//! accumulated component state, the locked/pending/preemptive apply state
//! machine, silent-mode handling, and the VHAL bridge.

pub mod bridge;
pub mod catalog;
pub mod component_state;
pub mod coordinator;
pub mod message;
pub mod observer;
pub mod server;
pub mod silent;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::VhalBridge;
pub use catalog::{CatalogError, OtherComponents, PolicyCatalog, PolicyDefinition, VendorCatalog};
pub use component_state::ComponentState;
pub use coordinator::{PolicyCoordinator, PolicyDelegate, PolicyState};
pub use message::PowerMessage;
pub use observer::{ObserverEntry, PolicyObserver};
pub use server::{PowerConfig, PowerServer};
pub use silent::{SilentModeSink, SilentModeWatcher};
