// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vehicle HAL client seam.
//!
//! Mirrors the subset of the platform VHAL client library the daemons
//! consume: typed property values, subscription with a listener callback,
//! synchronous sets, and an on-death callback. Connection itself goes through
//! [`VhalConnector`] so the daemons' retry loops can be driven in tests.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// VHAL properties consumed or produced by the daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VhalProperty {
    /// Policy request from the vehicle side (string, subscribe).
    PowerPolicyReq,
    /// Policy-group request from the vehicle side (string, subscribe).
    PowerPolicyGroupReq,
    /// Mirror of the currently applied policy id (string, set).
    CurrentPowerPolicy,
    /// Monotonically increasing liveness counter from the VHAL (int64, subscribe).
    VhalHeartbeat,
    /// Watchdog liveness report, system uptime in ms (int64, set).
    WatchdogAlive,
    /// Terminated-process report: reason code + command line (int32 + string, set).
    WatchdogTerminatedProcess,
}

impl VhalProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            VhalProperty::PowerPolicyReq => "POWER_POLICY_REQ",
            VhalProperty::PowerPolicyGroupReq => "POWER_POLICY_GROUP_REQ",
            VhalProperty::CurrentPowerPolicy => "CURRENT_POWER_POLICY",
            VhalProperty::VhalHeartbeat => "VHAL_HEARTBEAT",
            VhalProperty::WatchdogAlive => "WATCHDOG_ALIVE",
            VhalProperty::WatchdogTerminatedProcess => "WATCHDOG_TERMINATED_PROCESS",
        }
    }
}

impl fmt::Display for VhalProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed VHAL property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropValue {
    pub prop: VhalProperty,
    pub int32s: Vec<i32>,
    pub int64s: Vec<i64>,
    pub string: String,
}

impl PropValue {
    pub fn string_value(prop: VhalProperty, value: impl Into<String>) -> Self {
        Self { prop, int32s: Vec::new(), int64s: Vec::new(), string: value.into() }
    }

    pub fn int64_value(prop: VhalProperty, value: i64) -> Self {
        Self { prop, int32s: Vec::new(), int64s: vec![value], string: String::new() }
    }

    pub fn first_int64(&self) -> Option<i64> {
        self.int64s.first().copied()
    }
}

#[derive(Debug, Clone, Error)]
pub enum VhalError {
    #[error("VHAL is not available: {0}")]
    Unavailable(String),
    #[error("VHAL does not support {0}")]
    UnsupportedProperty(VhalProperty),
    #[error("VHAL call failed: {0}")]
    Call(String),
}

/// Receives property-change events for subscribed properties.
pub trait VhalListener: Send + Sync {
    fn on_property_event(&self, values: &[PropValue]);
}

pub type DeathCallback = Arc<dyn Fn() + Send + Sync>;

/// A connected VHAL client.
pub trait VhalClient: Send + Sync {
    /// Probe whether the VHAL exports a property config for `prop`.
    fn supports(&self, prop: VhalProperty) -> bool;

    fn subscribe(
        &self,
        props: &[VhalProperty],
        listener: Arc<dyn VhalListener>,
    ) -> Result<(), VhalError>;

    fn unsubscribe(&self, props: &[VhalProperty]) -> Result<(), VhalError>;

    /// Synchronous property set.
    fn set_value(&self, value: PropValue) -> Result<(), VhalError>;

    /// Register a callback invoked when the VHAL process dies.
    fn add_death_callback(&self, callback: DeathCallback);
}

/// Creates VHAL client connections. Each call is one connection attempt.
pub trait VhalConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn VhalClient>, VhalError>;
}

/// Connector for hosts with no vehicle transport linked in.
///
/// Every attempt fails, so the daemons' connect loops run their full retry
/// budget and give up, leaving the rest of the service operational.
pub struct DisconnectedVhal;

impl VhalConnector for DisconnectedVhal {
    fn connect(&self) -> Result<Arc<dyn VhalClient>, VhalError> {
        Err(VhalError::Unavailable("no vehicle transport linked".to_string()))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeVhal, FakeVhalConnector};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakeVhalInner {
        unsupported: HashSet<VhalProperty>,
        set_values: Vec<PropValue>,
        subscriptions: HashMap<VhalProperty, Vec<Arc<dyn VhalListener>>>,
        death_callbacks: Vec<DeathCallback>,
        fail_sets: bool,
    }

    /// Scriptable VHAL client: records sets, delivers property events to
    /// subscribers, and can simulate process death.
    #[derive(Default)]
    pub struct FakeVhal {
        inner: Mutex<FakeVhalInner>,
    }

    impl FakeVhal {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Mark a property as missing from the VHAL's config.
        pub fn unsupport(&self, prop: VhalProperty) {
            self.inner.lock().unsupported.insert(prop);
        }

        pub fn fail_sets(&self, fail: bool) {
            self.inner.lock().fail_sets = fail;
        }

        /// Deliver a property event to every listener subscribed to its prop.
        pub fn deliver(&self, value: PropValue) {
            let listeners: Vec<Arc<dyn VhalListener>> = self
                .inner
                .lock()
                .subscriptions
                .get(&value.prop)
                .cloned()
                .unwrap_or_default();
            for listener in listeners {
                listener.on_property_event(std::slice::from_ref(&value));
            }
        }

        pub fn set_values(&self) -> Vec<PropValue> {
            self.inner.lock().set_values.clone()
        }

        pub fn last_set(&self, prop: VhalProperty) -> Option<PropValue> {
            self.inner.lock().set_values.iter().rev().find(|v| v.prop == prop).cloned()
        }

        pub fn is_subscribed(&self, prop: VhalProperty) -> bool {
            self.inner.lock().subscriptions.get(&prop).is_some_and(|l| !l.is_empty())
        }

        /// Invoke all registered death callbacks, simulating VHAL death.
        pub fn trigger_death(&self) {
            let callbacks = self.inner.lock().death_callbacks.clone();
            for callback in callbacks {
                callback();
            }
        }
    }

    impl VhalClient for FakeVhal {
        fn supports(&self, prop: VhalProperty) -> bool {
            !self.inner.lock().unsupported.contains(&prop)
        }

        fn subscribe(
            &self,
            props: &[VhalProperty],
            listener: Arc<dyn VhalListener>,
        ) -> Result<(), VhalError> {
            let mut inner = self.inner.lock();
            for prop in props {
                if inner.unsupported.contains(prop) {
                    return Err(VhalError::UnsupportedProperty(*prop));
                }
                inner.subscriptions.entry(*prop).or_default().push(Arc::clone(&listener));
            }
            Ok(())
        }

        fn unsubscribe(&self, props: &[VhalProperty]) -> Result<(), VhalError> {
            let mut inner = self.inner.lock();
            for prop in props {
                inner.subscriptions.remove(prop);
            }
            Ok(())
        }

        fn set_value(&self, value: PropValue) -> Result<(), VhalError> {
            let mut inner = self.inner.lock();
            if inner.fail_sets {
                return Err(VhalError::Call("injected set failure".to_string()));
            }
            if inner.unsupported.contains(&value.prop) {
                return Err(VhalError::UnsupportedProperty(value.prop));
            }
            inner.set_values.push(value);
            Ok(())
        }

        fn add_death_callback(&self, callback: DeathCallback) {
            self.inner.lock().death_callbacks.push(callback);
        }
    }

    /// Connector that fails the first `fail_attempts` connections, then hands
    /// out the configured fake client.
    pub struct FakeVhalConnector {
        client: Arc<FakeVhal>,
        fail_attempts: Mutex<u32>,
        attempts: Mutex<u32>,
    }

    impl FakeVhalConnector {
        pub fn new(client: Arc<FakeVhal>) -> Self {
            Self { client, fail_attempts: Mutex::new(0), attempts: Mutex::new(0) }
        }

        pub fn failing(client: Arc<FakeVhal>, fail_attempts: u32) -> Self {
            Self { client, fail_attempts: Mutex::new(fail_attempts), attempts: Mutex::new(0) }
        }

        pub fn attempts(&self) -> u32 {
            *self.attempts.lock()
        }
    }

    impl VhalConnector for FakeVhalConnector {
        fn connect(&self) -> Result<Arc<dyn VhalClient>, VhalError> {
            *self.attempts.lock() += 1;
            let mut remaining = self.fail_attempts.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(VhalError::Unavailable("fake VHAL not up yet".to_string()));
            }
            Ok(Arc::clone(&self.client) as Arc<dyn VhalClient>)
        }
    }
}

#[cfg(test)]
#[path = "vhal_tests.rs"]
mod tests;
