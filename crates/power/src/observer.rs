// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy-change observer registry.
//!
//! Observers live from register to unregister or death. Identity is the
//! caller handle; a duplicate registration is rejected rather than silently
//! replaced.

use axle_core::{Handle, PowerComponent, PowerPolicy, ServiceError};
use indexmap::IndexMap;
use std::sync::Arc;

/// A registered policy-change callback.
pub trait PolicyObserver: Send + Sync {
    fn handle(&self) -> Handle;

    fn on_policy_changed(&self, accumulated: &PowerPolicy) -> Result<(), ServiceError>;
}

pub struct ObserverEntry {
    pub observer: Arc<dyn PolicyObserver>,
    pub filter: Vec<PowerComponent>,
    pub pid: i32,
}

#[derive(Default)]
pub struct ObserverRegistry {
    entries: IndexMap<u64, ObserverEntry>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle.raw())
    }

    pub fn register(&mut self, entry: ObserverEntry) -> Result<(), ServiceError> {
        let handle = entry.observer.handle();
        if self.is_registered(handle) {
            return Err(ServiceError::invalid_argument(format!(
                "the callback(pid: {}) is already registered",
                entry.pid
            )));
        }
        self.entries.insert(handle.raw(), entry);
        Ok(())
    }

    pub fn unregister(&mut self, handle: Handle) -> Result<(), ServiceError> {
        self.entries.shift_remove(&handle.raw()).map(|_| ()).ok_or_else(|| {
            ServiceError::invalid_argument("the callback has not been registered".to_string())
        })
    }

    /// Drop an entry on death. Returns whether one was present.
    pub fn remove(&mut self, handle: Handle) -> bool {
        self.entries.shift_remove(&handle.raw()).is_some()
    }

    /// Snapshot for lock-free fan-out, in registration order.
    pub fn snapshot(&self) -> Vec<(Arc<dyn PolicyObserver>, Vec<PowerComponent>)> {
        self.entries
            .values()
            .map(|e| (Arc::clone(&e.observer), e.filter.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
