// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Package-name resolution seam.
//!
//! Maps a UID to the generic package name used in performance reports and the
//! custom-collection package filter. The real resolver lives in the platform
//! integration; the fallback keeps reports readable when it is absent.

use parking_lot::Mutex;
use std::collections::HashMap;

pub trait PackageNameResolver: Send + Sync {
    fn resolve(&self, uid: u32) -> String;
}

/// Resolver with a warm cache and a `uid:<n>` fallback for unknown UIDs.
#[derive(Default)]
pub struct CachingNameResolver {
    names: Mutex<HashMap<u32, String>>,
}

impl CachingNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uid: u32, name: impl Into<String>) {
        self.names.lock().insert(uid, name.into());
    }
}

impl PackageNameResolver for CachingNameResolver {
    fn resolve(&self, uid: u32) -> String {
        self.names
            .lock()
            .get(&uid)
            .cloned()
            .unwrap_or_else(|| format!("uid:{uid}"))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub type FakePackageNameResolver = CachingNameResolver;

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
