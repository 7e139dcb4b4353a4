// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Death-notification seam.
//!
//! The transport invokes the recipient asynchronously when a linked remote
//! object dies. Recipients must not extend the subscription's lifetime: they
//! take the component lock, drop the registry entry for the handle, and
//! return.

use axle_core::Handle;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeathError {
    #[error("remote object is already dead")]
    Dead,
}

/// Receives death notifications for linked handles.
pub trait DeathRecipient: Send + Sync {
    fn on_died(&self, handle: Handle);
}

/// Links caller handles to death notifications.
pub trait DeathRegistry: Send + Sync {
    /// Link `handle` to `recipient`. Fails if the remote object is already
    /// dead, in which case the caller must keep no state for it.
    fn link(&self, handle: Handle, recipient: Arc<dyn DeathRecipient>) -> Result<(), DeathError>;

    fn unlink(&self, handle: Handle);
}

/// Registry for transports without death notifications: every link succeeds
/// and no notification ever fires. Registrations then live until explicit
/// unregistration.
pub struct NoDeathNotifications;

impl DeathRegistry for NoDeathNotifications {
    fn link(&self, _handle: Handle, _recipient: Arc<dyn DeathRecipient>) -> Result<(), DeathError> {
        Ok(())
    }

    fn unlink(&self, _handle: Handle) {}
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeDeathRegistry;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// In-memory death registry: tests kill handles to drive recipients.
    #[derive(Default)]
    pub struct FakeDeathRegistry {
        links: Mutex<HashMap<u64, Arc<dyn DeathRecipient>>>,
        dead: Mutex<HashSet<u64>>,
    }

    impl FakeDeathRegistry {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Mark a handle dead so the next link attempt fails.
        pub fn mark_dead(&self, handle: Handle) {
            self.dead.lock().insert(handle.raw());
        }

        /// Simulate the remote object dying: invokes and drops its recipient.
        pub fn kill(&self, handle: Handle) {
            self.dead.lock().insert(handle.raw());
            let recipient = self.links.lock().remove(&handle.raw());
            if let Some(recipient) = recipient {
                recipient.on_died(handle);
            }
        }

        pub fn is_linked(&self, handle: Handle) -> bool {
            self.links.lock().contains_key(&handle.raw())
        }
    }

    impl DeathRegistry for FakeDeathRegistry {
        fn link(
            &self,
            handle: Handle,
            recipient: Arc<dyn DeathRecipient>,
        ) -> Result<(), DeathError> {
            if self.dead.lock().contains(&handle.raw()) {
                return Err(DeathError::Dead);
            }
            self.links.lock().insert(handle.raw(), recipient);
            Ok(())
        }

        fn unlink(&self, handle: Handle) {
            self.links.lock().remove(&handle.raw());
        }
    }
}

#[cfg(test)]
#[path = "death_tests.rs"]
mod tests;
