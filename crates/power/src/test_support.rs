// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the power crate's tests.

use crate::coordinator::{PolicyCoordinator, PolicyDelegate};
use crate::message::PowerMessage;
use crate::observer::PolicyObserver;
use axle_core::{FakeClock, Handle, PowerPolicy, ServiceError};
use axle_adapters::death::FakeDeathRegistry;
use axle_adapters::vhal::FakeVhal;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct TestObserver {
    handle: Handle,
    pub received: Mutex<Vec<PowerPolicy>>,
    fail: AtomicBool,
}

impl TestObserver {
    pub fn new(handle: u64) -> Arc<Self> {
        Arc::new(Self {
            handle: Handle::new(handle),
            received: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_notifications(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn received_ids(&self) -> Vec<String> {
        self.received.lock().iter().map(|p| p.id.clone()).collect()
    }
}

impl PolicyObserver for TestObserver {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn on_policy_changed(&self, accumulated: &PowerPolicy) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::transient("observer is gone"));
        }
        self.received.lock().push(accumulated.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct TestDelegate {
    pub component_updates: Mutex<Vec<PowerPolicy>>,
    pub policy_changes: Mutex<Vec<PowerPolicy>>,
    pub succeeded: Mutex<Vec<(i32, PowerPolicy)>>,
    pub failed: Mutex<Vec<(i32, String)>>,
}

impl TestDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PolicyDelegate for TestDelegate {
    fn handle(&self) -> Handle {
        Handle::new(0x5e1f)
    }

    fn update_power_components(&self, policy: &PowerPolicy) -> Result<(), ServiceError> {
        self.component_updates.lock().push(policy.clone());
        Ok(())
    }

    fn on_power_policy_changed(&self, accumulated: &PowerPolicy) -> Result<(), ServiceError> {
        self.policy_changes.lock().push(accumulated.clone());
        Ok(())
    }

    fn on_apply_power_policy_succeeded(
        &self,
        request_id: i32,
        accumulated: &PowerPolicy,
    ) -> Result<(), ServiceError> {
        self.succeeded.lock().push((request_id, accumulated.clone()));
        Ok(())
    }

    fn on_apply_power_policy_failed(
        &self,
        request_id: i32,
        reason: &str,
    ) -> Result<(), ServiceError> {
        self.failed.lock().push((request_id, reason.to_string()));
        Ok(())
    }
}

pub struct CoordinatorHarness {
    pub coordinator: Arc<PolicyCoordinator<FakeClock>>,
    pub clock: FakeClock,
    pub death: Arc<FakeDeathRegistry>,
    pub vhal: Arc<FakeVhal>,
    pub rx: mpsc::UnboundedReceiver<PowerMessage>,
}

impl CoordinatorHarness {
    /// Coordinator with a connected fake VHAL.
    pub fn new() -> Self {
        Self::build(true, true)
    }

    pub fn without_vhal() -> Self {
        Self::build(false, true)
    }

    pub fn with_refactoring(refactoring: bool) -> Self {
        Self::build(true, refactoring)
    }

    fn build(with_vhal: bool, refactoring: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = FakeClock::new();
        let death = FakeDeathRegistry::new();
        let vhal = FakeVhal::new();
        let coordinator =
            PolicyCoordinator::new(clock.clone(), refactoring, Arc::clone(&death) as _, tx);
        if with_vhal {
            coordinator.set_vhal(Arc::clone(&vhal) as _);
        }
        Self { coordinator, clock, death, vhal, rx }
    }

    /// Run queued dispatcher messages through the coordinator.
    pub fn pump(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                PowerMessage::HandleApplyAsync { request_id, policy_id, force } => {
                    self.coordinator.handle_apply_async(request_id, &policy_id, force)
                }
                PowerMessage::ConnectVhal => {}
            }
        }
    }
}

/// Register a vendor policy through the runtime definition path.
pub fn define_policy(
    harness: &CoordinatorHarness,
    id: &str,
    enabled: &[&str],
    disabled: &[&str],
) {
    let enabled: Vec<String> = enabled.iter().map(|s| s.to_string()).collect();
    let disabled: Vec<String> = disabled.iter().map(|s| s.to_string()).collect();
    harness
        .coordinator
        .notify_power_policy_definition(
            axle_core::CallerContext::system(100),
            id,
            &enabled,
            &disabled,
        )
        .unwrap_or_else(|e| panic!("failed to define {id}: {e}"));
}
