// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root for the power policy daemon.
//!
//! Wires the coordinator, silent-mode watcher, and VHAL bridge together and
//! routes dispatcher messages to their handlers. The run loop lives in the
//! daemon crate; everything here is synchronous.

use crate::bridge::VhalBridge;
use crate::catalog::VendorCatalog;
use crate::coordinator::{PolicyCoordinator, PolicyDelegate, PolicyState};
use crate::message::PowerMessage;
use crate::silent::{SilentModeSink, SilentModeWatcher};
use axle_core::{CallerContext, Clock, Scheduler, ServiceError};
use axle_adapters::death::DeathRegistry;
use axle_adapters::silent::{KernelSilentFile, SilentModeMonitor};
use axle_adapters::vhal::VhalConnector;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Default)]
pub struct PowerConfig {
    /// Gates the non-system apply/set-group surface (pre- vs post-refactor
    /// policy path).
    pub policy_refactoring: bool,
    /// Boot reason; forced silent-mode values disable hardware monitoring.
    pub boot_reason: String,
    /// Pre-parsed vendor policy file, when one exists.
    pub vendor_catalog: Option<VendorCatalog>,
}

pub struct PowerServer<C: Clock + 'static> {
    coordinator: Arc<PolicyCoordinator<C>>,
    silent: Arc<SilentModeWatcher>,
    bridge: Arc<VhalBridge<C>>,
    scheduler: Arc<Mutex<Scheduler<PowerMessage>>>,
}

impl<C: Clock + 'static> PowerServer<C> {
    pub fn new(
        config: PowerConfig,
        connector: Arc<dyn VhalConnector>,
        monitor: Arc<dyn SilentModeMonitor>,
        kernel: Arc<dyn KernelSilentFile>,
        death_registry: Arc<dyn DeathRegistry>,
        clock: C,
    ) -> (Self, mpsc::UnboundedReceiver<PowerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Mutex::new(Scheduler::new()));
        let coordinator = PolicyCoordinator::new(
            clock.clone(),
            config.policy_refactoring,
            death_registry,
            tx.clone(),
        );
        if let Some(catalog) = &config.vendor_catalog {
            coordinator.load_vendor_catalog(catalog);
        }
        let sink: Arc<dyn SilentModeSink> = Arc::clone(&coordinator) as _;
        let silent = SilentModeWatcher::new(monitor, kernel, sink, config.boot_reason.clone());
        let bridge = VhalBridge::new(
            connector,
            Arc::clone(&coordinator),
            Arc::clone(&scheduler),
            tx,
            clock,
        );
        (Self { coordinator, silent, bridge, scheduler }, rx)
    }

    /// Start silent-mode handling and the VHAL connect loop.
    pub fn init(&self) {
        self.silent.init();
        self.bridge.start();
    }

    /// Dispatcher-side message handler.
    pub fn handle_message(&self, message: PowerMessage) {
        match message {
            PowerMessage::ConnectVhal => self.bridge.connect_once(),
            PowerMessage::HandleApplyAsync { request_id, policy_id, force } => {
                self.coordinator.handle_apply_async(request_id, &policy_id, force)
            }
        }
    }

    pub fn scheduler(&self) -> Arc<Mutex<Scheduler<PowerMessage>>> {
        Arc::clone(&self.scheduler)
    }

    pub fn coordinator(&self) -> &Arc<PolicyCoordinator<C>> {
        &self.coordinator
    }

    pub fn silent_watcher(&self) -> &Arc<SilentModeWatcher> {
        &self.silent
    }

    /// Pre-refactor takeover handshake.
    pub fn notify_car_service_ready(
        &self,
        caller: CallerContext,
    ) -> Result<PolicyState, ServiceError> {
        self.silent.stop_monitoring();
        self.coordinator.take_over(caller, None)
    }

    /// Post-refactor takeover handshake with the delegate callback.
    pub fn notify_car_service_ready_with_delegate(
        &self,
        caller: CallerContext,
        delegate: Arc<dyn PolicyDelegate>,
    ) -> Result<PolicyState, ServiceError> {
        self.silent.stop_monitoring();
        self.coordinator.take_over(caller, Some(delegate))
    }

    pub fn dump(&self) -> String {
        let mut out = self.coordinator.dump();
        out.push_str(&format!(
            "  Silent mode monitoring: {}\n",
            self.silent.is_monitoring()
        ));
        out
    }

    pub fn terminate(&self) {
        self.scheduler.lock().clear();
        self.silent.stop_monitoring();
        self.coordinator.terminate();
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
