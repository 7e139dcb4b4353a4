// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axle_core::FakeClock;
use axle_adapters::death::FakeDeathRegistry;
use axle_adapters::silent::{FakeKernelSilentFile, FakeSilentModeMonitor};
use axle_adapters::vhal::{FakeVhal, FakeVhalConnector};

struct ServerHarness {
    server: PowerServer<FakeClock>,
    monitor: Arc<FakeSilentModeMonitor>,
    vhal: Arc<FakeVhal>,
    clock: FakeClock,
    rx: mpsc::UnboundedReceiver<PowerMessage>,
}

impl ServerHarness {
    fn new(config: PowerConfig) -> Self {
        let clock = FakeClock::new();
        let vhal = FakeVhal::new();
        let monitor = FakeSilentModeMonitor::new();
        let kernel = FakeKernelSilentFile::new();
        let (server, rx) = PowerServer::new(
            config,
            Arc::new(FakeVhalConnector::new(Arc::clone(&vhal))) as _,
            Arc::clone(&monitor) as _,
            kernel as _,
            FakeDeathRegistry::new() as _,
            clock.clone(),
        );
        Self { server, monitor, vhal, clock, rx }
    }

    fn pump(&mut self) {
        loop {
            let mut messages: Vec<PowerMessage> = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages.extend(self.server.scheduler().lock().fired(self.clock.now()));
            if messages.is_empty() {
                return;
            }
            for message in messages {
                self.server.handle_message(message);
            }
        }
    }
}

#[test]
fn init_starts_monitoring_and_connects() {
    let mut harness = ServerHarness::new(PowerConfig::default());
    harness.server.init();
    harness.pump();

    assert!(harness.monitor.is_monitoring());
    assert!(harness.server.coordinator().has_vhal());
    assert!(harness.server.coordinator().is_policy_applied());
}

#[test]
fn silent_transition_flows_through_to_the_coordinator() {
    let mut harness = ServerHarness::new(PowerConfig::default());
    harness.server.init();
    harness.pump();

    harness.monitor.emit(true);
    assert_eq!(
        harness.server.coordinator().current_policy_id(),
        axle_core::POLICY_ID_NO_USER_INTERACTION
    );
    assert!(harness.server.silent_watcher().is_silent_mode());
}

#[test]
fn takeover_stops_silent_monitoring() {
    let mut harness = ServerHarness::new(PowerConfig::default());
    harness.server.init();
    harness.pump();

    let state = harness
        .server
        .notify_car_service_ready(CallerContext::system(100))
        .unwrap();
    assert!(!state.policy_id.is_empty());
    assert!(!harness.monitor.is_monitoring());
    assert!(harness.server.coordinator().has_taken_over());

    // later hardware events no longer move policy
    let before = harness.server.coordinator().current_policy_id();
    harness.monitor.emit(true);
    assert_eq!(harness.server.coordinator().current_policy_id(), before);
}

#[test]
fn vendor_catalog_is_loaded_at_construction() {
    let config = PowerConfig {
        vendor_catalog: Some(crate::catalog::VendorCatalog {
            policies: vec![crate::catalog::PolicyDefinition {
                id: "vendor_boot".to_string(),
                enabled: vec![axle_core::PowerComponent::Cpu],
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    };
    let harness = ServerHarness::new(config);
    assert!(harness
        .server
        .coordinator()
        .get_current_power_policy()
        .is_err());
    // defined vendor policy is resolvable
    harness.server.coordinator().apply_regular_policy("vendor_boot", false).unwrap();
    // no VHAL yet: queued as pending
    assert_eq!(harness.server.coordinator().pending_policy_id(), "vendor_boot");
}

#[test]
fn dump_includes_silent_monitoring_state() {
    let mut harness = ServerHarness::new(PowerConfig::default());
    harness.server.init();
    harness.pump();
    let dump = harness.server.dump();
    assert!(dump.contains("Silent mode monitoring: true"));

    harness.server.terminate();
    let dump = harness.server.dump();
    assert!(dump.contains("Silent mode monitoring: false"));
}
