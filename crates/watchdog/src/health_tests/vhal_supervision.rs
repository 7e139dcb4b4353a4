// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::health::vhal::VHAL_INTERFACE_NAME;
use crate::message::{TIMER_VHAL_ALIVE, TIMER_VHAL_HEALTH};
use axle_adapters::vhal::{PropValue, VhalProperty};
use std::time::Duration;

fn heartbeat(value: i64) -> PropValue {
    PropValue::int64_value(VhalProperty::VhalHeartbeat, value)
}

fn started(harness: &mut HealthHarness) {
    harness.service.start().unwrap();
    harness.pump();
}

#[test]
fn connect_subscribes_to_heartbeat_and_arms_the_window() {
    let mut harness = HealthHarness::new();
    started(&mut harness);
    assert!(harness.vhal.is_subscribed(VhalProperty::VhalHeartbeat));
    assert!(harness.scheduler.lock().is_scheduled(TIMER_VHAL_HEALTH));
}

#[test]
fn alive_reports_carry_uptime_on_a_3s_cadence() {
    let mut harness = HealthHarness::new();
    harness.clock.set_uptime_ms(50_000);
    started(&mut harness);

    harness.advance_and_pump(Duration::from_secs(3));
    let report = harness.vhal.last_set(VhalProperty::WatchdogAlive).unwrap();
    assert_eq!(report.first_int64(), Some(53_000));

    harness.advance_and_pump(Duration::from_secs(3));
    let report = harness.vhal.last_set(VhalProperty::WatchdogAlive).unwrap();
    assert_eq!(report.first_int64(), Some(56_000));
}

#[test]
fn unsupported_alive_property_stops_the_cadence() {
    let mut harness = HealthHarness::new();
    harness.vhal.unsupport(VhalProperty::WatchdogAlive);
    started(&mut harness);

    harness.advance_and_pump(Duration::from_secs(3));
    assert!(harness.vhal.last_set(VhalProperty::WatchdogAlive).is_none());
    assert!(!harness.scheduler.lock().is_scheduled(TIMER_VHAL_ALIVE));
}

#[test]
fn unsupported_heartbeat_disables_health_checking() {
    let mut harness = HealthHarness::new();
    harness.vhal.unsupport(VhalProperty::VhalHeartbeat);
    started(&mut harness);
    assert!(!harness.vhal.is_subscribed(VhalProperty::VhalHeartbeat));
    assert!(!harness.scheduler.lock().is_scheduled(TIMER_VHAL_HEALTH));
}

#[test]
fn increasing_heartbeat_keeps_the_window_open() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    started(&mut harness);

    harness.vhal.deliver(heartbeat(100));
    harness.advance_and_pump(Duration::from_secs(2));
    harness.vhal.deliver(heartbeat(101));
    harness.advance_and_pump(Duration::from_secs(2));
    harness.vhal.deliver(heartbeat(102));
    harness.advance_and_pump(Duration::from_secs(2));

    assert!(monitor.escalations.lock().is_empty());
}

#[test]
fn heartbeat_regression_terminates_the_vhal() {
    // Stored heartbeat 100; a delivery of 95 fires the termination path
    // without a terminated-process report back to the VHAL.
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    harness.hal_registry.add_hal(VHAL_INTERFACE_NAME, 4242);
    harness.process_info.set_process(4242, 99, "/vendor/bin/vhal");
    started(&mut harness);

    harness.vhal.deliver(heartbeat(100));
    harness.vhal.deliver(heartbeat(95));

    assert_eq!(monitor.escalated_pids(), vec![4242]);
    assert_eq!(monitor.escalations.lock()[0][0].start_time_ms, 99);
    assert!(harness.vhal.last_set(VhalProperty::WatchdogTerminatedProcess).is_none());
}

#[test]
fn missed_heartbeat_window_terminates_the_vhal() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    harness.hal_registry.add_hal(VHAL_INTERFACE_NAME, 4242);
    harness.process_info.set_process(4242, 99, "/vendor/bin/vhal");
    started(&mut harness);

    harness.vhal.deliver(heartbeat(100));
    // no further heartbeats within window + margin
    harness.advance_and_pump(Duration::from_secs(4));

    assert_eq!(monitor.escalated_pids(), vec![4242]);
}

#[test]
fn unknown_vhal_process_aborts_termination() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    started(&mut harness);

    harness.vhal.deliver(heartbeat(100));
    harness.vhal.deliver(heartbeat(50));
    assert!(monitor.escalations.lock().is_empty());
}

#[test]
fn heartbeat_events_are_ignored_while_disabled() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    harness.hal_registry.add_hal(VHAL_INTERFACE_NAME, 4242);
    harness.process_info.set_process(4242, 99, "/vendor/bin/vhal");
    started(&mut harness);

    harness.vhal.deliver(heartbeat(100));
    harness.service.set_enabled(false);
    harness.vhal.deliver(heartbeat(10));
    assert!(monitor.escalations.lock().is_empty());
}

#[test]
fn vhal_death_reconnects_and_resubscribes() {
    let mut harness = HealthHarness::new();
    started(&mut harness);
    assert!(harness.service.inner.lock().vhal.is_some());

    harness.vhal.trigger_death();
    assert!(harness.service.inner.lock().vhal.is_none());
    harness.pump();
    assert!(harness.service.inner.lock().vhal.is_some());
}

#[test]
fn terminated_processes_are_reported_with_their_cmdline() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    started(&mut harness);
    let silent = TestClient::new(1);
    harness.register(&silent, TimeoutTrack::Critical, 100);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));

    let report = harness.vhal.last_set(VhalProperty::WatchdogTerminatedProcess).unwrap();
    assert_eq!(report.string, "/system/bin/proc100");
    assert_eq!(report.int32s, vec![1]);
}

#[test]
fn terminated_process_report_skipped_when_unsupported() {
    let mut harness = HealthHarness::new();
    harness.vhal.unsupport(VhalProperty::WatchdogTerminatedProcess);
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    started(&mut harness);
    let silent = TestClient::new(1);
    harness.register(&silent, TimeoutTrack::Critical, 100);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));

    assert!(harness.vhal.last_set(VhalProperty::WatchdogTerminatedProcess).is_none());
    assert_eq!(monitor.escalated_pids(), vec![100]);
}

#[test]
fn connect_retries_then_gives_up() {
    let (tx, rx) = mpsc::unbounded_channel();
    let clock = FakeClock::new();
    let vhal = FakeVhal::new();
    let scheduler = Arc::new(Mutex::new(Scheduler::new()));
    let service = ProcessHealthService::new(
        HealthConfig::default(),
        HealthDeps {
            connector: Arc::new(FakeVhalConnector::failing(Arc::clone(&vhal), u32::MAX)) as _,
            death_registry: FakeDeathRegistry::new() as _,
            process_info: FakeProcessInfoSource::new() as _,
            hal_registry: FakeHalRegistry::new() as _,
            shutdown: FakeShutdownProbe::new() as _,
        },
        Arc::clone(&scheduler),
        tx,
        clock.clone(),
    );
    let mut harness = HealthHarness {
        service,
        clock,
        death: FakeDeathRegistry::new(),
        vhal,
        process_info: FakeProcessInfoSource::new(),
        hal_registry: FakeHalRegistry::new(),
        shutdown: FakeShutdownProbe::new(),
        scheduler,
        rx,
    };

    harness.service.start().unwrap();
    harness.pump();
    for _ in 0..30 {
        harness.advance_and_pump(Duration::from_millis(200));
    }
    assert!(harness.service.inner.lock().vhal.is_none());
    assert!(!harness.scheduler.lock().is_scheduled(crate::message::TIMER_CONNECT_VHAL));
}
