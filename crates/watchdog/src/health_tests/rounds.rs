// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[test]
fn round_pings_every_client_with_fresh_session_ids() {
    let mut harness = HealthHarness::new();
    let a = TestClient::new(1);
    let b = TestClient::new(2);
    harness.register(&a, TimeoutTrack::Critical, 100);
    harness.register(&b, TimeoutTrack::Critical, 101);

    harness.advance_and_pump(Duration::from_secs(3));

    assert_eq!(a.ping_count(), 1);
    assert_eq!(b.ping_count(), 1);
    assert_ne!(a.last_session(), b.last_session());
    assert!(a.last_session() > 0 && b.last_session() > 0);
    // round re-armed
    assert!(harness.scheduler.lock().is_scheduled("health:critical"));
}

#[test]
fn responding_client_survives_the_next_round() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    let client = TestClient::new(1);
    harness.register(&client, TimeoutTrack::Critical, 100);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.service.tell_client_alive(Handle::new(1), client.last_session()).unwrap();

    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(client.ping_count(), 2);
    assert!(monitor.escalations.lock().is_empty());
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 1);
}

#[test]
fn unresponsive_client_is_escalated_and_unregistered() {
    // Two critical clients; one answers, one does not.
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    let responsive = TestClient::new(1);
    let silent = TestClient::new(2);
    harness.register(&responsive, TimeoutTrack::Critical, 100);
    harness.register(&silent, TimeoutTrack::Critical, 200);

    harness.advance_and_pump(Duration::from_secs(3));
    harness
        .service
        .tell_client_alive(Handle::new(1), responsive.last_session())
        .unwrap();

    harness.advance_and_pump(Duration::from_secs(3));

    assert_eq!(monitor.escalated_pids(), vec![200]);
    // process identifier carries the registration-time start time
    assert_eq!(monitor.escalations.lock()[0][0].start_time_ms, 1_200);
    assert_eq!(*silent.prepared.lock(), 1);
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 1);
    // the silent client stops being pinged
    assert_eq!(silent.ping_count(), 1);
    assert_eq!(responsive.ping_count(), 2);
}

#[test]
fn unresponsive_client_appears_exactly_once() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    let silent = TestClient::new(2);
    harness.register(&silent, TimeoutTrack::Critical, 200);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));

    assert_eq!(monitor.escalated_pids(), vec![200]);
}

#[test]
fn failed_ping_drops_the_pending_session() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    let flaky = TestClient::new(3);
    flaky.fail_pings();
    harness.register(&flaky, TimeoutTrack::Moderate, 300);

    harness.advance_and_pump(Duration::from_secs(6));
    // ping failed, so the client is not in the pinged set and the next round
    // does not treat it as unresponsive
    harness.advance_and_pump(Duration::from_secs(6));
    assert!(monitor.escalations.lock().is_empty());
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Moderate), 1);
}

#[test]
fn stopped_users_are_skipped() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    // uid 10_00000 => user 10
    let client = TestClient::new(4);
    harness.process_info.set_process(400, 1_400, "/system/bin/proc400");
    harness
        .service
        .register_client(
            Arc::clone(&client) as _,
            TimeoutTrack::Critical,
            CallerContext::new(400, 1_000_000),
        )
        .unwrap();
    harness.service.notify_user_state_change(10, false);

    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(client.ping_count(), 0);
    assert!(monitor.escalations.lock().is_empty());

    // restarting the user resumes pinging
    harness.service.notify_user_state_change(10, true);
    let other = TestClient::new(5);
    harness.register(&other, TimeoutTrack::Critical, 500);
    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(client.ping_count(), 1);
}

#[test]
fn tracks_run_independent_rounds() {
    let mut harness = HealthHarness::new();
    let critical = TestClient::new(6);
    let normal = TestClient::new(7);
    harness.register(&critical, TimeoutTrack::Critical, 100);
    harness.register(&normal, TimeoutTrack::Normal, 101);

    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(critical.ping_count(), 1);
    assert_eq!(normal.ping_count(), 0);

    harness.advance_and_pump(Duration::from_secs(9));
    assert!(critical.ping_count() >= 2);
    assert_eq!(normal.ping_count(), 1);
    assert_eq!(normal.pings.lock()[0].1, TimeoutTrack::Normal);
}

#[test]
fn session_ids_wrap_back_to_one_skipping_zero() {
    let mut harness = HealthHarness::new();
    harness.service.inner.lock().last_session_id = i32::MAX - 1;
    let a = TestClient::new(8);
    let b = TestClient::new(9);
    harness.register(&a, TimeoutTrack::Critical, 100);
    harness.register(&b, TimeoutTrack::Critical, 101);

    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(a.last_session(), i32::MAX);
    assert_eq!(b.last_session(), 1);
}

#[test]
fn no_monitor_still_unregisters_unresponsive_clients() {
    let mut harness = HealthHarness::new();
    let silent = TestClient::new(10);
    harness.register(&silent, TimeoutTrack::Critical, 100);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 0);
}

#[test]
fn shutdown_suppresses_escalation() {
    let mut harness = HealthHarness::new();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    harness.shutdown.set_shutting_down(true);
    let silent = TestClient::new(11);
    harness.register(&silent, TimeoutTrack::Critical, 100);

    harness.advance_and_pump(Duration::from_secs(3));
    harness.advance_and_pump(Duration::from_secs(3));
    assert!(monitor.escalations.lock().is_empty());
}

#[test]
fn framework_service_report_forwards_unresponsive_processes() {
    let mut harness = HealthHarness::new();
    harness.service.start().unwrap();
    harness.pump();
    let monitor = TestMonitor::new(90);
    harness.register_monitor(&monitor);
    let service_client = TestClient::new(12);
    harness.process_info.set_process(600, 1_600, "/system/bin/car_service");
    harness
        .service
        .register_framework_service(
            Arc::clone(&service_client) as _,
            CallerContext::new(600, 1000),
        )
        .unwrap();

    harness.advance_and_pump(Duration::from_secs(3));
    let session = service_client.last_session();
    let bad_process = ProcessIdentifier { pid: 777, start_time_ms: 12 };
    harness.process_info.set_process(777, 12, "/vendor/bin/stuck");
    harness
        .service
        .tell_framework_service_alive(Handle::new(12), &[bad_process], session)
        .unwrap();

    assert_eq!(monitor.escalated_pids(), vec![777]);
    // wrong session id afterwards is rejected
    assert!(matches!(
        harness.service.tell_framework_service_alive(Handle::new(12), &[], session),
        Err(ServiceError::InvalidArgument(_))
    ));
}

#[test]
fn rounds_pause_while_disabled() {
    let mut harness = HealthHarness::new();
    let client = TestClient::new(13);
    harness.register(&client, TimeoutTrack::Critical, 100);
    harness.service.set_enabled(false);

    harness.advance_and_pump(Duration::from_secs(6));
    assert_eq!(client.ping_count(), 0);

    harness.service.set_enabled(true);
    harness.advance_and_pump(Duration::from_secs(3));
    assert_eq!(client.ping_count(), 1);
}
