// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::client::WatchdogMonitor;
use crate::message::TIMER_VHAL_ALIVE;
use axle_core::FakeClock;
use axle_adapters::death::FakeDeathRegistry;
use axle_adapters::system::{FakeHalRegistry, FakeProcessInfoSource, FakeShutdownProbe};
use axle_adapters::vhal::{FakeVhal, FakeVhalConnector};

mod rounds;
mod vhal_supervision;

pub(crate) struct TestClient {
    handle: Handle,
    pub pings: Mutex<Vec<(i32, TimeoutTrack)>>,
    pub prepared: Mutex<u32>,
    fail_pings: std::sync::atomic::AtomicBool,
}

impl TestClient {
    pub fn new(handle: u64) -> Arc<Self> {
        Arc::new(Self {
            handle: Handle::new(handle),
            pings: Mutex::new(Vec::new()),
            prepared: Mutex::new(0),
            fail_pings: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn fail_pings(&self) {
        self.fail_pings.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn last_session(&self) -> i32 {
        self.pings.lock().last().map(|(session, _)| *session).unwrap_or(0)
    }

    pub fn ping_count(&self) -> usize {
        self.pings.lock().len()
    }
}

impl HealthCheckClient for TestClient {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn check_if_alive(&self, session_id: i32, track: TimeoutTrack) -> Result<(), ServiceError> {
        if self.fail_pings.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::transient("ping failed"));
        }
        self.pings.lock().push((session_id, track));
        Ok(())
    }

    fn prepare_process_termination(&self) -> Result<(), ServiceError> {
        *self.prepared.lock() += 1;
        Ok(())
    }
}

pub(crate) struct TestMonitor {
    handle: Handle,
    pub escalations: Mutex<Vec<Vec<ProcessIdentifier>>>,
}

impl TestMonitor {
    pub fn new(handle: u64) -> Arc<Self> {
        Arc::new(Self { handle: Handle::new(handle), escalations: Mutex::new(Vec::new()) })
    }

    pub fn escalated_pids(&self) -> Vec<i32> {
        self.escalations
            .lock()
            .iter()
            .flat_map(|batch| batch.iter().map(|p| p.pid))
            .collect()
    }
}

impl WatchdogMonitor for TestMonitor {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn on_clients_not_responding(
        &self,
        clients: &[ProcessIdentifier],
    ) -> Result<(), ServiceError> {
        self.escalations.lock().push(clients.to_vec());
        Ok(())
    }
}

pub(crate) struct HealthHarness {
    pub service: Arc<ProcessHealthService<FakeClock>>,
    pub clock: FakeClock,
    pub death: Arc<FakeDeathRegistry>,
    pub vhal: Arc<FakeVhal>,
    pub process_info: Arc<FakeProcessInfoSource>,
    pub hal_registry: Arc<FakeHalRegistry>,
    pub shutdown: Arc<FakeShutdownProbe>,
    pub scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
    pub rx: mpsc::UnboundedReceiver<WatchdogMessage>,
}

impl HealthHarness {
    pub fn new() -> Self {
        Self::with_config(HealthConfig::default())
    }

    pub fn with_config(config: HealthConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = FakeClock::new();
        let death = FakeDeathRegistry::new();
        let vhal = FakeVhal::new();
        let process_info = FakeProcessInfoSource::new();
        let hal_registry = FakeHalRegistry::new();
        let shutdown = FakeShutdownProbe::new();
        let scheduler = Arc::new(Mutex::new(Scheduler::new()));
        let service = ProcessHealthService::new(
            config,
            HealthDeps {
                connector: Arc::new(FakeVhalConnector::new(Arc::clone(&vhal))) as _,
                death_registry: Arc::clone(&death) as _,
                process_info: Arc::clone(&process_info) as _,
                hal_registry: Arc::clone(&hal_registry) as _,
                shutdown: Arc::clone(&shutdown) as _,
            },
            Arc::clone(&scheduler),
            tx,
            clock.clone(),
        );
        Self { service, clock, death, vhal, process_info, hal_registry, shutdown, scheduler, rx }
    }

    /// Drain queued messages and fired timers into the service, like the
    /// daemon run loop does.
    pub fn pump(&mut self) {
        loop {
            let mut messages: Vec<WatchdogMessage> = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message);
            }
            messages.extend(self.scheduler.lock().fired(self.clock.now()));
            if messages.is_empty() {
                return;
            }
            for message in messages {
                match message {
                    WatchdogMessage::HealthCheck(track) => self.service.do_health_check(track),
                    WatchdogMessage::ConnectVhal => self.service.connect_vhal_once(),
                    WatchdogMessage::ReportWatchdogAlive => self.service.report_watchdog_alive(),
                    WatchdogMessage::CheckVhalHealth => self.service.check_vhal_health(),
                    _ => {}
                }
            }
        }
    }

    pub fn advance_and_pump(&mut self, duration: std::time::Duration) {
        self.clock.advance(duration);
        self.pump();
    }

    pub fn register(&self, client: &Arc<TestClient>, track: TimeoutTrack, pid: i32) {
        self.process_info.set_process(pid, 1_000 + pid as u64, format!("/system/bin/proc{pid}"));
        self.service
            .register_client(Arc::clone(client) as _, track, CallerContext::new(pid, 1000))
            .unwrap();
    }

    pub fn register_monitor(&self, monitor: &Arc<TestMonitor>) {
        self.service.register_monitor(Arc::clone(monitor) as _).unwrap();
    }
}

#[test]
fn start_is_one_shot() {
    let mut harness = HealthHarness::new();
    harness.service.start().unwrap();
    assert!(matches!(harness.service.start(), Err(ServiceError::IllegalState(_))));
    harness.pump();
    assert!(harness.service.inner.lock().vhal.is_some());
}

#[test]
fn duplicate_registration_is_tolerated() {
    let harness = HealthHarness::new();
    let client = TestClient::new(1);
    harness.register(&client, TimeoutTrack::Critical, 100);
    // second registration on any track is a no-op
    harness
        .service
        .register_client(
            Arc::clone(&client) as _,
            TimeoutTrack::Normal,
            CallerContext::new(100, 1000),
        )
        .unwrap();
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 1);
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Normal), 0);
}

#[test]
fn registering_a_dead_client_keeps_no_state() {
    let harness = HealthHarness::new();
    let client = TestClient::new(2);
    harness.death.mark_dead(Handle::new(2));
    let result = harness.service.register_client(
        client as _,
        TimeoutTrack::Moderate,
        CallerContext::new(100, 1000),
    );
    assert!(matches!(result, Err(ServiceError::IllegalState(_))));
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Moderate), 0);
}

#[test]
fn first_registration_arms_the_track_timer() {
    let harness = HealthHarness::new();
    assert!(!harness.scheduler.lock().is_scheduled("health:critical"));
    let client = TestClient::new(3);
    harness.register(&client, TimeoutTrack::Critical, 100);
    assert!(harness.scheduler.lock().is_scheduled("health:critical"));

    // a second client does not restart the round timer
    let deadline = harness.scheduler.lock().next_deadline();
    let other = TestClient::new(4);
    harness.register(&other, TimeoutTrack::Critical, 101);
    assert_eq!(harness.scheduler.lock().next_deadline(), deadline);
}

#[test]
fn unregister_round_trip_leaves_no_state() {
    let mut harness = HealthHarness::new();
    let client = TestClient::new(5);
    harness.register(&client, TimeoutTrack::Critical, 100);
    harness.service.unregister_client(Handle::new(5)).unwrap();
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 0);
    assert!(!harness.death.is_linked(Handle::new(5)));

    // the already-armed round finds nothing to ping and stops re-arming
    harness.advance_and_pump(std::time::Duration::from_secs(3));
    assert_eq!(client.ping_count(), 0);
    assert!(!harness.scheduler.lock().is_scheduled("health:critical"));
}

#[test]
fn unregister_unknown_client_is_invalid_argument() {
    let harness = HealthHarness::new();
    assert!(matches!(
        harness.service.unregister_client(Handle::new(99)),
        Err(ServiceError::InvalidArgument(_))
    ));
}

#[test]
fn client_death_drops_registration() {
    let harness = HealthHarness::new();
    let client = TestClient::new(6);
    harness.register(&client, TimeoutTrack::Normal, 100);
    harness.death.kill(Handle::new(6));
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Normal), 0);
}

#[test]
fn monitor_registration_rules() {
    let harness = HealthHarness::new();
    let monitor = TestMonitor::new(10);
    harness.register_monitor(&monitor);
    // same monitor again is fine
    harness.register_monitor(&monitor);
    assert!(harness.service.has_monitor());

    // replacing unlinks the old monitor
    let other = TestMonitor::new(11);
    harness.register_monitor(&other);
    assert!(!harness.death.is_linked(Handle::new(10)));
    assert!(harness.death.is_linked(Handle::new(11)));

    // dead monitor registration fails and clears
    let dead = TestMonitor::new(12);
    harness.death.mark_dead(Handle::new(12));
    assert!(matches!(
        harness.service.register_monitor(dead as _),
        Err(ServiceError::IllegalState(_))
    ));
    assert!(!harness.service.has_monitor());
}

#[test]
fn unregister_monitor_requires_a_match() {
    let harness = HealthHarness::new();
    let monitor = TestMonitor::new(13);
    harness.register_monitor(&monitor);
    assert!(matches!(
        harness.service.unregister_monitor(Handle::new(14)),
        Err(ServiceError::InvalidArgument(_))
    ));
    harness.service.unregister_monitor(Handle::new(13)).unwrap();
    assert!(!harness.service.has_monitor());
}

#[test]
fn monitor_death_clears_it() {
    let harness = HealthHarness::new();
    let monitor = TestMonitor::new(15);
    harness.register_monitor(&monitor);
    harness.death.kill(Handle::new(15));
    assert!(!harness.service.has_monitor());
}

#[test]
fn tell_dump_finished_validates_the_monitor() {
    let harness = HealthHarness::new();
    let process = ProcessIdentifier { pid: 1, start_time_ms: 0 };
    assert!(matches!(
        harness.service.tell_dump_finished(Handle::new(16), process),
        Err(ServiceError::InvalidArgument(_))
    ));
    let monitor = TestMonitor::new(16);
    harness.register_monitor(&monitor);
    harness.service.tell_dump_finished(Handle::new(16), process).unwrap();
}

#[test]
fn tell_client_alive_with_unknown_session_is_invalid() {
    let harness = HealthHarness::new();
    assert!(matches!(
        harness.service.tell_client_alive(Handle::new(1), 12345),
        Err(ServiceError::InvalidArgument(_))
    ));
}

#[test]
fn disable_cancels_track_timers_and_enable_rearms() {
    let harness = HealthHarness::new();
    let client = TestClient::new(20);
    harness.register(&client, TimeoutTrack::Moderate, 100);
    assert!(harness.scheduler.lock().is_scheduled("health:moderate"));

    harness.service.set_enabled(false);
    assert!(!harness.service.is_enabled());
    assert!(!harness.scheduler.lock().is_scheduled("health:moderate"));

    harness.service.set_enabled(true);
    assert!(harness.scheduler.lock().is_scheduled("health:moderate"));
}

#[test]
fn client_check_window_override_applies_to_every_track() {
    let harness = HealthHarness::with_config(HealthConfig {
        client_check_window: Some(std::time::Duration::from_secs(20)),
        ..HealthConfig::default()
    });
    for track in TimeoutTrack::ALL {
        assert_eq!(harness.service.timeout_for(track), std::time::Duration::from_secs(20));
    }
}

#[test]
fn client_check_window_override_is_floored_at_the_normal_timeout() {
    let harness = HealthHarness::with_config(HealthConfig {
        client_check_window: Some(std::time::Duration::from_secs(1)),
        ..HealthConfig::default()
    });
    assert_eq!(
        harness.service.timeout_for(TimeoutTrack::Critical),
        TimeoutTrack::Normal.timeout()
    );
}

#[test]
fn dump_lists_clients_and_monitor() {
    let harness = HealthHarness::new();
    let client = TestClient::new(30);
    harness.register(&client, TimeoutTrack::Critical, 321);
    harness.service.notify_user_state_change(10, false);

    let dump = harness.service.dump();
    assert!(dump.contains("CAR WATCHDOG PROCESS SERVICE"));
    assert!(dump.contains("pid = 321"));
    assert!(dump.contains("Monitor registered: false"));
    assert!(dump.contains("Stopped users: 10"));
}

#[test]
fn terminate_clears_registrations() {
    let mut harness = HealthHarness::new();
    harness.service.start().unwrap();
    harness.pump();
    let client = TestClient::new(31);
    harness.register(&client, TimeoutTrack::Critical, 100);
    let monitor = TestMonitor::new(32);
    harness.register_monitor(&monitor);

    harness.service.terminate();
    assert_eq!(harness.service.registered_client_count(TimeoutTrack::Critical), 0);
    assert!(!harness.service.has_monitor());
    assert!(!harness.scheduler.lock().is_scheduled("health:critical"));
    assert!(!harness.scheduler.lock().is_scheduled(TIMER_VHAL_ALIVE));
}
