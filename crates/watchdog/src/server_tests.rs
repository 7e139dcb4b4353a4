// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::perf::{PerformanceProfiler, ProfilerConfig};
use axle_core::FakeClock;
use axle_adapters::death::FakeDeathRegistry;
use axle_adapters::resolver::CachingNameResolver;
use axle_adapters::stats::{FakeDiskStatsSource, FakeProcStatSource, FakeUidStatsSource};
use axle_adapters::system::{FakeHalRegistry, FakeProcessInfoSource, FakeShutdownProbe};
use axle_adapters::vhal::{FakeVhal, FakeVhalConnector};
use std::time::Duration;

struct ServerHarness {
    server: WatchdogServer<FakeClock>,
    clock: FakeClock,
    process_info: Arc<FakeProcessInfoSource>,
    rx: mpsc::UnboundedReceiver<WatchdogMessage>,
}

impl ServerHarness {
    fn new() -> Self {
        let clock = FakeClock::new();
        let vhal = FakeVhal::new();
        let process_info = FakeProcessInfoSource::new();
        let resolver = Arc::new(CachingNameResolver::new());
        let profiler = PerformanceProfiler::new(ProfilerConfig::default(), resolver);
        let (server, rx) = WatchdogServer::new(
            WatchdogConfig::default(),
            HealthDeps {
                connector: Arc::new(FakeVhalConnector::new(vhal)) as _,
                death_registry: FakeDeathRegistry::new() as _,
                process_info: Arc::clone(&process_info) as _,
                hal_registry: FakeHalRegistry::new() as _,
                shutdown: FakeShutdownProbe::new() as _,
            },
            PerfSources {
                uid_stats: Box::new(FakeUidStatsSource::new()),
                proc_stat: Box::new(FakeProcStatSource::new()),
                disk_stats: Box::new(FakeDiskStatsSource::new()),
            },
            vec![Box::new(profiler) as Box<dyn DataProcessor>],
            clock.clone(),
        );
        Self { server, clock, process_info, rx }
    }

    fn pump(&mut self) {
        loop {
            let mut messages: Vec<WatchdogMessage> = Vec::new();
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

struct NullClient(Handle);

impl HealthCheckClient for NullClient {
    fn handle(&self) -> Handle {
        self.0
    }

    fn check_if_alive(&self, _session_id: i32, _track: TimeoutTrack) -> Result<(), ServiceError> {
        Ok(())
    }

    fn prepare_process_termination(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[test]
fn start_brings_up_both_services() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();

    assert_eq!(harness.server.perf().state(), crate::perf::CollectionState::BootTime);
    assert!(harness.server.health().is_enabled());
}

#[test]
fn client_registration_flows_through_the_server() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();

    harness.process_info.set_process(55, 1_055, "/system/bin/svc");
    let client = Arc::new(NullClient(Handle::new(55)));
    harness
        .server
        .register_client(client as _, TimeoutTrack::Critical, CallerContext::new(55, 1000))
        .unwrap();
    assert_eq!(harness.server.health().registered_client_count(TimeoutTrack::Critical), 1);
    harness.server.unregister_client(Handle::new(55)).unwrap();
    assert_eq!(harness.server.health().registered_client_count(TimeoutTrack::Critical), 0);
}

#[test]
fn plain_dump_contains_both_service_reports() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();

    let mut report = String::new();
    harness.server.dump(&[], &mut report).unwrap();
    assert!(report.contains("CAR WATCHDOG PROCESS SERVICE"));
    assert!(report.contains("Boot-time collection interval"));
    assert!(report.contains("Boot-time performance report"));
}

#[test]
fn dump_routes_custom_collection_commands() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();
    harness.server.on_boot_finished().unwrap();
    harness.pump();

    let mut report = String::new();
    harness
        .server
        .dump(&["--start_perf".to_string(), "--interval".to_string(), "5".to_string()], &mut report)
        .unwrap();
    harness.pump();
    assert_eq!(harness.server.perf().state(), crate::perf::CollectionState::Custom);

    harness.clock.advance(Duration::from_secs(5));
    harness.pump();

    let mut report = String::new();
    harness.server.dump(&["--stop_perf".to_string()], &mut report).unwrap();
    assert!(report.contains("Custom performance report"));
    assert_eq!(harness.server.perf().state(), crate::perf::CollectionState::Periodic);
}

#[test]
fn structured_dump_is_json() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();
    let value = harness.server.dump_structured();
    assert!(value["processors"].is_array());
}

#[test]
fn terminate_stops_everything() {
    let mut harness = ServerHarness::new();
    harness.server.start().unwrap();
    harness.pump();
    harness.server.terminate();
    assert_eq!(harness.server.perf().state(), crate::perf::CollectionState::Terminated);
    assert!(!harness.server.scheduler().lock().has_timers());
}
