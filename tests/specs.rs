// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests across the daemon cores, driven with fakes and
//! a manually advanced clock.

use axle_adapters::death::FakeDeathRegistry;
use axle_adapters::resolver::CachingNameResolver;
use axle_adapters::stats::{
    FakeDiskStatsSource, FakeProcStatSource, FakeUidStatsSource, UidStats,
};
use axle_adapters::system::{FakeHalRegistry, FakeProcessInfoSource, FakeShutdownProbe};
use axle_adapters::vhal::{FakeVhal, FakeVhalConnector, PropValue, VhalProperty};
use axle_core::{
    CallerContext, Clock, FakeClock, Handle, ProcessIdentifier, ServiceError, TimeoutTrack,
    POLICY_ID_NO_USER_INTERACTION,
};
use axle_power::{PowerConfig, PowerMessage, PowerServer};
use axle_watchdog::{
    CollectionState, DataProcessor, HealthCheckClient, HealthDeps, PerfError, PerfSources,
    PerformanceProfiler, ProfilerConfig, WatchdogConfig, WatchdogMessage, WatchdogMonitor,
    WatchdogServer,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ---- shared power fixture ----

struct PowerFixture {
    server: PowerServer<FakeClock>,
    clock: FakeClock,
    vhal: Arc<FakeVhal>,
    rx: mpsc::UnboundedReceiver<PowerMessage>,
}

impl PowerFixture {
    fn new() -> Self {
        let clock = FakeClock::new();
        let vhal = FakeVhal::new();
        let monitor = axle_adapters::silent::FakeSilentModeMonitor::new();
        let kernel = axle_adapters::silent::FakeKernelSilentFile::new();
        let (server, rx) = PowerServer::new(
            PowerConfig::default(),
            Arc::new(FakeVhalConnector::new(Arc::clone(&vhal))) as _,
            monitor as _,
            kernel as _,
            FakeDeathRegistry::new() as _,
            clock.clone(),
        );
        Self { server, clock, vhal, rx }
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

    fn define(&self, id: &str, enabled: &[&str]) {
        let enabled: Vec<String> = enabled.iter().map(|s| s.to_string()).collect();
        self.server
            .coordinator()
            .notify_power_policy_definition(CallerContext::system(1), id, &enabled, &[])
            .unwrap();
    }
}

/// S1 — a preemptive policy locks out regular applies until a forced apply
/// clears the lock.
#[test]
fn s1_preemptive_lock_and_recovery() {
    let mut fixture = PowerFixture::new();
    fixture.server.init();
    fixture.pump();
    fixture.define("vendor_regular_a", &["AUDIO"]);
    fixture.define("vendor_regular_b", &["DISPLAY"]);
    let coordinator = fixture.server.coordinator();

    coordinator.apply_regular_policy("vendor_regular_a", false).unwrap();
    assert_eq!(coordinator.current_policy_id(), "vendor_regular_a");

    coordinator.apply_regular_policy(POLICY_ID_NO_USER_INTERACTION, false).unwrap();
    assert_eq!(coordinator.current_policy_id(), POLICY_ID_NO_USER_INTERACTION);
    assert!(coordinator.is_locked());

    // non-forced apply is deferred while locked
    coordinator.apply_regular_policy("vendor_regular_b", false).unwrap();
    assert_eq!(coordinator.current_policy_id(), POLICY_ID_NO_USER_INTERACTION);
    assert_eq!(coordinator.pending_policy_id(), "vendor_regular_b");

    // forced apply goes through, clears pending and the lock
    coordinator.apply_regular_policy("vendor_regular_b", true).unwrap();
    assert_eq!(coordinator.current_policy_id(), "vendor_regular_b");
    assert!(coordinator.pending_policy_id().is_empty());
    assert!(!coordinator.is_locked());

    // the applied policy is mirrored to the VHAL
    let mirrored = fixture.vhal.last_set(VhalProperty::CurrentPowerPolicy).unwrap();
    assert_eq!(mirrored.string, "vendor_regular_b");
}

// ---- shared watchdog fixture ----

#[derive(Clone, Default)]
struct TickLog(Arc<Mutex<Vec<String>>>);

struct TickProcessor(TickLog);

impl DataProcessor for TickProcessor {
    fn name(&self) -> &'static str {
        "TickProcessor"
    }

    fn on_boottime_collection(
        &mut self,
        now_ms: u64,
        _uid: &[UidStats],
        _proc: &axle_adapters::stats::ProcStatDelta,
    ) -> Result<(), PerfError> {
        self.0 .0.lock().push(format!("boottime@{now_ms}"));
        Ok(())
    }

    fn on_periodic_collection(
        &mut self,
        now_ms: u64,
        _uid: &[UidStats],
        _proc: &axle_adapters::stats::ProcStatDelta,
    ) -> Result<(), PerfError> {
        self.0 .0.lock().push(format!("periodic@{now_ms}"));
        Ok(())
    }

    fn on_custom_collection(
        &mut self,
        now_ms: u64,
        _filter: &std::collections::HashSet<String>,
        _uid: &[UidStats],
        _proc: &axle_adapters::stats::ProcStatDelta,
    ) -> Result<(), PerfError> {
        self.0 .0.lock().push(format!("custom@{now_ms}"));
        Ok(())
    }

    fn on_custom_collection_dump(
        &mut self,
        _report: Option<&mut String>,
    ) -> Result<(), PerfError> {
        self.0 .0.lock().push("custom-cleared".to_string());
        Ok(())
    }
}

struct WatchdogFixture {
    server: WatchdogServer<FakeClock>,
    clock: FakeClock,
    vhal: Arc<FakeVhal>,
    process_info: Arc<FakeProcessInfoSource>,
    hal_registry: Arc<FakeHalRegistry>,
    log: TickLog,
    rx: mpsc::UnboundedReceiver<WatchdogMessage>,
}

impl WatchdogFixture {
    fn new(config: WatchdogConfig) -> Self {
        let clock = FakeClock::new();
        clock.set_epoch_ms(0);
        let vhal = FakeVhal::new();
        let process_info = FakeProcessInfoSource::new();
        let hal_registry = FakeHalRegistry::new();
        let log = TickLog::default();
        let (server, rx) = WatchdogServer::new(
            config,
            HealthDeps {
                connector: Arc::new(FakeVhalConnector::new(Arc::clone(&vhal))) as _,
                death_registry: FakeDeathRegistry::new() as _,
                process_info: Arc::clone(&process_info) as _,
                hal_registry: Arc::clone(&hal_registry) as _,
                shutdown: FakeShutdownProbe::new() as _,
            },
            PerfSources {
                uid_stats: Box::new(FakeUidStatsSource::new()),
                proc_stat: Box::new(FakeProcStatSource::new()),
                disk_stats: Box::new(FakeDiskStatsSource::new()),
            },
            vec![Box::new(TickProcessor(log.clone())) as Box<dyn DataProcessor>],
            clock.clone(),
        );
        Self { server, clock, vhal, process_info, hal_registry, log, rx }
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

    fn advance_and_pump(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.pump();
    }

    fn ticks(&self, prefix: &str) -> Vec<String> {
        self.log.0.lock().iter().filter(|t| t.starts_with(prefix)).cloned().collect()
    }
}

struct SpecClient {
    handle: Handle,
    sessions: Mutex<Vec<i32>>,
}

impl SpecClient {
    fn new(handle: u64) -> Arc<Self> {
        Arc::new(Self { handle: Handle::new(handle), sessions: Mutex::new(Vec::new()) })
    }

    fn last_session(&self) -> i32 {
        *self.sessions.lock().last().unwrap_or(&0)
    }
}

impl HealthCheckClient for SpecClient {
    fn handle(&self) -> Handle {
        self.handle
    }

    fn check_if_alive(&self, session_id: i32, _track: TimeoutTrack) -> Result<(), ServiceError> {
        self.sessions.lock().push(session_id);
        Ok(())
    }

    fn prepare_process_termination(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

struct SpecMonitor {
    escalations: Mutex<Vec<Vec<ProcessIdentifier>>>,
}

impl SpecMonitor {
    fn new() -> Arc<Self> {
        Arc::new(Self { escalations: Mutex::new(Vec::new()) })
    }
}

impl WatchdogMonitor for SpecMonitor {
    fn handle(&self) -> Handle {
        Handle::new(0x300)
    }

    fn on_clients_not_responding(
        &self,
        clients: &[ProcessIdentifier],
    ) -> Result<(), ServiceError> {
        self.escalations.lock().push(clients.to_vec());
        Ok(())
    }
}

/// S2 — boot-time ticks flow until boot completes, then the periodic phase
/// takes over one periodic interval later.
#[test]
fn s2_boottime_to_periodic_transition() {
    let mut config = WatchdogConfig::default();
    config.perf.boottime_interval = Duration::from_secs(1);
    config.perf.periodic_interval = Duration::from_secs(5);
    let mut fixture = WatchdogFixture::new(config);
    fixture.server.start().unwrap();
    fixture.pump();

    fixture.advance_and_pump(Duration::from_secs(1));
    fixture.advance_and_pump(Duration::from_secs(1));
    assert_eq!(
        fixture.ticks("boottime"),
        vec!["boottime@0", "boottime@1000", "boottime@2000"]
    );

    fixture.clock.advance(Duration::from_millis(500));
    fixture.server.on_boot_finished().unwrap();
    fixture.pump();
    assert_eq!(fixture.ticks("boottime").last().unwrap(), "boottime@2500");
    assert_eq!(fixture.server.perf().state(), CollectionState::Periodic);

    fixture.advance_and_pump(Duration::from_secs(5));
    assert_eq!(fixture.ticks("periodic"), vec!["periodic@7500"]);
}

/// S3 — a client that misses its critical deadline is escalated to the
/// monitor and dropped from the registry.
#[test]
fn s3_health_check_escalation() {
    let mut fixture = WatchdogFixture::new(WatchdogConfig::default());
    fixture.server.start().unwrap();
    fixture.pump();
    let monitor = SpecMonitor::new();
    fixture.server.register_monitor(Arc::clone(&monitor) as _).unwrap();

    let responsive = SpecClient::new(1);
    let silent = SpecClient::new(2);
    fixture.process_info.set_process(100, 5_100, "/system/bin/responsive");
    fixture.process_info.set_process(200, 5_200, "/system/bin/silent");
    fixture
        .server
        .register_client(
            Arc::clone(&responsive) as _,
            TimeoutTrack::Critical,
            CallerContext::new(100, 1000),
        )
        .unwrap();
    fixture
        .server
        .register_client(
            Arc::clone(&silent) as _,
            TimeoutTrack::Critical,
            CallerContext::new(200, 1000),
        )
        .unwrap();

    // round 1 at t=3s: both pinged with distinct sessions
    fixture.advance_and_pump(Duration::from_secs(3));
    let s1 = responsive.last_session();
    let s2 = silent.last_session();
    assert!(s1 > 0 && s2 > 0 && s1 != s2);

    // only s1 responds before t=6s
    fixture.server.tell_client_alive(Handle::new(1), s1).unwrap();
    fixture.advance_and_pump(Duration::from_secs(3));

    let escalations = monitor.escalations.lock();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0], vec![ProcessIdentifier { pid: 200, start_time_ms: 5_200 }]);
    drop(escalations);
    assert_eq!(
        fixture.server.health().registered_client_count(TimeoutTrack::Critical),
        1
    );
}

/// S4 — a custom collection emits on its interval and auto-ends at max
/// duration, discarding the data and resuming the periodic phase.
#[test]
fn s4_custom_collection_auto_end() {
    let mut fixture = WatchdogFixture::new(WatchdogConfig::default());
    fixture.server.start().unwrap();
    fixture.pump();
    fixture.server.on_boot_finished().unwrap();
    fixture.pump();
    let custom_start_ms = fixture.clock.epoch_ms();

    let args: Vec<String> =
        ["--start_perf", "--interval", "3", "--max_duration", "11"]
            .iter()
            .map(|s| s.to_string())
            .collect();
    fixture.server.dump(&args, &mut String::new()).unwrap();
    fixture.pump();

    for _ in 0..3 {
        fixture.advance_and_pump(Duration::from_secs(3));
    }
    let expected: Vec<String> = [0u64, 3_000, 6_000, 9_000]
        .iter()
        .map(|offset| format!("custom@{}", custom_start_ms + offset))
        .collect();
    assert_eq!(fixture.ticks("custom@"), expected);

    fixture.advance_and_pump(Duration::from_secs(2));
    assert_eq!(fixture.server.perf().state(), CollectionState::Periodic);
    assert_eq!(fixture.ticks("custom-cleared").len(), 1);
}

/// S5 — memory top-N ranks by PSS when smaps rollup is supported, by RSS
/// otherwise.
#[test]
fn s5_top_n_memory_ranking() {
    let resolver = Arc::new(CachingNameResolver::new());
    let stats = vec![
        UidStats { uid: 1001, rss_kb: 2000, pss_kb: 1635, ..Default::default() },
        UidStats { uid: 1002, rss_kb: 1000, pss_kb: 1645, ..Default::default() },
        UidStats { uid: 1003, rss_kb: 2010, pss_kb: 865, ..Default::default() },
    ];
    let proc_stat = axle_adapters::stats::ProcStatDelta::default();

    let mut with_pss = PerformanceProfiler::new(
        ProfilerConfig { smaps_rollup_supported: true, ..ProfilerConfig::default() },
        Arc::clone(&resolver) as _,
    );
    with_pss.on_periodic_collection(1_000, &stats, &proc_stat).unwrap();
    let order: Vec<u32> = with_pss.periodic_records()[0]
        .packages
        .top_memory
        .iter()
        .map(|p| p.uid)
        .collect();
    assert_eq!(order, vec![1002, 1001, 1003]); // PSS 1645, 1635, 865

    let mut with_rss = PerformanceProfiler::new(
        ProfilerConfig { smaps_rollup_supported: false, ..ProfilerConfig::default() },
        resolver as _,
    );
    with_rss.on_periodic_collection(1_000, &stats, &proc_stat).unwrap();
    let order: Vec<u32> = with_rss.periodic_records()[0]
        .packages
        .top_memory
        .iter()
        .map(|p| p.uid)
        .collect();
    assert_eq!(order, vec![1003, 1001, 1002]); // RSS 2010, 2000, 1000
}

/// S6 — a heartbeat regression terminates the VHAL: the monitor receives the
/// VHAL process and no terminated-process report goes back to the VHAL.
#[test]
fn s6_vhal_heartbeat_regression() {
    let mut fixture = WatchdogFixture::new(WatchdogConfig::default());
    let monitor = SpecMonitor::new();
    fixture.server.register_monitor(Arc::clone(&monitor) as _).unwrap();
    fixture
        .hal_registry
        .add_hal("android.hardware.automotive.vehicle@2.0::IVehicle", 4242);
    fixture.process_info.set_process(4242, 77, "/vendor/bin/vhal");
    fixture.server.start().unwrap();
    fixture.pump();

    fixture.vhal.deliver(PropValue::int64_value(VhalProperty::VhalHeartbeat, 100));
    fixture.vhal.deliver(PropValue::int64_value(VhalProperty::VhalHeartbeat, 95));

    let escalations = monitor.escalations.lock();
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0], vec![ProcessIdentifier { pid: 4242, start_time_ms: 77 }]);
    drop(escalations);
    assert!(fixture
        .vhal
        .last_set(VhalProperty::WatchdogTerminatedProcess)
        .is_none());
}
