// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process health-check service.
//!
//! Client registration and the per-track registries live here; the ping
//! rounds are in `rounds.rs` and the VHAL supervision (heartbeat, alive
//! reporting, terminated-process reporting) in `vhal.rs`. One mutex guards
//! all of it; pings, monitor escalation, and VHAL writes happen against
//! snapshots taken under the lock.

mod rounds;
mod vhal;

use crate::client::{ClientInfo, ClientKind, HealthCheckClient, WatchdogMonitor};
use crate::message::{health_timer_id, WatchdogMessage, TIMER_VHAL_HEALTH};
use axle_core::{
    CallerContext, Clock, Handle, ProcessIdentifier, Scheduler, ServiceError, TimeoutTrack,
};
use axle_adapters::death::{DeathRecipient, DeathRegistry};
use axle_adapters::system::{HalRegistry, ProcessInfoSource, ShutdownProbe};
use axle_adapters::vhal::{VhalClient, VhalConnector, VhalProperty};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

/// Android-style mapping from uid to the owning user.
const UIDS_PER_USER: u32 = 100_000;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// VHAL heartbeat window. Values below 3 s are raised to 3 s.
    pub vhal_check_interval: Duration,
    /// Override for all three track timeouts; raised to at least the normal
    /// track timeout when set.
    pub client_check_window: Option<Duration>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { vhal_check_interval: Duration::from_secs(3), client_check_window: None }
    }
}

impl HealthConfig {
    fn normalized(mut self) -> Self {
        self.vhal_check_interval = self.vhal_check_interval.max(Duration::from_secs(3));
        self.client_check_window =
            self.client_check_window.map(|w| w.max(TimeoutTrack::Normal.timeout()));
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Heartbeat {
    pub value: i64,
    pub event_time_ms: u64,
}

pub(crate) struct HealthInner {
    pub enabled: bool,
    pub started: bool,
    pub clients: HashMap<TimeoutTrack, IndexMap<u64, ClientInfo>>,
    pub pinged: HashMap<TimeoutTrack, HashMap<i32, ClientInfo>>,
    pub last_session_id: i32,
    pub stopped_users: HashSet<i32>,
    pub monitor: Option<Arc<dyn WatchdogMonitor>>,
    pub vhal: Option<Arc<dyn VhalClient>>,
    pub unsupported_props: HashSet<VhalProperty>,
    pub heartbeat: Heartbeat,
    pub vhal_connect_attempts_remaining: u32,
}

pub struct ProcessHealthService<C: Clock> {
    pub(crate) clock: C,
    pub(crate) config: HealthConfig,
    pub(crate) connector: Arc<dyn VhalConnector>,
    pub(crate) death_registry: Arc<dyn DeathRegistry>,
    pub(crate) process_info: Arc<dyn ProcessInfoSource>,
    pub(crate) hal_registry: Arc<dyn HalRegistry>,
    pub(crate) shutdown: Arc<dyn ShutdownProbe>,
    pub(crate) scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
    pub(crate) tx: mpsc::UnboundedSender<WatchdogMessage>,
    pub(crate) inner: Mutex<HealthInner>,
}

pub struct HealthDeps {
    pub connector: Arc<dyn VhalConnector>,
    pub death_registry: Arc<dyn DeathRegistry>,
    pub process_info: Arc<dyn ProcessInfoSource>,
    pub hal_registry: Arc<dyn HalRegistry>,
    pub shutdown: Arc<dyn ShutdownProbe>,
}

impl<C: Clock + 'static> ProcessHealthService<C> {
    pub fn new(
        config: HealthConfig,
        deps: HealthDeps,
        scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
        tx: mpsc::UnboundedSender<WatchdogMessage>,
        clock: C,
    ) -> Arc<Self> {
        let mut clients = HashMap::new();
        let mut pinged = HashMap::new();
        for track in TimeoutTrack::ALL {
            clients.insert(track, IndexMap::new());
            pinged.insert(track, HashMap::new());
        }
        Arc::new(Self {
            clock,
            config: config.normalized(),
            connector: deps.connector,
            death_registry: deps.death_registry,
            process_info: deps.process_info,
            hal_registry: deps.hal_registry,
            shutdown: deps.shutdown,
            scheduler,
            tx,
            inner: Mutex::new(HealthInner {
                enabled: true,
                started: false,
                clients,
                pinged,
                last_session_id: 0,
                stopped_users: HashSet::new(),
                monitor: None,
                vhal: None,
                unsupported_props: HashSet::new(),
                heartbeat: Heartbeat::default(),
                vhal_connect_attempts_remaining: 0,
            }),
        })
    }

    /// Start VHAL supervision and watchdog-alive reporting. One-shot.
    pub fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        {
            let mut inner = self.inner.lock();
            if inner.started {
                return Err(ServiceError::illegal_state(
                    "cannot start process monitoring more than once",
                ));
            }
            inner.started = true;
            inner.vhal_connect_attempts_remaining = vhal::MAX_CONNECT_ATTEMPTS;
        }
        if self.tx.send(WatchdogMessage::ConnectVhal).is_err() {
            tracing::error!("dispatcher is not running; cannot connect to VHAL");
        }
        self.report_watchdog_alive();
        Ok(())
    }

    // ---- registration ----

    pub fn register_client(
        self: &Arc<Self>,
        client: Arc<dyn HealthCheckClient>,
        track: TimeoutTrack,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        self.register_client_info(client, ClientKind::Regular, track, caller)
    }

    /// The framework service registers on the critical track.
    pub fn register_framework_service(
        self: &Arc<Self>,
        service: Arc<dyn HealthCheckClient>,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        self.register_client_info(
            service,
            ClientKind::FrameworkService,
            TimeoutTrack::Critical,
            caller,
        )
    }

    fn register_client_info(
        self: &Arc<Self>,
        client: Arc<dyn HealthCheckClient>,
        kind: ClientKind,
        track: TimeoutTrack,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        let handle = client.handle();
        let start_time_ms = self
            .process_info
            .start_time_ms(caller.pid)
            .unwrap_or_else(|_| self.clock.uptime_ms());
        let info = ClientInfo {
            client,
            kind,
            pid: caller.pid,
            uid: caller.uid,
            user_id: (caller.uid / UIDS_PER_USER) as i32,
            start_time_ms,
            session_id: 0,
        };
        {
            let mut inner = self.inner.lock();
            if find_client(&inner.clients, handle).is_some() {
                tracing::warn!(client = %info.describe(), "already registered; ignoring");
                return Ok(());
            }
            if let Some(clients) = inner.clients.get_mut(&track) {
                clients.insert(handle.raw(), info.clone());
            }
        }
        if self.death_registry.link(handle, self.death_recipient()).is_err() {
            let mut inner = self.inner.lock();
            if let Some(clients) = inner.clients.get_mut(&track) {
                clients.shift_remove(&handle.raw());
            }
            tracing::warn!(client = %info.describe(), "failed to register; client is dead");
            return Err(ServiceError::illegal_state(format!("({}) is dead", info.describe())));
        }
        let mut inner = self.inner.lock();
        // If the client array becomes non-empty, start health checking.
        if inner.clients.get(&track).map(IndexMap::len) == Some(1) {
            self.start_health_checking_locked(&mut inner, track);
            tracing::info!(%track, "starting health checking");
        }
        Ok(())
    }

    pub fn unregister_client(&self, handle: Handle) -> Result<(), ServiceError> {
        self.unregister_client_of_kind(handle, ClientKind::Regular)
    }

    pub fn unregister_framework_service(&self, handle: Handle) -> Result<(), ServiceError> {
        self.unregister_client_of_kind(handle, ClientKind::FrameworkService)
    }

    fn unregister_client_of_kind(
        &self,
        handle: Handle,
        kind: ClientKind,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        for track in TimeoutTrack::ALL {
            let Some(clients) = inner.clients.get_mut(&track) else { continue };
            if clients.get(&handle.raw()).is_some_and(|c| c.kind == kind) {
                clients.shift_remove(&handle.raw());
                self.death_registry.unlink(handle);
                return Ok(());
            }
        }
        Err(ServiceError::invalid_argument(format!(
            "the car watchdog {} has not been registered",
            kind.as_str()
        )))
    }

    pub fn register_monitor(
        self: &Arc<Self>,
        monitor: Arc<dyn WatchdogMonitor>,
    ) -> Result<(), ServiceError> {
        let handle = monitor.handle();
        {
            let mut inner = self.inner.lock();
            if let Some(current) = &inner.monitor {
                if current.handle() == handle {
                    return Ok(());
                }
                self.death_registry.unlink(current.handle());
            }
            inner.monitor = Some(monitor);
        }
        if self.death_registry.link(handle, self.death_recipient()).is_err() {
            let mut inner = self.inner.lock();
            if inner.monitor.as_ref().is_some_and(|m| m.handle() == handle) {
                inner.monitor = None;
            }
            tracing::warn!("failed to register the monitor as it is dead");
            return Err(ServiceError::illegal_state("the monitor is dead"));
        }
        Ok(())
    }

    pub fn unregister_monitor(&self, handle: Handle) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.monitor.as_ref().map(|m| m.handle()) != Some(handle) {
            tracing::warn!("failed to unregister the monitor as it has not been registered");
            return Err(ServiceError::invalid_argument(
                "the monitor has not been registered",
            ));
        }
        self.death_registry.unlink(handle);
        inner.monitor = None;
        Ok(())
    }

    pub fn tell_dump_finished(
        &self,
        monitor: Handle,
        process: ProcessIdentifier,
    ) -> Result<(), ServiceError> {
        let inner = self.inner.lock();
        if inner.monitor.as_ref().map(|m| m.handle()) != Some(monitor) {
            return Err(ServiceError::invalid_argument(
                "the monitor is not registered or an invalid monitor is given",
            ));
        }
        tracing::info!(pid = process.pid, "process has been dumped and killed");
        Ok(())
    }

    // ---- liveness responses ----

    pub fn tell_client_alive(&self, handle: Handle, session_id: i32) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        self.tell_client_alive_locked(&mut inner, handle, session_id)
    }

    /// Framework-service response: confirms its own session and forwards the
    /// processes it found unresponsive on its side.
    pub fn tell_framework_service_alive(
        &self,
        handle: Handle,
        clients_not_responding: &[ProcessIdentifier],
        session_id: i32,
    ) -> Result<(), ServiceError> {
        {
            let mut inner = self.inner.lock();
            self.tell_client_alive_locked(&mut inner, handle, session_id)?;
        }
        if let Err(e) = self.dump_and_kill_all(clients_not_responding, true) {
            tracing::warn!(error = %e, "failed to escalate framework-reported processes");
        }
        Ok(())
    }

    fn tell_client_alive_locked(
        &self,
        inner: &mut HealthInner,
        handle: Handle,
        session_id: i32,
    ) -> Result<(), ServiceError> {
        for track in TimeoutTrack::ALL {
            let Some(pinged) = inner.pinged.get_mut(&track) else { continue };
            if pinged.get(&session_id).is_some_and(|c| c.client.handle() == handle) {
                pinged.remove(&session_id);
                return Ok(());
            }
        }
        Err(ServiceError::invalid_argument(
            "the client is not registered or the session ID is not found",
        ))
    }

    // ---- user state / enablement ----

    pub fn notify_user_state_change(&self, user_id: i32, started: bool) {
        let mut inner = self.inner.lock();
        if started {
            inner.stopped_users.remove(&user_id);
        } else {
            inner.stopped_users.insert(user_id);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        if inner.enabled == enabled {
            return;
        }
        tracing::info!(enabled, "process health checking toggled");
        inner.enabled = enabled;
        let mut scheduler = self.scheduler.lock();
        scheduler.cancel_timer(TIMER_VHAL_HEALTH);
        if !enabled {
            for track in TimeoutTrack::ALL {
                scheduler.cancel_timer(&health_timer_id(track));
            }
            return;
        }
        drop(scheduler);
        // Reset the heartbeat baseline so a paused VHAL is not blamed for the
        // disabled period.
        inner.heartbeat.event_time_ms = self.clock.uptime_ms();
        if inner.vhal.is_some()
            && !inner.unsupported_props.contains(&VhalProperty::VhalHeartbeat)
        {
            self.arm_vhal_health_check_locked();
        }
        for track in TimeoutTrack::ALL {
            self.scheduler.lock().cancel_timer(&health_timer_id(track));
            self.start_health_checking_locked(&mut inner, track);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    // ---- shared helpers ----

    pub(crate) fn timeout_for(&self, track: TimeoutTrack) -> Duration {
        self.config.client_check_window.unwrap_or_else(|| track.timeout())
    }

    pub(crate) fn start_health_checking_locked(&self, inner: &mut HealthInner, track: TimeoutTrack) {
        if let Some(pinged) = inner.pinged.get_mut(&track) {
            pinged.clear();
        }
        self.scheduler.lock().set_timer(
            health_timer_id(track),
            WatchdogMessage::HealthCheck(track),
            self.timeout_for(track),
            self.clock.now(),
        );
    }

    pub(crate) fn new_session_id_locked(inner: &mut HealthInner) -> i32 {
        // Session ids stay positive and skip 0 on wrap.
        inner.last_session_id = inner.last_session_id.wrapping_add(1);
        if inner.last_session_id <= 0 {
            inner.last_session_id = 1;
        }
        inner.last_session_id
    }

    fn death_recipient(self: &Arc<Self>) -> Arc<dyn DeathRecipient> {
        Arc::new(HealthDeathRecipient(Arc::downgrade(self)))
    }

    fn handle_death(&self, handle: Handle) {
        let mut inner = self.inner.lock();
        if inner.monitor.as_ref().map(|m| m.handle()) == Some(handle) {
            tracing::warn!("the monitor has died");
            inner.monitor = None;
            return;
        }
        for track in TimeoutTrack::ALL {
            let Some(clients) = inner.clients.get_mut(&track) else { continue };
            if let Some(info) = clients.shift_remove(&handle.raw()) {
                tracing::warn!(pid = info.pid, "client died");
                return;
            }
        }
    }

    pub fn registered_client_count(&self, track: TimeoutTrack) -> usize {
        self.inner.lock().clients.get(&track).map(IndexMap::len).unwrap_or(0)
    }

    pub fn has_monitor(&self) -> bool {
        self.inner.lock().monitor.is_some()
    }

    pub fn dump(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "CAR WATCHDOG PROCESS SERVICE");
        let _ = writeln!(out, "  Enabled: {}", inner.enabled);
        let _ = writeln!(out, "  Registered clients");
        let mut count = 1;
        for track in TimeoutTrack::ALL {
            if let Some(clients) = inner.clients.get(&track) {
                for info in clients.values() {
                    let _ = writeln!(
                        out,
                        "    Client #{count}: {} (track: {track})",
                        info.describe()
                    );
                    count += 1;
                }
            }
        }
        let _ = writeln!(out, "  Monitor registered: {}", inner.monitor.is_some());
        let stopped = if inner.stopped_users.is_empty() {
            "none".to_string()
        } else {
            let mut users: Vec<i32> = inner.stopped_users.iter().copied().collect();
            users.sort_unstable();
            users.iter().map(|u| u.to_string()).collect::<Vec<_>>().join(", ")
        };
        let _ = writeln!(out, "  Stopped users: {stopped}");
        let _ = writeln!(
            out,
            "  VHAL health check interval: {}ms",
            self.config.vhal_check_interval.as_millis()
        );
        out
    }

    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if !inner.started {
            return;
        }
        for track in TimeoutTrack::ALL {
            if let Some(clients) = inner.clients.get_mut(&track) {
                for info in clients.values() {
                    self.death_registry.unlink(info.client.handle());
                }
                clients.clear();
            }
            if let Some(pinged) = inner.pinged.get_mut(&track) {
                pinged.clear();
            }
        }
        if let Some(monitor) = inner.monitor.take() {
            self.death_registry.unlink(monitor.handle());
        }
        inner.started = false;
        let mut scheduler = self.scheduler.lock();
        scheduler.cancel_timers_with_prefix(crate::message::TIMER_PREFIX_HEALTH);
        scheduler.cancel_timer(TIMER_VHAL_HEALTH);
        scheduler.cancel_timer(crate::message::TIMER_VHAL_ALIVE);
        scheduler.cancel_timer(crate::message::TIMER_CONNECT_VHAL);
        drop(scheduler);
        if let Some(vhal) = inner.vhal.take() {
            if !inner.unsupported_props.contains(&VhalProperty::VhalHeartbeat) {
                if let Err(e) = vhal.unsubscribe(&[VhalProperty::VhalHeartbeat]) {
                    tracing::warn!(error = %e, "failed to unsubscribe from VHAL heartbeat");
                }
            }
        }
    }
}

pub(crate) fn find_client(
    clients: &HashMap<TimeoutTrack, IndexMap<u64, ClientInfo>>,
    handle: Handle,
) -> Option<(TimeoutTrack, ClientInfo)> {
    for track in TimeoutTrack::ALL {
        if let Some(info) = clients.get(&track).and_then(|c| c.get(&handle.raw())) {
            return Some((track, info.clone()));
        }
    }
    None
}

struct HealthDeathRecipient<C: Clock>(Weak<ProcessHealthService<C>>);

impl<C: Clock + 'static> DeathRecipient for HealthDeathRecipient<C> {
    fn on_died(&self, handle: Handle) {
        if let Some(service) = self.0.upgrade() {
            service.handle_death(handle);
        }
    }
}

#[cfg(test)]
#[path = "../health_tests/mod.rs"]
mod tests;
