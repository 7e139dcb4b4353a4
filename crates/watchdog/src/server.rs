// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root for the watchdog daemon.
//!
//! Routes dispatcher messages to the health service and the collection
//! service, and exposes the RPC and dump surfaces. The run loop lives in the
//! daemon crate.

use crate::client::{HealthCheckClient, WatchdogMonitor};
use crate::health::{HealthConfig, HealthDeps, ProcessHealthService};
use crate::message::WatchdogMessage;
use crate::perf::{PerfConfig, PerfService, PerfSources, DataProcessor};
use axle_core::{
    CallerContext, Clock, Handle, ProcessIdentifier, Scheduler, ServiceError, TimeoutTrack,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Default)]
pub struct WatchdogConfig {
    pub health: HealthConfig,
    pub perf: PerfConfig,
}

/// Exit codes for the textual dump surface.
pub const DUMP_EXIT_OK: i32 = 0;
pub const DUMP_EXIT_BAD_VALUE: i32 = -22;
pub const DUMP_EXIT_FAILED_TRANSACTION: i32 = -2147483646;

pub fn dump_exit_code(result: &Result<(), ServiceError>) -> i32 {
    match result {
        Ok(()) => DUMP_EXIT_OK,
        Err(ServiceError::InvalidArgument(_)) => DUMP_EXIT_BAD_VALUE,
        Err(_) => DUMP_EXIT_FAILED_TRANSACTION,
    }
}

pub struct WatchdogServer<C: Clock + 'static> {
    health: Arc<ProcessHealthService<C>>,
    perf: Arc<PerfService<C>>,
    scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
}

impl<C: Clock + 'static> WatchdogServer<C> {
    pub fn new(
        config: WatchdogConfig,
        health_deps: HealthDeps,
        sources: PerfSources,
        processors: Vec<Box<dyn DataProcessor>>,
        clock: C,
    ) -> (Self, mpsc::UnboundedReceiver<WatchdogMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Mutex::new(Scheduler::new()));
        let health = ProcessHealthService::new(
            config.health,
            health_deps,
            Arc::clone(&scheduler),
            tx.clone(),
            clock.clone(),
        );
        let perf = PerfService::new(
            config.perf,
            sources,
            processors,
            Arc::clone(&scheduler),
            tx,
            clock,
        );
        (Self { health, perf, scheduler }, rx)
    }

    /// Start both services.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.health.start()?;
        self.perf.start()
    }

    /// Dispatcher-side message handler.
    pub fn handle_message(&self, message: WatchdogMessage) {
        match message {
            WatchdogMessage::HealthCheck(track) => self.health.do_health_check(track),
            WatchdogMessage::ConnectVhal => self.health.connect_vhal_once(),
            WatchdogMessage::ReportWatchdogAlive => self.health.report_watchdog_alive(),
            WatchdogMessage::CheckVhalHealth => self.health.check_vhal_health(),
            collection => self.perf.handle_message(&collection),
        }
    }

    pub fn scheduler(&self) -> Arc<Mutex<Scheduler<WatchdogMessage>>> {
        Arc::clone(&self.scheduler)
    }

    pub fn health(&self) -> &Arc<ProcessHealthService<C>> {
        &self.health
    }

    pub fn perf(&self) -> &Arc<PerfService<C>> {
        &self.perf
    }

    // ---- RPC surface passthrough ----

    pub fn register_client(
        &self,
        client: Arc<dyn HealthCheckClient>,
        track: TimeoutTrack,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        self.health.register_client(client, track, caller)
    }

    pub fn unregister_client(&self, handle: Handle) -> Result<(), ServiceError> {
        self.health.unregister_client(handle)
    }

    pub fn tell_client_alive(&self, handle: Handle, session_id: i32) -> Result<(), ServiceError> {
        self.health.tell_client_alive(handle, session_id)
    }

    pub fn register_monitor(&self, monitor: Arc<dyn WatchdogMonitor>) -> Result<(), ServiceError> {
        self.health.register_monitor(monitor)
    }

    pub fn unregister_monitor(&self, handle: Handle) -> Result<(), ServiceError> {
        self.health.unregister_monitor(handle)
    }

    pub fn tell_dump_finished(
        &self,
        monitor: Handle,
        process: ProcessIdentifier,
    ) -> Result<(), ServiceError> {
        self.health.tell_dump_finished(monitor, process)
    }

    pub fn register_framework_service(
        &self,
        service: Arc<dyn HealthCheckClient>,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        self.health.register_framework_service(service, caller)
    }

    pub fn unregister_framework_service(&self, handle: Handle) -> Result<(), ServiceError> {
        self.health.unregister_framework_service(handle)
    }

    pub fn tell_framework_service_alive(
        &self,
        handle: Handle,
        clients_not_responding: &[ProcessIdentifier],
        session_id: i32,
    ) -> Result<(), ServiceError> {
        self.health.tell_framework_service_alive(handle, clients_not_responding, session_id)
    }

    pub fn notify_user_state_change(&self, user_id: i32, started: bool) {
        self.health.notify_user_state_change(user_id, started)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.health.set_enabled(enabled)
    }

    pub fn on_boot_finished(&self) -> Result<(), ServiceError> {
        self.perf.on_boot_finished()
    }

    pub fn on_wake_up(&self) -> Result<(), ServiceError> {
        self.perf
            .on_wake_up_collection()
            .map_err(|e| ServiceError::transient(e.to_string()))
    }

    pub fn on_user_switch(&self, from_user: i32, to_user: i32) -> Result<(), ServiceError> {
        self.perf
            .on_user_switch_collection(from_user, to_user)
            .map_err(|e| ServiceError::transient(e.to_string()))
    }

    // The resource-overuse monitor lives in the framework service; the
    // daemon only carries the surface.

    pub fn add_resource_overuse_listener(&self, _handle: Handle) -> Result<(), ServiceError> {
        Err(ServiceError::unsupported("resource overuse monitoring is not hosted in the daemon"))
    }

    pub fn remove_resource_overuse_listener(&self, _handle: Handle) -> Result<(), ServiceError> {
        Err(ServiceError::unsupported("resource overuse monitoring is not hosted in the daemon"))
    }

    pub fn get_resource_overuse_stats(&self) -> Result<(), ServiceError> {
        Err(ServiceError::unsupported("resource overuse monitoring is not hosted in the daemon"))
    }

    // ---- dump surface ----

    /// Textual dump entry point. No arguments produces the full report;
    /// `--start_perf`/`--stop_perf` drive custom collections.
    pub fn dump(&self, args: &[String], report: &mut String) -> Result<(), ServiceError> {
        if args.is_empty() {
            report.push_str(&self.health.dump());
            self.perf.dump(report);
            return Ok(());
        }
        self.perf.on_custom_collection_command(args, report)
    }

    pub fn dump_structured(&self) -> serde_json::Value {
        self.perf.dump_structured()
    }

    pub fn terminate(&self) {
        self.perf.terminate();
        self.health.terminate();
        self.scheduler.lock().clear();
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
