// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VHAL supervision and reporting.
//!
//! On connect the service probes which watchdog properties the VHAL exports,
//! subscribes to the heartbeat, and starts the alive-report cadence. The
//! heartbeat must strictly increase and arrive within the check window plus a
//! one-second margin; a violation locates the VHAL process through the HAL
//! registry and escalates it to the monitor without reporting back to the
//! VHAL.

use super::{Heartbeat, ProcessHealthService};
use crate::message::{
    WatchdogMessage, TIMER_CONNECT_VHAL, TIMER_VHAL_ALIVE, TIMER_VHAL_HEALTH,
};
use axle_core::{Clock, ProcessIdentifier, TimeoutTrack};
use axle_adapters::vhal::{PropValue, VhalListener, VhalProperty};
use std::sync::{Arc, Weak};
use std::time::Duration;

pub(crate) const MAX_CONNECT_ATTEMPTS: u32 = 25;
pub(crate) const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Extra margin on top of the heartbeat window before declaring it missed.
const HEALTH_CHECK_MARGIN: Duration = Duration::from_secs(1);

/// Interface name the VHAL exports in the HAL registry.
pub const VHAL_INTERFACE_NAME: &str = "android.hardware.automotive.vehicle@2.0::IVehicle";

/// Reason code for the terminated-process VHAL report.
pub const TERMINATION_REASON_NOT_RESPONDING: i32 = 1;

impl<C: Clock + 'static> ProcessHealthService<C> {
    /// One VHAL connection attempt; runs on the dispatcher.
    pub fn connect_vhal_once(self: &Arc<Self>) {
        if self.inner.lock().vhal.is_some() {
            return;
        }
        let client = match self.connector.connect() {
            Ok(client) => client,
            Err(e) => {
                let remaining = {
                    let mut inner = self.inner.lock();
                    inner.vhal_connect_attempts_remaining =
                        inner.vhal_connect_attempts_remaining.saturating_sub(1);
                    inner.vhal_connect_attempts_remaining
                };
                if remaining == 0 {
                    tracing::error!(
                        attempts = MAX_CONNECT_ATTEMPTS,
                        error = %e,
                        "failed to connect to VHAL; gave up"
                    );
                    return;
                }
                tracing::warn!(error = %e, "failed to connect to VHAL; retrying");
                self.scheduler.lock().set_timer(
                    TIMER_CONNECT_VHAL,
                    WatchdogMessage::ConnectVhal,
                    CONNECT_RETRY_INTERVAL,
                    self.clock.now(),
                );
                return;
            }
        };

        let service = Arc::downgrade(self);
        client.add_death_callback(Arc::new(move || {
            if let Some(service) = service.upgrade() {
                service.handle_vhal_death();
            }
        }));

        // Cache the support bits before anything subscribes or writes.
        let probe: Vec<VhalProperty> = [
            VhalProperty::WatchdogAlive,
            VhalProperty::WatchdogTerminatedProcess,
            VhalProperty::VhalHeartbeat,
        ]
        .into_iter()
        .filter(|prop| !client.supports(*prop))
        .collect();
        for prop in &probe {
            tracing::warn!(property = %prop, "VHAL does not support watchdog property");
        }

        let heartbeat_supported = !probe.contains(&VhalProperty::VhalHeartbeat);
        {
            let mut inner = self.inner.lock();
            inner.unsupported_props = probe.into_iter().collect();
            inner.vhal = Some(Arc::clone(&client));
            inner.heartbeat = Heartbeat { value: 0, event_time_ms: self.clock.uptime_ms() };
        }

        if heartbeat_supported {
            let listener: Arc<dyn VhalListener> =
                Arc::new(HeartbeatListener(Arc::downgrade(self)));
            if let Err(e) = client.subscribe(&[VhalProperty::VhalHeartbeat], listener) {
                tracing::warn!(error = %e, "failed to subscribe to VHAL heartbeat; health checking disabled");
            } else {
                self.arm_vhal_health_check_locked();
            }
        }
        tracing::info!("successfully connected to VHAL");
    }

    fn handle_vhal_death(self: &Arc<Self>) {
        tracing::warn!("VHAL has died");
        {
            let mut inner = self.inner.lock();
            inner.vhal = None;
            inner.vhal_connect_attempts_remaining = MAX_CONNECT_ATTEMPTS;
        }
        self.scheduler.lock().cancel_timer(TIMER_VHAL_HEALTH);
        if self.tx.send(WatchdogMessage::ConnectVhal).is_err() {
            tracing::error!("dispatcher is not running; cannot reconnect to VHAL");
        }
    }

    pub(crate) fn arm_vhal_health_check_locked(&self) {
        self.scheduler.lock().set_timer(
            TIMER_VHAL_HEALTH,
            WatchdogMessage::CheckVhalHealth,
            self.config.vhal_check_interval + HEALTH_CHECK_MARGIN,
            self.clock.now(),
        );
    }

    /// Report system uptime to the VHAL and re-arm the 3 s cadence.
    pub fn report_watchdog_alive(&self) {
        let vhal = {
            let inner = self.inner.lock();
            if inner.unsupported_props.contains(&VhalProperty::WatchdogAlive) {
                tracing::warn!("VHAL doesn't support WATCHDOG_ALIVE; alive reports disabled");
                return;
            }
            inner.vhal.clone()
        };
        if let Some(vhal) = vhal {
            let uptime = self.clock.uptime_ms() as i64;
            let value = PropValue::int64_value(VhalProperty::WatchdogAlive, uptime);
            if let Err(e) = vhal.set_value(value) {
                tracing::warn!(error = %e, "failed to update WATCHDOG_ALIVE; will try again in 3s");
            }
        }
        self.scheduler.lock().set_timer(
            TIMER_VHAL_ALIVE,
            WatchdogMessage::ReportWatchdogAlive,
            TimeoutTrack::Critical.timeout(),
            self.clock.now(),
        );
    }

    /// Heartbeat property event. A non-increasing value is a monotonicity
    /// violation and terminates the VHAL.
    pub fn update_vhal_heartbeat(&self, value: i64) {
        let wrong_heartbeat = {
            let mut inner = self.inner.lock();
            if !inner.enabled {
                return;
            }
            let wrong = value <= inner.heartbeat.value;
            inner.heartbeat = Heartbeat { value, event_time_ms: self.clock.uptime_ms() };
            wrong
        };
        if wrong_heartbeat {
            tracing::warn!(value, "VHAL updated heartbeat with a wrong value; terminating VHAL");
            self.terminate_vhal();
            return;
        }
        self.arm_vhal_health_check_locked();
    }

    /// Window check; runs on the dispatcher.
    pub fn check_vhal_health(&self) {
        let last_event_ms = {
            let inner = self.inner.lock();
            if inner.vhal.is_none() || !inner.enabled {
                return;
            }
            inner.heartbeat.event_time_ms
        };
        let now = self.clock.uptime_ms();
        if now > last_event_ms + self.config.vhal_check_interval.as_millis() as u64 {
            tracing::warn!("VHAL failed to update heartbeat within timeout; terminating VHAL");
            self.terminate_vhal();
        }
    }

    /// Locate the VHAL process and escalate it to the monitor. No VHAL
    /// report: the VHAL itself is the subject.
    fn terminate_vhal(&self) {
        let hals = match self.hal_registry.running_hals() {
            Ok(hals) => hals,
            Err(e) => {
                tracing::error!(error = %e, "failed to terminate VHAL: could not list running HALs");
                return;
            }
        };
        let Some(info) = hals.iter().find(|h| h.interface_name == VHAL_INTERFACE_NAME) else {
            tracing::error!("failed to terminate VHAL: VHAL is not running");
            return;
        };
        let start_time_ms = self
            .process_info
            .start_time_ms(info.pid)
            .unwrap_or_else(|_| self.clock.uptime_ms());
        let process = ProcessIdentifier { pid: info.pid, start_time_ms };
        if let Err(e) = self.dump_and_kill_all(&[process], false) {
            tracing::warn!(error = %e, "failed to escalate VHAL termination");
        }
    }

    /// Report each terminated process's command line to the VHAL, when the
    /// property is supported.
    pub(crate) fn report_terminated_processes(&self, processes: &[ProcessIdentifier]) {
        let vhal = {
            let inner = self.inner.lock();
            if inner.unsupported_props.contains(&VhalProperty::WatchdogTerminatedProcess) {
                tracing::warn!(
                    "VHAL doesn't support WATCHDOG_TERMINATED_PROCESS; terminated processes not reported"
                );
                return;
            }
            inner.vhal.clone()
        };
        let Some(vhal) = vhal else { return };
        for process in processes {
            let cmdline = match self.process_info.cmdline(process.pid) {
                Ok(cmdline) => cmdline,
                Err(e) => {
                    tracing::warn!(pid = process.pid, error = %e, "failed to get process command line");
                    continue;
                }
            };
            let value = PropValue {
                prop: VhalProperty::WatchdogTerminatedProcess,
                int32s: vec![TERMINATION_REASON_NOT_RESPONDING],
                int64s: Vec::new(),
                string: cmdline.clone(),
            };
            if let Err(e) = vhal.set_value(value) {
                tracing::warn!(cmdline = %cmdline, error = %e, "failed to update WATCHDOG_TERMINATED_PROCESS");
            }
        }
    }
}

struct HeartbeatListener<C: Clock>(Weak<ProcessHealthService<C>>);

impl<C: Clock + 'static> VhalListener for HeartbeatListener<C> {
    fn on_property_event(&self, values: &[PropValue]) {
        let Some(service) = self.0.upgrade() else { return };
        for value in values {
            if value.prop == VhalProperty::VhalHeartbeat {
                match value.first_int64() {
                    Some(heartbeat) => service.update_vhal_heartbeat(heartbeat),
                    None => tracing::error!("invalid VHAL_HEARTBEAT value, empty value"),
                }
                break;
            }
        }
    }
}
