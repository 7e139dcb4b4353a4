// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher messages and timer ids for the watchdog daemon.
//!
//! Timer identity is kept explicit: every delayed message has a stable id so
//! re-arming replaces the pending instance and state transitions can cancel
//! whole families by prefix.

use axle_core::TimeoutTrack;

pub const TIMER_PREFIX_HEALTH: &str = "health:";
pub const TIMER_PREFIX_PERF: &str = "perf:";
pub const TIMER_CONNECT_VHAL: &str = "vhal:connect";
pub const TIMER_VHAL_ALIVE: &str = "vhal:alive";
pub const TIMER_VHAL_HEALTH: &str = "vhal:health";
pub const TIMER_PERF_BOOTTIME: &str = "perf:boottime";
pub const TIMER_PERF_PERIODIC: &str = "perf:periodic";
pub const TIMER_PERF_MONITOR: &str = "perf:monitor";
pub const TIMER_PERF_CUSTOM: &str = "perf:custom";
pub const TIMER_PERF_CUSTOM_END: &str = "perf:custom-end";

pub fn health_timer_id(track: TimeoutTrack) -> String {
    format!("{TIMER_PREFIX_HEALTH}{track}")
}

/// Messages handled on the watchdog daemon's dispatcher task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogMessage {
    /// One ping round for a timeout track.
    HealthCheck(TimeoutTrack),
    /// Attempt one VHAL connection (initial or retry).
    ConnectVhal,
    /// Write system uptime to the VHAL's watchdog-alive property.
    ReportWatchdogAlive,
    /// Verify the VHAL heartbeat arrived within its window.
    CheckVhalHealth,
    /// Collection ticks.
    BootTimeCollection,
    EndBootTimeCollection,
    PeriodicCollection,
    PeriodicMonitor,
    CustomCollection,
    EndCustomCollection,
}
