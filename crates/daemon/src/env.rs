// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon binaries.
//!
//! These mirror the platform's read-only system properties; none of the
//! variable names are part of a public contract.

use axle_power::PowerConfig;
use axle_watchdog::{HealthConfig, PerfConfig, ProfilerConfig, WatchdogConfig};
use std::time::Duration;

fn duration_secs(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_secs)
}

fn usize_var(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.parse::<usize>().ok())
}

fn bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|s| s.parse::<bool>().ok())
}

/// Timer poll cadence for the run loops (default: 1s).
pub fn timer_check_interval() -> Duration {
    std::env::var("AXLE_TIMER_CHECK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Boot reason reported by the bootloader.
pub fn boot_reason() -> String {
    std::env::var("AXLE_BOOT_REASON").unwrap_or_default()
}

/// Power policy configuration from the environment.
pub fn power_config() -> PowerConfig {
    PowerConfig {
        policy_refactoring: bool_var("AXLE_POWER_POLICY_REFACTORING").unwrap_or(false),
        boot_reason: boot_reason(),
        vendor_catalog: None,
    }
}

/// Watchdog configuration from the environment.
pub fn watchdog_config() -> WatchdogConfig {
    let mut health = HealthConfig::default();
    if let Some(interval) = duration_secs("AXLE_VHAL_HEALTHCHECK_INTERVAL_SEC") {
        health.vhal_check_interval = interval;
    }
    health.client_check_window = duration_secs("AXLE_CLIENT_HEALTHCHECK_INTERVAL_SEC");

    let mut perf = PerfConfig::default();
    if let Some(interval) = duration_secs("AXLE_BOOTTIME_COLLECTION_INTERVAL_SEC") {
        perf.boottime_interval = interval;
    }
    if let Some(interval) = duration_secs("AXLE_PERIODIC_COLLECTION_INTERVAL_SEC") {
        perf.periodic_interval = interval;
    }
    if let Some(interval) = duration_secs("AXLE_PERIODIC_MONITOR_INTERVAL_SEC") {
        perf.periodic_monitor_interval = interval;
    }

    WatchdogConfig { health, perf }
}

/// Profiler configuration from the environment.
pub fn profiler_config() -> ProfilerConfig {
    let mut config = ProfilerConfig::default();
    if let Some(top_n) = usize_var("AXLE_TOP_N_STATS_PER_CATEGORY") {
        config.top_n_per_category = top_n;
    }
    if let Some(top_n) = usize_var("AXLE_TOP_N_STATS_PER_SUBCATEGORY") {
        config.top_n_per_subcategory = top_n;
    }
    if let Some(max) = usize_var("AXLE_MAX_USER_SWITCH_EVENTS") {
        config.max_user_switch_events = max;
    }
    if let Some(duration) = duration_secs("AXLE_SYSTEM_EVENT_DATA_CACHE_DURATION_SEC") {
        config.cache_duration = duration;
    }
    if let Some(size) = usize_var("AXLE_PERIODIC_COLLECTION_BUFFER_SIZE") {
        config.periodic_buffer_size = size;
    }
    config
}

/// Sysfs path of the silent-mode hardware state file.
pub fn silent_mode_hw_state_path() -> String {
    std::env::var("AXLE_SILENT_MODE_HW_STATE_PATH")
        .unwrap_or_else(|_| "/sys/power/pm_silentmode_hw_state".to_string())
}

/// Sysfs path of the kernel silent-mode mirror file.
pub fn silent_mode_kernel_path() -> String {
    std::env::var("AXLE_SILENT_MODE_KERNEL_PATH")
        .unwrap_or_else(|_| "/sys/power/pm_silentmode_kernel".to_string())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
