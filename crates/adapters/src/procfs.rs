// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Procfs-backed stat readers.
//!
//! The only collaborators cheap enough to carry in-tree: the kernel stat file
//! parser behind [`ProcStatSource`], and the per-pid start-time / command-line
//! readers the health service needs. Paths are injectable so tests run
//! against fixture files.

use crate::stats::{ProcStatDelta, ProcStatSource, StatsError};
use crate::system::ProcessInfoSource;
use std::path::{Path, PathBuf};

// Kernel clock tick rate assumed by the jiffies-to-ms conversion.
const TICKS_PER_SEC: u64 = 100;
const MS_PER_TICK: u64 = 1000 / TICKS_PER_SEC;

fn read_to_string(path: &Path) -> Result<String, StatsError> {
    std::fs::read_to_string(path).map_err(|e| StatsError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ProcStatSnapshot {
    io_wait_ticks: u64,
    idle_ticks: u64,
    total_ticks: u64,
    context_switches: u64,
    runnable_processes: u32,
    io_blocked_processes: u32,
}

fn parse_proc_stat(content: &str) -> Result<ProcStatSnapshot, StatsError> {
    let mut snapshot = ProcStatSnapshot::default();
    let mut saw_cpu = false;
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("cpu") => {
                let values: Vec<u64> =
                    fields.map(|f| f.parse::<u64>().unwrap_or(0)).collect();
                if values.len() < 7 {
                    return Err(StatsError::Parse(format!(
                        "cpu line has {} fields, expected at least 7",
                        values.len()
                    )));
                }
                snapshot.idle_ticks = values[3];
                snapshot.io_wait_ticks = values[4];
                snapshot.total_ticks = values.iter().sum();
                saw_cpu = true;
            }
            Some("ctxt") => {
                snapshot.context_switches =
                    fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
            }
            Some("procs_running") => {
                snapshot.runnable_processes =
                    fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
            }
            Some("procs_blocked") => {
                snapshot.io_blocked_processes =
                    fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
            }
            _ => {}
        }
    }
    if !saw_cpu {
        return Err(StatsError::Parse("missing aggregate cpu line".to_string()));
    }
    Ok(snapshot)
}

/// [`ProcStatSource`] reading the kernel stat file and producing deltas
/// against the previous refresh.
pub struct ProcfsStatSource {
    path: PathBuf,
    enabled: bool,
    previous: Option<ProcStatSnapshot>,
    delta: ProcStatDelta,
}

impl ProcfsStatSource {
    pub fn new() -> Self {
        Self::with_path("/proc/stat")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let enabled = path.exists();
        Self { path, enabled, previous: None, delta: ProcStatDelta::default() }
    }
}

impl Default for ProcfsStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcStatSource for ProcfsStatSource {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn refresh(&mut self) -> Result<(), StatsError> {
        let content = read_to_string(&self.path)?;
        let current = parse_proc_stat(&content)?;
        let base = self.previous.unwrap_or_default();
        self.delta = ProcStatDelta {
            cpu_io_wait_ms: current.io_wait_ticks.saturating_sub(base.io_wait_ticks)
                * MS_PER_TICK,
            cpu_idle_ms: current.idle_ticks.saturating_sub(base.idle_ticks) * MS_PER_TICK,
            total_cpu_ms: current.total_ticks.saturating_sub(base.total_ticks) * MS_PER_TICK,
            // Cycle counts need the per-UID BPF counters; not exposed here.
            total_cpu_cycles: 0,
            context_switches: current
                .context_switches
                .saturating_sub(base.context_switches),
            runnable_processes: current.runnable_processes,
            io_blocked_processes: current.io_blocked_processes,
        };
        self.previous = Some(current);
        Ok(())
    }

    fn delta(&self) -> &ProcStatDelta {
        &self.delta
    }
}

/// Per-pid readers over the proc filesystem.
pub struct ProcfsProcessInfo {
    proc_root: PathBuf,
    boot_time_ms: u64,
}

impl ProcfsProcessInfo {
    /// `boot_time_ms` anchors per-pid start times (ticks since boot) onto the
    /// caller's uptime base.
    pub fn new(boot_time_ms: u64) -> Self {
        Self::with_root("/proc", boot_time_ms)
    }

    pub fn with_root(proc_root: impl Into<PathBuf>, boot_time_ms: u64) -> Self {
        Self { proc_root: proc_root.into(), boot_time_ms }
    }

    fn stat_path(&self, pid: i32) -> PathBuf {
        self.proc_root.join(pid.to_string()).join("stat")
    }
}

impl ProcessInfoSource for ProcfsProcessInfo {
    fn start_time_ms(&self, pid: i32) -> Result<u64, StatsError> {
        let content = read_to_string(&self.stat_path(pid))?;
        // Field 22 (starttime) counts from after the comm field, which may
        // itself contain spaces and is parenthesized.
        let after_comm = content
            .rsplit_once(')')
            .map(|(_, rest)| rest)
            .ok_or_else(|| StatsError::Parse(format!("pid {pid}: no comm field")))?;
        let start_ticks: u64 = after_comm
            .split_whitespace()
            .nth(19)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| StatsError::Parse(format!("pid {pid}: missing starttime")))?;
        Ok(self.boot_time_ms + start_ticks * MS_PER_TICK)
    }

    fn cmdline(&self, pid: i32) -> Result<String, StatsError> {
        let path = self.proc_root.join(pid.to_string()).join("cmdline");
        let content = read_to_string(&path)?;
        Ok(content.replace('\0', " ").trim().to_string())
    }
}

#[cfg(test)]
#[path = "procfs_tests.rs"]
mod tests;
