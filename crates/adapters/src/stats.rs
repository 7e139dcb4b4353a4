// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delta-snapshot contracts for the performance stat sources.
//!
//! Each source exposes the change since the previous collection after a
//! `refresh()`. Refreshing happens on the dispatcher thread with no service
//! lock held; processors then read the delta borrow-only.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("stat source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("malformed stat data: {0}")]
    Parse(String),
}

/// Per-UID storage I/O usage split by foreground/background UID state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UidIoUsage {
    pub fg_read_bytes: i64,
    pub bg_read_bytes: i64,
    pub fg_write_bytes: i64,
    pub bg_write_bytes: i64,
    pub fg_fsync: i64,
    pub bg_fsync: i64,
}

impl UidIoUsage {
    pub fn total_read_bytes(&self) -> i64 {
        self.fg_read_bytes.saturating_add(self.bg_read_bytes)
    }

    pub fn total_write_bytes(&self) -> i64 {
        self.fg_write_bytes.saturating_add(self.bg_write_bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == UidIoUsage::default()
    }
}

/// Per-process stats within one UID's delta snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    pub pid: i32,
    pub comm: String,
    pub cpu_time_ms: u64,
    pub cpu_cycles: u64,
    pub major_faults: u64,
    pub io_blocked_tasks: u32,
    pub total_tasks: u32,
    pub rss_kb: u64,
    pub pss_kb: u64,
}

/// One UID's resource usage since the previous collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UidStats {
    pub uid: u32,
    pub cpu_time_ms: u64,
    pub cpu_cycles: u64,
    pub major_faults: u64,
    pub rss_kb: u64,
    pub pss_kb: u64,
    pub io: UidIoUsage,
    pub processes: Vec<ProcessStats>,
}

impl UidStats {
    pub fn io_blocked_tasks(&self) -> u32 {
        self.processes.iter().map(|p| p.io_blocked_tasks).sum()
    }

    pub fn total_tasks(&self) -> u32 {
        self.processes.iter().map(|p| p.total_tasks).sum()
    }
}

/// System-wide deltas from the kernel stat file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcStatDelta {
    pub cpu_io_wait_ms: u64,
    pub cpu_idle_ms: u64,
    pub total_cpu_ms: u64,
    pub total_cpu_cycles: u64,
    pub context_switches: u64,
    pub runnable_processes: u32,
    pub io_blocked_processes: u32,
}

/// Disk activity deltas for the periodic monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskStatsDelta {
    pub read_sectors: u64,
    pub write_sectors: u64,
    pub io_in_flight: u32,
}

pub trait UidStatsSource: Send {
    /// Whether the backing file was readable at init.
    fn enabled(&self) -> bool {
        true
    }

    fn refresh(&mut self) -> Result<(), StatsError>;

    fn delta(&self) -> &[UidStats];
}

pub trait ProcStatSource: Send {
    fn enabled(&self) -> bool {
        true
    }

    fn refresh(&mut self) -> Result<(), StatsError>;

    fn delta(&self) -> &ProcStatDelta;
}

pub trait DiskStatsSource: Send {
    fn enabled(&self) -> bool {
        true
    }

    fn refresh(&mut self) -> Result<(), StatsError>;

    fn delta(&self) -> &DiskStatsDelta;
}

/// Placeholder for hosts without the per-UID kernel interface. Always
/// disabled; callers skip disabled sources.
pub struct UnavailableUidStatsSource;

impl UidStatsSource for UnavailableUidStatsSource {
    fn enabled(&self) -> bool {
        false
    }

    fn refresh(&mut self) -> Result<(), StatsError> {
        Err(StatsError::Unavailable("per-UID stats interface is not present".to_string()))
    }

    fn delta(&self) -> &[UidStats] {
        &[]
    }
}

/// Placeholder for hosts without a disk stats interface.
#[derive(Default)]
pub struct UnavailableDiskStatsSource {
    empty: DiskStatsDelta,
}

impl DiskStatsSource for UnavailableDiskStatsSource {
    fn enabled(&self) -> bool {
        false
    }

    fn refresh(&mut self) -> Result<(), StatsError> {
        Err(StatsError::Unavailable("disk stats interface is not present".to_string()))
    }

    fn delta(&self) -> &DiskStatsDelta {
        &self.empty
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeDiskStatsSource, FakeProcStatSource, FakeUidStatsSource};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted UID stats source: snapshots queue up and `refresh` consumes
    /// one per call, keeping the last when the queue runs dry.
    #[derive(Default)]
    pub struct FakeUidStatsSource {
        queued: VecDeque<Vec<UidStats>>,
        current: Vec<UidStats>,
        fail_next: Option<StatsError>,
        enabled: bool,
    }

    impl FakeUidStatsSource {
        pub fn new() -> Self {
            Self { enabled: true, ..Default::default() }
        }

        pub fn push_snapshot(&mut self, stats: Vec<UidStats>) {
            self.queued.push_back(stats);
        }

        pub fn fail_next(&mut self, error: StatsError) {
            self.fail_next = Some(error);
        }

        pub fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
    }

    impl UidStatsSource for FakeUidStatsSource {
        fn enabled(&self) -> bool {
            self.enabled
        }

        fn refresh(&mut self) -> Result<(), StatsError> {
            if let Some(error) = self.fail_next.take() {
                return Err(error);
            }
            if let Some(next) = self.queued.pop_front() {
                self.current = next;
            }
            Ok(())
        }

        fn delta(&self) -> &[UidStats] {
            &self.current
        }
    }

    #[derive(Default)]
    pub struct FakeProcStatSource {
        queued: VecDeque<ProcStatDelta>,
        current: ProcStatDelta,
        fail_next: Option<StatsError>,
        enabled: bool,
    }

    impl FakeProcStatSource {
        pub fn new() -> Self {
            Self { enabled: true, ..Default::default() }
        }

        pub fn push_snapshot(&mut self, delta: ProcStatDelta) {
            self.queued.push_back(delta);
        }

        pub fn fail_next(&mut self, error: StatsError) {
            self.fail_next = Some(error);
        }
    }

    impl ProcStatSource for FakeProcStatSource {
        fn enabled(&self) -> bool {
            self.enabled
        }

        fn refresh(&mut self) -> Result<(), StatsError> {
            if let Some(error) = self.fail_next.take() {
                return Err(error);
            }
            if let Some(next) = self.queued.pop_front() {
                self.current = next;
            }
            Ok(())
        }

        fn delta(&self) -> &ProcStatDelta {
            &self.current
        }
    }

    #[derive(Default)]
    pub struct FakeDiskStatsSource {
        current: DiskStatsDelta,
        refreshes: u32,
    }

    impl FakeDiskStatsSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_delta(&mut self, delta: DiskStatsDelta) {
            self.current = delta;
        }

        pub fn refreshes(&self) -> u32 {
            self.refreshes
        }
    }

    impl DiskStatsSource for FakeDiskStatsSource {
        fn refresh(&mut self) -> Result<(), StatsError> {
            self.refreshes += 1;
            Ok(())
        }

        fn delta(&self) -> &DiskStatsDelta {
            &self.current
        }
    }
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
