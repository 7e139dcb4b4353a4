// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed performance records and collection buffers.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

pub const FOREGROUND: usize = 0;
pub const BACKGROUND: usize = 1;

/// System-wide stats from one collection delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemSummary {
    pub cpu_io_wait_ms: u64,
    pub cpu_idle_ms: u64,
    pub total_cpu_ms: u64,
    pub total_cpu_cycles: u64,
    pub context_switches: u64,
    pub io_blocked_processes: u32,
    pub total_processes: u32,
}

/// Total storage I/O split `[foreground, background]`, saturating on
/// accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalIoStats {
    pub read_bytes: [i64; 2],
    pub write_bytes: [i64; 2],
    pub fsync: [i64; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessCpuValue {
    pub pid: i32,
    pub comm: String,
    pub cpu_time_ms: u64,
    pub cpu_cycles: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessValue {
    pub comm: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessMemValue {
    pub comm: String,
    pub rss_kb: u64,
    pub pss_kb: u64,
}

/// Category-specific view of one package's stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PackageStatsView {
    Cpu { cpu_time_ms: u64, cpu_cycles: u64, top_processes: Vec<ProcessCpuValue> },
    Io { bytes: [i64; 2], fsync: [i64; 2] },
    Single { value: u64, top_processes: Vec<ProcessValue> },
    Memory { rss_kb: u64, pss_kb: u64, top_processes: Vec<ProcessMemValue> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageStats {
    pub uid: u32,
    pub package_name: String,
    pub view: PackageStatsView,
}

impl PackageStats {
    /// Primary ranking key for the view's category.
    pub fn key_value(&self, rank_by_pss: bool) -> u64 {
        match &self.view {
            PackageStatsView::Cpu { cpu_time_ms, .. } => *cpu_time_ms,
            PackageStatsView::Io { bytes, .. } => {
                bytes[FOREGROUND].saturating_add(bytes[BACKGROUND]).max(0) as u64
            }
            PackageStatsView::Single { value, .. } => *value,
            PackageStatsView::Memory { rss_kb, pss_kb, .. } => {
                if rank_by_pss {
                    *pss_kb
                } else {
                    *rss_kb
                }
            }
        }
    }
}

/// Per-package summary for one collection delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageSummary {
    pub top_cpu: Vec<PackageStats>,
    pub top_io_reads: Vec<PackageStats>,
    pub top_io_writes: Vec<PackageStats>,
    pub top_io_blocked: Vec<PackageStats>,
    pub top_major_faults: Vec<PackageStats>,
    pub top_memory: Vec<PackageStats>,
    pub total_io: TotalIoStats,
    pub task_count_by_uid: BTreeMap<u32, u64>,
    pub total_cpu_time_ms: u64,
    pub total_cpu_cycles: u64,
    pub total_major_faults: u64,
    pub total_rss_kb: u64,
    pub total_pss_kb: u64,
    /// Percent change in major faults vs the previous record; 0 when the
    /// previous total was 0.
    pub major_faults_percent_change: f64,
}

/// One sample in a collection buffer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub collected_at_ms: u64,
    pub system: SystemSummary,
    pub packages: PackageSummary,
}

/// Bounded or unbounded ring of records. A bounded buffer keeps the most
/// recent `max_size` records in append order.
#[derive(Debug, Clone, Default)]
pub struct CollectionBuffer {
    max_size: Option<usize>,
    records: VecDeque<ResourceRecord>,
}

impl CollectionBuffer {
    pub fn unbounded() -> Self {
        Self { max_size: None, records: VecDeque::new() }
    }

    pub fn bounded(max_size: usize) -> Self {
        Self { max_size: Some(max_size), records: VecDeque::new() }
    }

    pub fn append(&mut self, record: ResourceRecord) {
        if let Some(max) = self.max_size {
            while self.records.len() >= max.max(1) {
                self.records.pop_front();
            }
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&ResourceRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Records collected across one user switch.
#[derive(Debug, Clone)]
pub struct UserSwitchBuffer {
    pub from: i32,
    pub to: i32,
    pub buffer: CollectionBuffer,
}

impl UserSwitchBuffer {
    pub fn new(from: i32, to: i32) -> Self {
        Self { from, to, buffer: CollectionBuffer::unbounded() }
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
