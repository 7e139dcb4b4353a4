// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Performance profiler: turns delta snapshots into typed summary records.
//!
//! Each collection builds a [`ResourceRecord`] with per-category top-N
//! package lists. Ranking keys are category-specific (memory ranks by PSS
//! when the kernel exposes smaps rollups, by RSS otherwise); selection is a
//! stable descending sort, so equal keys keep snapshot order. A custom
//! collection with a package filter bypasses top-N entirely.

use super::processor::{DataProcessor, PerfError};
use super::record::{
    CollectionBuffer, PackageStats, PackageStatsView, PackageSummary, ProcessCpuValue,
    ProcessMemValue, ProcessValue, ResourceRecord, SystemSummary, TotalIoStats, UserSwitchBuffer,
    BACKGROUND, FOREGROUND,
};
use axle_adapters::resolver::PackageNameResolver;
use axle_adapters::stats::{ProcStatDelta, UidStats};
use chrono::DateTime;
use std::collections::{HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

const EMPTY_COLLECTION_MESSAGE: &str = "No collection recorded\n";

#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    pub top_n_per_category: usize,
    pub top_n_per_subcategory: usize,
    pub max_user_switch_events: usize,
    /// Boot-time, wake-up, and stale user-switch caches older than this are
    /// evicted at the next periodic collection.
    pub cache_duration: Duration,
    pub periodic_buffer_size: usize,
    /// Rank memory by PSS when true, by RSS otherwise.
    pub smaps_rollup_supported: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            top_n_per_category: 10,
            top_n_per_subcategory: 5,
            max_user_switch_events: 3,
            cache_duration: Duration::from_secs(3600),
            periodic_buffer_size: 180,
            smaps_rollup_supported: false,
        }
    }
}

pub struct PerformanceProfiler {
    config: ProfilerConfig,
    resolver: Arc<dyn PackageNameResolver>,
    boottime: CollectionBuffer,
    wakeup: CollectionBuffer,
    periodic: CollectionBuffer,
    custom: CollectionBuffer,
    user_switch: VecDeque<UserSwitchBuffer>,
    last_major_faults: u64,
}

impl PerformanceProfiler {
    pub fn new(config: ProfilerConfig, resolver: Arc<dyn PackageNameResolver>) -> Self {
        let periodic_buffer_size = config.periodic_buffer_size;
        Self {
            config,
            resolver,
            boottime: CollectionBuffer::unbounded(),
            // Only the newest wake-up record is ever meaningful.
            wakeup: CollectionBuffer::bounded(1),
            periodic: CollectionBuffer::bounded(periodic_buffer_size),
            custom: CollectionBuffer::unbounded(),
            user_switch: VecDeque::new(),
            last_major_faults: 0,
        }
    }

    pub fn boottime_records(&self) -> Vec<ResourceRecord> {
        self.boottime.records().cloned().collect()
    }

    pub fn periodic_records(&self) -> Vec<ResourceRecord> {
        self.periodic.records().cloned().collect()
    }

    pub fn custom_records(&self) -> Vec<ResourceRecord> {
        self.custom.records().cloned().collect()
    }

    pub fn wakeup_record(&self) -> Option<ResourceRecord> {
        self.wakeup.latest().cloned()
    }

    pub fn user_switch_buffers(&self) -> Vec<(i32, i32, usize)> {
        self.user_switch.iter().map(|b| (b.from, b.to, b.buffer.len())).collect()
    }

    /// Build one summary record from a delta snapshot.
    fn build_record(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
        filter_packages: Option<&HashSet<String>>,
    ) -> ResourceRecord {
        let rank_by_pss = self.config.smaps_rollup_supported;
        let mut packages = PackageSummary::default();

        for stats in uid_stats {
            let package_name = self.resolver.resolve(stats.uid);
            if let Some(filter) = filter_packages {
                if !filter.contains(&package_name) {
                    continue;
                }
            }
            packages
                .task_count_by_uid
                .insert(stats.uid, u64::from(stats.total_tasks()));

            packages.total_cpu_cycles = packages.total_cpu_cycles.saturating_add(stats.cpu_cycles);
            packages.total_major_faults =
                packages.total_major_faults.saturating_add(stats.major_faults);
            packages.total_rss_kb = packages.total_rss_kb.saturating_add(stats.rss_kb);
            packages.total_pss_kb = packages.total_pss_kb.saturating_add(stats.pss_kb);
            accumulate_io(&mut packages.total_io, stats);

            let filtered = filter_packages.is_some();
            if let Some(view) = self.cpu_view(stats, filtered) {
                packages.top_cpu.push(entry(stats.uid, &package_name, view));
            }
            if let Some(view) = io_view(stats, true, filtered) {
                packages.top_io_reads.push(entry(stats.uid, &package_name, view));
            }
            if let Some(view) = io_view(stats, false, filtered) {
                packages.top_io_writes.push(entry(stats.uid, &package_name, view));
            }
            if let Some(view) = self.single_view(stats, StatKind::IoBlocked, filtered) {
                packages.top_io_blocked.push(entry(stats.uid, &package_name, view));
            }
            if let Some(view) = self.single_view(stats, StatKind::MajorFaults, filtered) {
                packages.top_major_faults.push(entry(stats.uid, &package_name, view));
            }
            if let Some(view) = self.memory_view(stats, rank_by_pss, filtered) {
                packages.top_memory.push(entry(stats.uid, &package_name, view));
            }
        }

        if filter_packages.is_none() {
            let top_n = self.config.top_n_per_category;
            for list in [
                &mut packages.top_cpu,
                &mut packages.top_io_reads,
                &mut packages.top_io_writes,
                &mut packages.top_io_blocked,
                &mut packages.top_major_faults,
                &mut packages.top_memory,
            ] {
                // sort_by is stable: equal keys preserve snapshot order.
                list.sort_by(|a, b| b.key_value(rank_by_pss).cmp(&a.key_value(rank_by_pss)));
                list.truncate(top_n);
            }
        }

        packages.total_cpu_time_ms = proc_stat.total_cpu_ms;
        packages.major_faults_percent_change =
            percent_change(self.last_major_faults, packages.total_major_faults);
        self.last_major_faults = packages.total_major_faults;

        ResourceRecord {
            collected_at_ms: now_ms,
            system: SystemSummary {
                cpu_io_wait_ms: proc_stat.cpu_io_wait_ms,
                cpu_idle_ms: proc_stat.cpu_idle_ms,
                total_cpu_ms: proc_stat.total_cpu_ms,
                total_cpu_cycles: proc_stat.total_cpu_cycles,
                context_switches: proc_stat.context_switches,
                io_blocked_processes: proc_stat.io_blocked_processes,
                total_processes: proc_stat.runnable_processes + proc_stat.io_blocked_processes,
            },
            packages,
        }
    }

    fn cpu_view(&self, stats: &UidStats, include_zero: bool) -> Option<PackageStatsView> {
        if stats.cpu_time_ms == 0 && !include_zero {
            return None;
        }
        let mut top: Vec<ProcessCpuValue> = stats
            .processes
            .iter()
            .filter(|p| p.cpu_time_ms > 0 || include_zero)
            .map(|p| ProcessCpuValue {
                pid: p.pid,
                comm: p.comm.clone(),
                cpu_time_ms: p.cpu_time_ms,
                cpu_cycles: p.cpu_cycles,
            })
            .collect();
        top.sort_by(|a, b| b.cpu_time_ms.cmp(&a.cpu_time_ms));
        top.truncate(self.config.top_n_per_subcategory);
        Some(PackageStatsView::Cpu {
            cpu_time_ms: stats.cpu_time_ms,
            cpu_cycles: stats.cpu_cycles,
            top_processes: top,
        })
    }

    fn single_view(
        &self,
        stats: &UidStats,
        kind: StatKind,
        include_zero: bool,
    ) -> Option<PackageStatsView> {
        let (total, per_process): (u64, Vec<(String, u64)>) = match kind {
            StatKind::IoBlocked => (
                u64::from(stats.io_blocked_tasks()),
                stats
                    .processes
                    .iter()
                    .map(|p| (p.comm.clone(), u64::from(p.io_blocked_tasks)))
                    .collect(),
            ),
            StatKind::MajorFaults => (
                stats.major_faults,
                stats.processes.iter().map(|p| (p.comm.clone(), p.major_faults)).collect(),
            ),
        };
        if total == 0 && !include_zero {
            return None;
        }
        let mut top: Vec<ProcessValue> = per_process
            .into_iter()
            .filter(|(_, value)| *value > 0 || include_zero)
            .map(|(comm, value)| ProcessValue { comm, value })
            .collect();
        top.sort_by(|a, b| b.value.cmp(&a.value));
        top.truncate(self.config.top_n_per_subcategory);
        Some(PackageStatsView::Single { value: total, top_processes: top })
    }

    fn memory_view(
        &self,
        stats: &UidStats,
        rank_by_pss: bool,
        include_zero: bool,
    ) -> Option<PackageStatsView> {
        let key = if rank_by_pss { stats.pss_kb } else { stats.rss_kb };
        if key == 0 && !include_zero {
            return None;
        }
        let mut top: Vec<ProcessMemValue> = stats
            .processes
            .iter()
            .filter(|p| (if rank_by_pss { p.pss_kb } else { p.rss_kb }) > 0 || include_zero)
            .map(|p| ProcessMemValue { comm: p.comm.clone(), rss_kb: p.rss_kb, pss_kb: p.pss_kb })
            .collect();
        top.sort_by(|a, b| {
            let (ka, kb) = if rank_by_pss { (a.pss_kb, b.pss_kb) } else { (a.rss_kb, b.rss_kb) };
            kb.cmp(&ka)
        });
        top.truncate(self.config.top_n_per_subcategory);
        Some(PackageStatsView::Memory {
            rss_kb: stats.rss_kb,
            pss_kb: stats.pss_kb,
            top_processes: top,
        })
    }

    /// Evict caches whose newest record has outlived the cache duration.
    fn evict_stale_caches(&mut self, now_ms: u64) {
        let cache_ms = self.config.cache_duration.as_millis() as u64;
        let stale = |buffer: &CollectionBuffer| {
            buffer.latest().is_some_and(|r| r.collected_at_ms + cache_ms < now_ms)
        };
        if stale(&self.boottime) {
            tracing::info!("evicting stale boot-time collection cache");
            self.boottime.clear();
        }
        if stale(&self.wakeup) {
            tracing::info!("evicting stale wake-up collection cache");
            self.wakeup.clear();
        }
        if self.user_switch.front().is_some_and(|b| stale(&b.buffer)) {
            tracing::info!("evicting stale user-switch collection cache");
            self.user_switch.pop_front();
        }
    }

    fn format_buffer(out: &mut String, title: &str, buffer: &CollectionBuffer) {
        let _ = writeln!(out, "{title}:");
        let _ = writeln!(out, "{}", "=".repeat(title.len() + 1));
        if buffer.is_empty() {
            out.push_str(EMPTY_COLLECTION_MESSAGE);
            return;
        }
        for record in buffer.records() {
            format_record(out, record);
        }
    }
}

enum StatKind {
    IoBlocked,
    MajorFaults,
}

impl DataProcessor for PerformanceProfiler {
    fn name(&self) -> &'static str {
        "PerformanceProfiler"
    }

    fn start(&mut self) -> Result<(), PerfError> {
        self.boottime.clear();
        self.wakeup.clear();
        self.last_major_faults = 0;
        Ok(())
    }

    fn on_boottime_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        let record = self.build_record(now_ms, uid_stats, proc_stat, None);
        self.boottime.append(record);
        Ok(())
    }

    fn on_periodic_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        self.evict_stale_caches(now_ms);
        let record = self.build_record(now_ms, uid_stats, proc_stat, None);
        self.periodic.append(record);
        Ok(())
    }

    fn on_custom_collection(
        &mut self,
        now_ms: u64,
        filter_packages: &HashSet<String>,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        let filter = (!filter_packages.is_empty()).then_some(filter_packages);
        let record = self.build_record(now_ms, uid_stats, proc_stat, filter);
        self.custom.append(record);
        Ok(())
    }

    fn on_wake_up_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        let record = self.build_record(now_ms, uid_stats, proc_stat, None);
        self.wakeup.append(record);
        Ok(())
    }

    fn on_user_switch_collection(
        &mut self,
        now_ms: u64,
        from_user: i32,
        to_user: i32,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        let record = self.build_record(now_ms, uid_stats, proc_stat, None);
        let continues_last = self
            .user_switch
            .back()
            .is_some_and(|b| b.from == from_user && b.to == to_user);
        if !continues_last {
            while self.user_switch.len() >= self.config.max_user_switch_events.max(1) {
                self.user_switch.pop_front();
            }
            self.user_switch.push_back(UserSwitchBuffer::new(from_user, to_user));
        }
        if let Some(buffer) = self.user_switch.back_mut() {
            buffer.buffer.append(record);
        }
        Ok(())
    }

    fn on_dump(&self) -> String {
        let mut out = String::new();
        Self::format_buffer(&mut out, "Boot-time performance report", &self.boottime);
        Self::format_buffer(&mut out, "Wake-up performance report", &self.wakeup);
        for buffer in &self.user_switch {
            Self::format_buffer(
                &mut out,
                &format!("User-switch performance report (from {} to {})", buffer.from, buffer.to),
                &buffer.buffer,
            );
        }
        Self::format_buffer(&mut out, "Last N minutes performance report", &self.periodic);
        out
    }

    fn on_dump_structured(&self) -> serde_json::Value {
        serde_json::json!({
            "boot_time": structured_records(&self.boottime),
            "wake_up": structured_records(&self.wakeup),
            "user_switch": self
                .user_switch
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "from_user": b.from,
                        "to_user": b.to,
                        "records": structured_records(&b.buffer),
                    })
                })
                .collect::<Vec<_>>(),
            "periodic": structured_records(&self.periodic),
            "custom": structured_records(&self.custom),
        })
    }

    fn on_custom_collection_dump(&mut self, report: Option<&mut String>) -> Result<(), PerfError> {
        if let Some(report) = report {
            Self::format_buffer(report, "Custom performance report", &self.custom);
        }
        self.custom.clear();
        Ok(())
    }

    fn terminate(&mut self) {
        self.boottime.clear();
        self.wakeup.clear();
        self.periodic.clear();
        self.custom.clear();
        self.user_switch.clear();
    }
}

fn entry(uid: u32, package_name: &str, view: PackageStatsView) -> PackageStats {
    PackageStats { uid, package_name: package_name.to_string(), view }
}

fn io_view(stats: &UidStats, reads: bool, include_zero: bool) -> Option<PackageStatsView> {
    let (bytes, fsync) = if reads {
        ([stats.io.fg_read_bytes, stats.io.bg_read_bytes], [stats.io.fg_fsync, stats.io.bg_fsync])
    } else {
        ([stats.io.fg_write_bytes, stats.io.bg_write_bytes], [stats.io.fg_fsync, stats.io.bg_fsync])
    };
    if bytes[FOREGROUND] == 0 && bytes[BACKGROUND] == 0 && !include_zero {
        return None;
    }
    Some(PackageStatsView::Io { bytes, fsync })
}

fn accumulate_io(total: &mut TotalIoStats, stats: &UidStats) {
    total.read_bytes[FOREGROUND] =
        total.read_bytes[FOREGROUND].saturating_add(stats.io.fg_read_bytes);
    total.read_bytes[BACKGROUND] =
        total.read_bytes[BACKGROUND].saturating_add(stats.io.bg_read_bytes);
    total.write_bytes[FOREGROUND] =
        total.write_bytes[FOREGROUND].saturating_add(stats.io.fg_write_bytes);
    total.write_bytes[BACKGROUND] =
        total.write_bytes[BACKGROUND].saturating_add(stats.io.bg_write_bytes);
    total.fsync[FOREGROUND] = total.fsync[FOREGROUND].saturating_add(stats.io.fg_fsync);
    total.fsync[BACKGROUND] = total.fsync[BACKGROUND].saturating_add(stats.io.bg_fsync);
}

fn percent_change(previous: u64, current: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    (current as f64 - previous as f64) / previous as f64 * 100.0
}

fn format_record(out: &mut String, record: &ResourceRecord) {
    let stamp = DateTime::from_timestamp_millis(record.collected_at_ms as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.collected_at_ms.to_string());
    let _ = writeln!(out, "Collection at {stamp}");
    let system = &record.system;
    let _ = writeln!(
        out,
        "  CPU: total {}ms, idle {}ms, iowait {}ms, cycles {}, ctx switches {}, \
         io-blocked procs {}, total procs {}",
        system.total_cpu_ms,
        system.cpu_idle_ms,
        system.cpu_io_wait_ms,
        system.total_cpu_cycles,
        system.context_switches,
        system.io_blocked_processes,
        system.total_processes,
    );
    let packages = &record.packages;
    let _ = writeln!(
        out,
        "  Totals: cpu {}ms, major faults {} ({:+.2}% change), rss {}kb, pss {}kb",
        packages.total_cpu_time_ms,
        packages.total_major_faults,
        packages.major_faults_percent_change,
        packages.total_rss_kb,
        packages.total_pss_kb,
    );
    format_category(out, "Top CPU", &packages.top_cpu);
    format_category(out, "Top storage I/O reads", &packages.top_io_reads);
    format_category(out, "Top storage I/O writes", &packages.top_io_writes);
    format_category(out, "Top I/O-blocked", &packages.top_io_blocked);
    format_category(out, "Top major page faults", &packages.top_major_faults);
    format_category(out, "Top memory", &packages.top_memory);
}

fn format_category(out: &mut String, title: &str, list: &[PackageStats]) {
    if list.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {title}:");
    for stats in list {
        let detail = match &stats.view {
            PackageStatsView::Cpu { cpu_time_ms, cpu_cycles, .. } => {
                format!("{cpu_time_ms}ms, {cpu_cycles} cycles")
            }
            PackageStatsView::Io { bytes, fsync } => format!(
                "fg {}B/bg {}B, fsync fg {}/bg {}",
                bytes[FOREGROUND], bytes[BACKGROUND], fsync[FOREGROUND], fsync[BACKGROUND]
            ),
            PackageStatsView::Single { value, .. } => value.to_string(),
            PackageStatsView::Memory { rss_kb, pss_kb, .. } => {
                format!("rss {rss_kb}kb, pss {pss_kb}kb")
            }
        };
        let _ = writeln!(out, "    {} ({}): {detail}", stats.package_name, stats.uid);
    }
}

fn structured_records(buffer: &CollectionBuffer) -> serde_json::Value {
    let records: Vec<serde_json::Value> = buffer
        .records()
        .map(|record| {
            let stamp = DateTime::from_timestamp_millis(record.collected_at_ms as i64);
            serde_json::json!({
                "date": stamp.map(|t| t.format("%Y-%m-%d").to_string()),
                "time_of_day": stamp.map(|t| t.format("%H:%M:%S").to_string()),
                "system_wide_stats": record.system,
                "package_cpu_stats": record.packages.top_cpu,
                "package_storage_io_read_stats": record.packages.top_io_reads,
                "package_storage_io_write_stats": record.packages.top_io_writes,
                "package_task_state_stats": record.packages.top_io_blocked,
                "package_major_page_faults": record.packages.top_major_faults,
            })
        })
        .collect();
    serde_json::json!({ "records": records })
}

#[cfg(test)]
#[path = "profiler_tests.rs"]
mod tests;
