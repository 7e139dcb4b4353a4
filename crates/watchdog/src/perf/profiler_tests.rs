// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::perf::record::PackageStatsView;
use axle_adapters::resolver::CachingNameResolver;
use axle_adapters::stats::{ProcStatDelta, ProcessStats, UidIoUsage, UidStats};

fn profiler_with(config: ProfilerConfig) -> PerformanceProfiler {
    let resolver = Arc::new(CachingNameResolver::new());
    resolver.insert(1001, "com.vendor.alpha");
    resolver.insert(1002, "com.vendor.beta");
    resolver.insert(1003, "com.vendor.gamma");
    PerformanceProfiler::new(config, resolver)
}

fn profiler() -> PerformanceProfiler {
    profiler_with(ProfilerConfig::default())
}

fn cpu_uid(uid: u32, cpu_time_ms: u64) -> UidStats {
    UidStats {
        uid,
        cpu_time_ms,
        cpu_cycles: cpu_time_ms * 10,
        processes: vec![
            ProcessStats {
                pid: uid as i32,
                comm: format!("proc{uid}"),
                cpu_time_ms,
                total_tasks: 2,
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

fn mem_uid(uid: u32, rss_kb: u64, pss_kb: u64) -> UidStats {
    UidStats { uid, rss_kb, pss_kb, ..Default::default() }
}

fn proc_delta() -> ProcStatDelta {
    ProcStatDelta {
        cpu_io_wait_ms: 100,
        cpu_idle_ms: 8_000,
        total_cpu_ms: 10_000,
        total_cpu_cycles: 50_000,
        context_switches: 1_000,
        runnable_processes: 5,
        io_blocked_processes: 2,
    }
}

#[test]
fn boottime_collection_builds_a_record_with_system_summary() {
    let mut profiler = profiler();
    profiler
        .on_boottime_collection(1_000, &[cpu_uid(1001, 120)], &proc_delta())
        .unwrap();

    let records = profiler.boottime_records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.collected_at_ms, 1_000);
    assert_eq!(record.system.total_cpu_ms, 10_000);
    assert_eq!(record.system.total_processes, 7);
    assert_eq!(record.packages.total_cpu_time_ms, 10_000);
    assert_eq!(record.packages.total_cpu_cycles, 1_200);
    assert_eq!(record.packages.task_count_by_uid.get(&1001), Some(&2));
}

#[test]
fn top_n_selection_ranks_by_cpu_time() {
    let mut profiler = profiler_with(ProfilerConfig {
        top_n_per_category: 2,
        ..ProfilerConfig::default()
    });
    let stats = vec![cpu_uid(1001, 50), cpu_uid(1002, 200), cpu_uid(1003, 100)];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let names: Vec<&str> =
        record.packages.top_cpu.iter().map(|p| p.package_name.as_str()).collect();
    assert_eq!(names, vec!["com.vendor.beta", "com.vendor.gamma"]);
}

#[test]
fn equal_keys_preserve_snapshot_order() {
    let mut profiler = profiler();
    let stats = vec![cpu_uid(1002, 100), cpu_uid(1001, 100), cpu_uid(1003, 100)];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let uids: Vec<u32> = record.packages.top_cpu.iter().map(|p| p.uid).collect();
    assert_eq!(uids, vec![1002, 1001, 1003]);
}

#[test]
fn zero_valued_packages_are_not_listed() {
    let mut profiler = profiler();
    let stats = vec![cpu_uid(1001, 0), cpu_uid(1002, 10)];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    assert_eq!(record.packages.top_cpu.len(), 1);
    assert_eq!(record.packages.top_cpu[0].uid, 1002);
    // but the zero package still contributes to task counts
    assert!(record.packages.task_count_by_uid.contains_key(&1001));
}

#[test]
fn memory_ranking_uses_pss_with_smaps_rollup() {
    // Three UIDs with PSS {1645, 1635, 865}: PSS ordering when supported.
    let mut profiler = profiler_with(ProfilerConfig {
        smaps_rollup_supported: true,
        ..ProfilerConfig::default()
    });
    let stats = vec![
        mem_uid(1001, 2000, 1635),
        mem_uid(1002, 1000, 1645),
        mem_uid(1003, 2010, 865),
    ];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let pss: Vec<u64> = record
        .packages
        .top_memory
        .iter()
        .map(|p| match &p.view {
            PackageStatsView::Memory { pss_kb, .. } => *pss_kb,
            _ => panic!("expected memory view"),
        })
        .collect();
    assert_eq!(pss, vec![1645, 1635, 865]);
}

#[test]
fn memory_ranking_falls_back_to_rss() {
    let mut profiler = profiler_with(ProfilerConfig {
        smaps_rollup_supported: false,
        ..ProfilerConfig::default()
    });
    let stats = vec![
        mem_uid(1001, 2000, 1635),
        mem_uid(1002, 1000, 1645),
        mem_uid(1003, 2010, 865),
    ];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let rss: Vec<u64> = record
        .packages
        .top_memory
        .iter()
        .map(|p| match &p.view {
            PackageStatsView::Memory { rss_kb, .. } => *rss_kb,
            _ => panic!("expected memory view"),
        })
        .collect();
    assert_eq!(rss, vec![2010, 2000, 1000]);
}

#[test]
fn subcategory_processes_are_ranked_and_truncated() {
    let mut profiler = profiler_with(ProfilerConfig {
        top_n_per_subcategory: 2,
        ..ProfilerConfig::default()
    });
    let stats = vec![UidStats {
        uid: 1001,
        cpu_time_ms: 60,
        processes: vec![
            ProcessStats { pid: 1, comm: "low".into(), cpu_time_ms: 10, ..Default::default() },
            ProcessStats { pid: 2, comm: "high".into(), cpu_time_ms: 40, ..Default::default() },
            ProcessStats { pid: 3, comm: "mid".into(), cpu_time_ms: 20, ..Default::default() },
        ],
        ..Default::default()
    }];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let PackageStatsView::Cpu { top_processes, .. } = &record.packages.top_cpu[0].view else {
        panic!("expected cpu view");
    };
    let comms: Vec<&str> = top_processes.iter().map(|p| p.comm.as_str()).collect();
    assert_eq!(comms, vec!["high", "mid"]);
}

#[test]
fn io_totals_saturate_and_split_by_state() {
    let mut profiler = profiler();
    let stats = vec![
        UidStats {
            uid: 1001,
            io: UidIoUsage {
                fg_read_bytes: i64::MAX,
                bg_read_bytes: 10,
                fg_write_bytes: 100,
                bg_write_bytes: 50,
                fg_fsync: 3,
                bg_fsync: 1,
            },
            ..Default::default()
        },
        UidStats {
            uid: 1002,
            io: UidIoUsage { fg_read_bytes: 5, ..Default::default() },
            ..Default::default()
        },
    ];
    profiler.on_periodic_collection(1_000, &stats, &proc_delta()).unwrap();

    let record = &profiler.periodic_records()[0];
    let total = &record.packages.total_io;
    assert_eq!(total.read_bytes[FOREGROUND], i64::MAX);
    assert_eq!(total.read_bytes[BACKGROUND], 10);
    assert_eq!(total.write_bytes[FOREGROUND], 100);
    assert_eq!(total.fsync[FOREGROUND], 3);
    assert_eq!(record.packages.top_io_reads.len(), 2);
    assert_eq!(record.packages.top_io_writes.len(), 1);
}

#[test]
fn major_faults_percent_change_tracks_the_previous_record() {
    let mut profiler = profiler();
    let faults = |count: u64| {
        vec![UidStats { uid: 1001, major_faults: count, ..Default::default() }]
    };

    profiler.on_periodic_collection(1_000, &faults(0), &proc_delta()).unwrap();
    profiler.on_periodic_collection(2_000, &faults(100), &proc_delta()).unwrap();
    profiler.on_periodic_collection(3_000, &faults(150), &proc_delta()).unwrap();
    profiler.on_periodic_collection(4_000, &faults(75), &proc_delta()).unwrap();

    let changes: Vec<f64> = profiler
        .periodic_records()
        .iter()
        .map(|r| r.packages.major_faults_percent_change)
        .collect();
    assert_eq!(changes[0], 0.0);
    assert_eq!(changes[1], 0.0); // previous total was 0
    assert_eq!(changes[2], 50.0);
    assert_eq!(changes[3], -50.0);
}

#[test]
fn filter_packages_bypass_top_n_and_keep_natural_order() {
    let mut profiler = profiler_with(ProfilerConfig {
        top_n_per_category: 1,
        ..ProfilerConfig::default()
    });
    let stats = vec![cpu_uid(1003, 10), cpu_uid(1001, 5), cpu_uid(1002, 500)];
    let filter: HashSet<String> =
        ["com.vendor.gamma".to_string(), "com.vendor.alpha".to_string()].into();
    profiler.on_custom_collection(1_000, &filter, &stats, &proc_delta()).unwrap();

    let record = &profiler.custom_records()[0];
    // top-N of 1 is bypassed; both filtered packages appear in snapshot order
    let names: Vec<&str> =
        record.packages.top_cpu.iter().map(|p| p.package_name.as_str()).collect();
    assert_eq!(names, vec!["com.vendor.gamma", "com.vendor.alpha"]);
    // task counts recorded only for filtered packages
    assert!(record.packages.task_count_by_uid.contains_key(&1003));
    assert!(!record.packages.task_count_by_uid.contains_key(&1002));
}

#[test]
fn empty_filter_set_means_top_n() {
    let mut profiler = profiler_with(ProfilerConfig {
        top_n_per_category: 1,
        ..ProfilerConfig::default()
    });
    let stats = vec![cpu_uid(1001, 5), cpu_uid(1002, 500)];
    profiler
        .on_custom_collection(1_000, &HashSet::new(), &stats, &proc_delta())
        .unwrap();

    let record = &profiler.custom_records()[0];
    assert_eq!(record.packages.top_cpu.len(), 1);
    assert_eq!(record.packages.top_cpu[0].uid, 1002);
}

#[test]
fn wake_up_buffer_keeps_only_the_newest_record() {
    let mut profiler = profiler();
    profiler.on_wake_up_collection(1_000, &[], &proc_delta()).unwrap();
    profiler.on_wake_up_collection(2_000, &[], &proc_delta()).unwrap();

    let record = profiler.wakeup_record().unwrap();
    assert_eq!(record.collected_at_ms, 2_000);
}

#[test]
fn user_switch_buffers_group_by_user_pair() {
    let mut profiler = profiler();
    profiler.on_user_switch_collection(1_000, 10, 11, &[], &proc_delta()).unwrap();
    profiler.on_user_switch_collection(2_000, 10, 11, &[], &proc_delta()).unwrap();
    profiler.on_user_switch_collection(3_000, 11, 12, &[], &proc_delta()).unwrap();

    assert_eq!(profiler.user_switch_buffers(), vec![(10, 11, 2), (11, 12, 1)]);
}

#[test]
fn user_switch_buffers_evict_fifo_beyond_the_max() {
    let mut profiler = profiler_with(ProfilerConfig {
        max_user_switch_events: 2,
        ..ProfilerConfig::default()
    });
    profiler.on_user_switch_collection(1_000, 1, 2, &[], &proc_delta()).unwrap();
    profiler.on_user_switch_collection(2_000, 2, 3, &[], &proc_delta()).unwrap();
    profiler.on_user_switch_collection(3_000, 3, 4, &[], &proc_delta()).unwrap();

    assert_eq!(profiler.user_switch_buffers(), vec![(2, 3, 1), (3, 4, 1)]);
}

#[test]
fn stale_caches_are_evicted_at_periodic_collection() {
    let mut profiler = profiler_with(ProfilerConfig {
        cache_duration: Duration::from_secs(60),
        ..ProfilerConfig::default()
    });
    profiler.on_boottime_collection(1_000, &[], &proc_delta()).unwrap();
    profiler.on_wake_up_collection(2_000, &[], &proc_delta()).unwrap();
    profiler.on_user_switch_collection(3_000, 1, 2, &[], &proc_delta()).unwrap();

    // within the cache window: nothing evicted
    profiler.on_periodic_collection(30_000, &[], &proc_delta()).unwrap();
    assert_eq!(profiler.boottime_records().len(), 1);

    // past the window: boot-time, wake-up, and the oldest user switch go
    profiler.on_periodic_collection(70_000, &[], &proc_delta()).unwrap();
    assert!(profiler.boottime_records().is_empty());
    assert!(profiler.wakeup_record().is_none());
    assert!(profiler.user_switch_buffers().is_empty());
}

#[test]
fn periodic_buffer_is_bounded() {
    let mut profiler = profiler_with(ProfilerConfig {
        periodic_buffer_size: 2,
        ..ProfilerConfig::default()
    });
    for at in [1_000, 2_000, 3_000] {
        profiler.on_periodic_collection(at, &[], &proc_delta()).unwrap();
    }
    let times: Vec<u64> =
        profiler.periodic_records().iter().map(|r| r.collected_at_ms).collect();
    assert_eq!(times, vec![2_000, 3_000]);
}

#[test]
fn custom_dump_writes_report_then_clears() {
    let mut profiler = profiler();
    profiler
        .on_custom_collection(1_000, &HashSet::new(), &[cpu_uid(1001, 5)], &proc_delta())
        .unwrap();

    let mut report = String::new();
    profiler.on_custom_collection_dump(Some(&mut report)).unwrap();
    assert!(report.contains("Custom performance report"));
    assert!(report.contains("com.vendor.alpha"));
    assert!(profiler.custom_records().is_empty());

    // auto-end variant clears without a report
    profiler
        .on_custom_collection(2_000, &HashSet::new(), &[], &proc_delta())
        .unwrap();
    profiler.on_custom_collection_dump(None).unwrap();
    assert!(profiler.custom_records().is_empty());
}

#[test]
fn dump_reports_empty_buffers_explicitly() {
    let profiler = profiler();
    let dump = profiler.on_dump();
    assert!(dump.contains("Boot-time performance report"));
    assert!(dump.contains("No collection recorded"));
}

#[test]
fn structured_dump_has_the_expected_shape() {
    let mut profiler = profiler();
    profiler
        .on_boottime_collection(1_700_000_000_000, &[cpu_uid(1001, 5)], &proc_delta())
        .unwrap();

    let value = profiler.on_dump_structured();
    let records = value["boot_time"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0]["date"].is_string());
    assert!(records[0]["time_of_day"].is_string());
    assert!(records[0]["system_wide_stats"]["total_cpu_ms"].is_u64());
    assert!(records[0]["package_cpu_stats"].is_array());
}
