// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn record_at(ms: u64) -> ResourceRecord {
    ResourceRecord { collected_at_ms: ms, ..Default::default() }
}

#[test]
fn bounded_buffer_keeps_the_most_recent_records_in_order() {
    let mut buffer = CollectionBuffer::bounded(3);
    for ms in [10, 20, 30, 40, 50] {
        buffer.append(record_at(ms));
    }
    let times: Vec<u64> = buffer.records().map(|r| r.collected_at_ms).collect();
    assert_eq!(times, vec![30, 40, 50]);
    assert_eq!(buffer.latest().unwrap().collected_at_ms, 50);
}

#[test]
fn unbounded_buffer_keeps_everything() {
    let mut buffer = CollectionBuffer::unbounded();
    for ms in 0..100 {
        buffer.append(record_at(ms));
    }
    assert_eq!(buffer.len(), 100);
}

#[test]
fn size_one_buffer_keeps_only_the_newest() {
    let mut buffer = CollectionBuffer::bounded(1);
    buffer.append(record_at(1));
    buffer.append(record_at(2));
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.latest().unwrap().collected_at_ms, 2);
}

#[parameterized(
    cpu = {
        PackageStatsView::Cpu { cpu_time_ms: 123, cpu_cycles: 9, top_processes: vec![] },
        123,
    },
    io = {
        PackageStatsView::Io { bytes: [100, 28], fsync: [1, 1] },
        128,
    },
    single = {
        PackageStatsView::Single { value: 77, top_processes: vec![] },
        77,
    },
)]
fn key_value_uses_the_category_primary_key(view: PackageStatsView, expected: u64) {
    let stats = PackageStats { uid: 1000, package_name: "pkg".to_string(), view };
    assert_eq!(stats.key_value(true), expected);
}

#[test]
fn memory_key_switches_between_pss_and_rss() {
    let stats = PackageStats {
        uid: 1000,
        package_name: "pkg".to_string(),
        view: PackageStatsView::Memory { rss_kb: 2000, pss_kb: 1645, top_processes: vec![] },
    };
    assert_eq!(stats.key_value(true), 1645);
    assert_eq!(stats.key_value(false), 2000);
}

#[test]
fn io_key_saturates_on_overflow() {
    let stats = PackageStats {
        uid: 1000,
        package_name: "pkg".to_string(),
        view: PackageStatsView::Io { bytes: [i64::MAX, i64::MAX], fsync: [0, 0] },
    };
    assert_eq!(stats.key_value(true), i64::MAX as u64);
}
