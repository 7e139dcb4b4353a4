// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn fs_monitor_reads_hardware_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pm_silentmode_hw_state");
    std::fs::write(&path, "1\n").unwrap();

    let monitor = FsSilentModeMonitor::new(&path);
    assert_eq!(monitor.current_state().unwrap(), true);

    std::fs::write(&path, "0\n").unwrap();
    assert_eq!(monitor.current_state().unwrap(), false);
}

#[test]
fn fs_monitor_missing_file_is_an_error() {
    let monitor = FsSilentModeMonitor::new("/nonexistent/pm_silentmode_hw_state");
    assert!(monitor.current_state().is_err());
}

#[test]
fn fs_kernel_file_writes_bit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pm_silentmode_kernel");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"0").unwrap();
    drop(f);

    let kernel = FsKernelSilentFile::new(&path);
    kernel.write_silent(true).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
    kernel.write_silent(false).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
}

#[test]
fn fake_monitor_emits_transitions() {
    let monitor = FakeSilentModeMonitor::new();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen2 = std::sync::Arc::clone(&seen);

    monitor.start(Arc::new(move |silent| seen2.lock().push(silent))).unwrap();
    assert!(monitor.is_monitoring());

    monitor.emit(true);
    monitor.emit(false);
    assert_eq!(*seen.lock(), vec![true, false]);

    monitor.stop();
    assert!(!monitor.is_monitoring());
    monitor.emit(true);
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn fake_kernel_file_missing_errors() {
    let kernel = FakeKernelSilentFile::new();
    kernel.set_missing(true);
    assert!(kernel.write_silent(true).is_err());
    assert!(kernel.writes().is_empty());
}
