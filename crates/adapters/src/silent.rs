// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Silent-mode hardware state seam.
//!
//! The hardware exposes the silent bit through a sysfs file ("1"/"0"); the
//! kernel accepts a mirror of the decided mode through a second file. The
//! production monitor watches the hardware file with the `notify` crate on a
//! dedicated watcher thread and reports transitions to the registered
//! callback.

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SilentError {
    #[error("failed to access {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("failed to watch hardware state: {0}")]
    Watch(String),
}

pub type SilentChangeCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Watches the hardware silent-state file for changes.
pub trait SilentModeMonitor: Send + Sync {
    /// Read the current hardware state.
    fn current_state(&self) -> Result<bool, SilentError>;

    /// Start reporting state changes to `on_change`. At most one monitor runs
    /// at a time; a second start replaces the callback.
    fn start(&self, on_change: SilentChangeCallback) -> Result<(), SilentError>;

    /// Stop monitoring. Idempotent.
    fn stop(&self);
}

/// Mirrors the decided silent mode into the kernel.
pub trait KernelSilentFile: Send + Sync {
    fn write_silent(&self, silent: bool) -> Result<(), SilentError>;
}

fn read_silent_state(path: &Path) -> Result<bool, SilentError> {
    let content = std::fs::read_to_string(path).map_err(|e| SilentError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(content.trim() == "1")
}

/// Production monitor over a sysfs hardware-state file.
pub struct FsSilentModeMonitor {
    path: PathBuf,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl FsSilentModeMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), watcher: Mutex::new(None) }
    }
}

impl SilentModeMonitor for FsSilentModeMonitor {
    fn current_state(&self) -> Result<bool, SilentError> {
        read_silent_state(&self.path)
    }

    fn start(&self, on_change: SilentChangeCallback) -> Result<(), SilentError> {
        let path = self.path.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(_) => match read_silent_state(&path) {
                    Ok(state) => on_change(state),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to re-read silent hardware state")
                    }
                },
                Err(e) => tracing::warn!(error = %e, "silent-mode watch error"),
            },
        )
        .map_err(|e| SilentError::Watch(e.to_string()))?;
        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| SilentError::Watch(e.to_string()))?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    fn stop(&self) {
        self.watcher.lock().take();
    }
}

/// Production kernel mirror file writer ("1" for silent, "0" otherwise).
pub struct FsKernelSilentFile {
    path: PathBuf,
}

impl FsKernelSilentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KernelSilentFile for FsKernelSilentFile {
    fn write_silent(&self, silent: bool) -> Result<(), SilentError> {
        let value = if silent { "1" } else { "0" };
        std::fs::write(&self.path, value).map_err(|e| SilentError::Io {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeKernelSilentFile, FakeSilentModeMonitor};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    #[derive(Default)]
    struct FakeMonitorInner {
        state: bool,
        callback: Option<SilentChangeCallback>,
        fail_start: bool,
    }

    /// Scriptable hardware-state monitor.
    #[derive(Default)]
    pub struct FakeSilentModeMonitor {
        inner: Mutex<FakeMonitorInner>,
    }

    impl FakeSilentModeMonitor {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set_state(&self, silent: bool) {
            self.inner.lock().state = silent;
        }

        pub fn fail_start(&self) {
            self.inner.lock().fail_start = true;
        }

        /// Simulate a hardware state change event.
        pub fn emit(&self, silent: bool) {
            let callback = {
                let mut inner = self.inner.lock();
                inner.state = silent;
                inner.callback.clone()
            };
            if let Some(callback) = callback {
                callback(silent);
            }
        }

        pub fn is_monitoring(&self) -> bool {
            self.inner.lock().callback.is_some()
        }
    }

    impl SilentModeMonitor for FakeSilentModeMonitor {
        fn current_state(&self) -> Result<bool, SilentError> {
            Ok(self.inner.lock().state)
        }

        fn start(&self, on_change: SilentChangeCallback) -> Result<(), SilentError> {
            let mut inner = self.inner.lock();
            if inner.fail_start {
                return Err(SilentError::Watch("injected start failure".to_string()));
            }
            inner.callback = Some(on_change);
            Ok(())
        }

        fn stop(&self) {
            self.inner.lock().callback = None;
        }
    }

    #[derive(Default)]
    struct FakeKernelFileInner {
        writes: Vec<bool>,
        missing: bool,
    }

    /// Records kernel mirror writes; can simulate a missing file.
    #[derive(Default)]
    pub struct FakeKernelSilentFile {
        inner: Mutex<FakeKernelFileInner>,
    }

    impl FakeKernelSilentFile {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn set_missing(&self, missing: bool) {
            self.inner.lock().missing = missing;
        }

        pub fn writes(&self) -> Vec<bool> {
            self.inner.lock().writes.clone()
        }
    }

    impl KernelSilentFile for FakeKernelSilentFile {
        fn write_silent(&self, silent: bool) -> Result<(), SilentError> {
            let mut inner = self.inner.lock();
            if inner.missing {
                return Err(SilentError::Io {
                    path: "pm_silentmode_kernel".to_string(),
                    reason: "No such file or directory".to_string(),
                });
            }
            inner.writes.push(silent);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "silent_tests.rs"]
mod tests;
