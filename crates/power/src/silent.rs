// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Silent-mode watcher.
//!
//! Tracks the hardware silent bit and reports transitions to the coordinator.
//! Two boot-reason values force the mode permanently; in forced mode hardware
//! monitoring never starts and explicit kernel updates are rejected. The
//! kernel mirror write is best-effort: a missing sysfs file is logged, never
//! propagated.

use axle_adapters::silent::{KernelSilentFile, SilentError, SilentModeMonitor};
use parking_lot::Mutex;
use std::sync::Arc;

pub const BOOT_REASON_FORCED_SILENT: &str = "reboot,forcedsilent";
pub const BOOT_REASON_FORCED_NON_SILENT: &str = "reboot,forcednonsilent";

/// Receives decided silent-mode transitions.
pub trait SilentModeSink: Send + Sync {
    fn on_silent_mode_changed(&self, silent: bool);
}

struct SilentInner {
    silent: bool,
    forced: bool,
    monitoring: bool,
}

pub struct SilentModeWatcher {
    monitor: Arc<dyn SilentModeMonitor>,
    kernel: Arc<dyn KernelSilentFile>,
    sink: Arc<dyn SilentModeSink>,
    boot_reason: String,
    inner: Mutex<SilentInner>,
}

impl SilentModeWatcher {
    pub fn new(
        monitor: Arc<dyn SilentModeMonitor>,
        kernel: Arc<dyn KernelSilentFile>,
        sink: Arc<dyn SilentModeSink>,
        boot_reason: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            monitor,
            kernel,
            sink,
            boot_reason: boot_reason.into(),
            inner: Mutex::new(SilentInner { silent: false, forced: false, monitoring: false }),
        })
    }

    /// Resolve the boot mode and either report the forced state or start
    /// hardware monitoring.
    pub fn init(self: &Arc<Self>) {
        let forced_state = match self.boot_reason.as_str() {
            BOOT_REASON_FORCED_SILENT => Some(true),
            BOOT_REASON_FORCED_NON_SILENT => Some(false),
            _ => None,
        };
        if let Some(silent) = forced_state {
            {
                let mut inner = self.inner.lock();
                inner.forced = true;
                inner.silent = silent;
            }
            if let Err(e) = self.write_kernel(silent) {
                tracing::warn!(error = %e, "failed to update kernel silent mode");
            }
            self.sink.on_silent_mode_changed(silent);
            tracing::info!(silent, "forced silent mode; hardware state monitoring is disabled");
            return;
        }
        self.start_monitoring();
    }

    fn start_monitoring(self: &Arc<Self>) {
        let watcher = Arc::clone(self);
        let result = self
            .monitor
            .start(Arc::new(move |silent| watcher.handle_hw_state_change(silent)));
        match result {
            Ok(()) => self.inner.lock().monitoring = true,
            Err(e) => tracing::error!(error = %e, "failed to monitor silent hardware state"),
        }
    }

    fn handle_hw_state_change(&self, silent: bool) {
        {
            let mut inner = self.inner.lock();
            // The watcher fires once per raw filesystem event, which can be
            // several per logical write; only a state change is reported.
            if inner.forced || inner.silent == silent {
                return;
            }
            inner.silent = silent;
        }
        if let Err(e) = self.write_kernel(silent) {
            tracing::warn!(error = %e, "failed to update kernel silent mode");
        }
        self.sink.on_silent_mode_changed(silent);
    }

    /// Stop hardware-state monitoring. Idempotent; used by the takeover
    /// handshake.
    pub fn stop_monitoring(&self) {
        let mut inner = self.inner.lock();
        if !inner.monitoring {
            return;
        }
        inner.monitoring = false;
        drop(inner);
        self.monitor.stop();
    }

    pub fn is_silent_mode(&self) -> bool {
        self.inner.lock().silent
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.lock().monitoring
    }

    /// Explicit kernel mirror update. Rejected in forced mode.
    pub fn update_kernel_silent_mode(&self, silent: bool) -> Result<(), SilentError> {
        if self.inner.lock().forced {
            return Err(SilentError::Io {
                path: "pm_silentmode_kernel".to_string(),
                reason: "cannot update kernel silent mode in forced mode".to_string(),
            });
        }
        self.write_kernel(silent)
    }

    fn write_kernel(&self, silent: bool) -> Result<(), SilentError> {
        self.kernel.write_silent(silent)
    }
}

#[cfg(test)]
#[path = "silent_tests.rs"]
mod tests;
