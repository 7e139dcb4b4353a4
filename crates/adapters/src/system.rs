// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System-level probes: per-process info, the HAL registry used to locate the
//! VHAL process, and the shutdown probe that suppresses escalation during a
//! system power-off.

use crate::stats::StatsError;
use serde::Serialize;

/// Per-pid queries backed by the proc filesystem (or a fake).
pub trait ProcessInfoSource: Send + Sync {
    fn start_time_ms(&self, pid: i32) -> Result<u64, StatsError>;

    fn cmdline(&self, pid: i32) -> Result<String, StatsError>;
}

/// One running HAL as reported by the service registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HalInfo {
    pub interface_name: String,
    pub pid: i32,
}

/// Service-manager-like registry listing running HALs.
pub trait HalRegistry: Send + Sync {
    fn running_hals(&self) -> Result<Vec<HalInfo>, StatsError>;
}

/// Whether the system is in the middle of a reboot or shutdown.
pub trait ShutdownProbe: Send + Sync {
    fn is_shutting_down(&self) -> bool;
}

/// Probe for hosts with no power-control plumbing: never shutting down.
pub struct NoShutdown;

impl ShutdownProbe for NoShutdown {
    fn is_shutting_down(&self) -> bool {
        false
    }
}

/// Registry for hosts without a HAL service manager: nothing is running.
pub struct NoHalRegistry;

impl HalRegistry for NoHalRegistry {
    fn running_hals(&self) -> Result<Vec<HalInfo>, StatsError> {
        Ok(Vec::new())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeHalRegistry, FakeProcessInfoSource, FakeShutdownProbe};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct FakeProcessInfoSource {
        start_times: Mutex<HashMap<i32, u64>>,
        cmdlines: Mutex<HashMap<i32, String>>,
    }

    impl FakeProcessInfoSource {
        pub fn new() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self::default())
        }

        pub fn set_process(&self, pid: i32, start_time_ms: u64, cmdline: impl Into<String>) {
            self.start_times.lock().insert(pid, start_time_ms);
            self.cmdlines.lock().insert(pid, cmdline.into());
        }
    }

    impl ProcessInfoSource for FakeProcessInfoSource {
        fn start_time_ms(&self, pid: i32) -> Result<u64, StatsError> {
            self.start_times
                .lock()
                .get(&pid)
                .copied()
                .ok_or_else(|| StatsError::Unavailable(format!("pid {pid} not found")))
        }

        fn cmdline(&self, pid: i32) -> Result<String, StatsError> {
            self.cmdlines
                .lock()
                .get(&pid)
                .cloned()
                .ok_or_else(|| StatsError::Unavailable(format!("pid {pid} not found")))
        }
    }

    #[derive(Default)]
    pub struct FakeHalRegistry {
        hals: Mutex<Vec<HalInfo>>,
    }

    impl FakeHalRegistry {
        pub fn new() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self::default())
        }

        pub fn add_hal(&self, interface_name: impl Into<String>, pid: i32) {
            self.hals.lock().push(HalInfo { interface_name: interface_name.into(), pid });
        }
    }

    impl HalRegistry for FakeHalRegistry {
        fn running_hals(&self) -> Result<Vec<HalInfo>, StatsError> {
            Ok(self.hals.lock().clone())
        }
    }

    #[derive(Default)]
    pub struct FakeShutdownProbe {
        shutting_down: AtomicBool,
    }

    impl FakeShutdownProbe {
        pub fn new() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self::default())
        }

        pub fn set_shutting_down(&self, value: bool) {
            self.shutting_down.store(value, Ordering::SeqCst);
        }
    }

    impl ShutdownProbe for FakeShutdownProbe {
        fn is_shutting_down(&self) -> bool {
            self.shutting_down.load(Ordering::SeqCst)
        }
    }
}
