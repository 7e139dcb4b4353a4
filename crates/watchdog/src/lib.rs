// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! axle-watchdog: the resource watchdog daemon core.
//!
//! Three services share one dispatcher: the client health-check scheduler
//! (three timeout tracks, session-id correlated ping rounds, monitor
//! escalation), the VHAL supervisor (heartbeat monotonicity and windows), and
//! the performance collection pipeline (boot-time, periodic, wake-up,
//! user-switch, and operator-driven custom collections).

pub mod client;
pub mod health;
pub mod message;
pub mod perf;
pub mod server;

pub use client::{ClientInfo, ClientKind, HealthCheckClient, WatchdogMonitor};
pub use health::{HealthConfig, HealthDeps, ProcessHealthService};
pub use message::WatchdogMessage;
pub use perf::{
    CollectionState, DataProcessor, PerfConfig, PerfError, PerfService, PerfSources,
    PerformanceProfiler, ProfilerConfig,
};
pub use server::{
    dump_exit_code, WatchdogConfig, WatchdogServer, DUMP_EXIT_BAD_VALUE,
    DUMP_EXIT_FAILED_TRANSACTION, DUMP_EXIT_OK,
};
