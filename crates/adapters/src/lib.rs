// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! axle-adapters: trait seams for the daemons' external collaborators.
//!
//! The daemons never talk to the VHAL transport, proc/sysfs, or the package
//! manager directly; they consume the traits in this crate. Production
//! implementations live here only where plain `std` suffices (procfs parsing,
//! sysfs silent-mode files). Everything else is provided by the platform
//! integration that links the daemon, or by the fakes behind the
//! `test-support` feature.

pub mod death;
pub mod procfs;
pub mod resolver;
pub mod silent;
pub mod stats;
pub mod system;
pub mod vhal;

pub use death::{DeathError, DeathRecipient, DeathRegistry};
pub use resolver::PackageNameResolver;
pub use silent::{KernelSilentFile, SilentError, SilentModeMonitor};
pub use stats::{
    DiskStatsDelta, DiskStatsSource, ProcStatDelta, ProcStatSource, ProcessStats, StatsError,
    UidIoUsage, UidStats, UidStatsSource,
};
pub use system::{HalInfo, HalRegistry, ProcessInfoSource, ShutdownProbe};
pub use vhal::{
    PropValue, VhalClient, VhalConnector, VhalError, VhalListener, VhalProperty,
};

#[cfg(any(test, feature = "test-support"))]
pub use death::FakeDeathRegistry;
#[cfg(any(test, feature = "test-support"))]
pub use resolver::FakePackageNameResolver;
#[cfg(any(test, feature = "test-support"))]
pub use silent::{FakeKernelSilentFile, FakeSilentModeMonitor};
#[cfg(any(test, feature = "test-support"))]
pub use stats::{FakeDiskStatsSource, FakeProcStatSource, FakeUidStatsSource};
#[cfg(any(test, feature = "test-support"))]
pub use system::{FakeHalRegistry, FakeProcessInfoSource, FakeShutdownProbe};
#[cfg(any(test, feature = "test-support"))]
pub use vhal::{FakeVhal, FakeVhalConnector};
