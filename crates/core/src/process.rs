// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller identity, process identity, and health-check timeout tracks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identity of a remote callback object.
///
/// The transport guarantees the same remote object always maps to the same
/// handle value, so registries key their entries by it and death cookies
/// carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    pub fn new(raw: u64) -> Self {
        Handle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle:{:#x}", self.0)
    }
}

/// UID of the system server; privileged daemon operations require it.
pub const SYSTEM_UID: u32 = 1000;

/// Identity of an RPC caller as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub pid: i32,
    pub uid: u32,
}

impl CallerContext {
    pub fn new(pid: i32, uid: u32) -> Self {
        Self { pid, uid }
    }

    pub fn system(pid: i32) -> Self {
        Self { pid, uid: SYSTEM_UID }
    }

    pub fn is_system(&self) -> bool {
        self.uid == SYSTEM_UID
    }
}

/// Identifies a process unambiguously across pid reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIdentifier {
    pub pid: i32,
    pub start_time_ms: u64,
}

/// Health-check timeout category. Each track runs an independent ping round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutTrack {
    Critical,
    Moderate,
    Normal,
}

impl TimeoutTrack {
    pub const ALL: [TimeoutTrack; 3] =
        [TimeoutTrack::Critical, TimeoutTrack::Moderate, TimeoutTrack::Normal];

    /// Round duration for this track. Moderate and normal include buffer time
    /// on top of the guaranteed client deadline (5s + 1s, 10s + 2s).
    pub fn timeout(&self) -> Duration {
        match self {
            TimeoutTrack::Critical => Duration::from_secs(3),
            TimeoutTrack::Moderate => Duration::from_secs(6),
            TimeoutTrack::Normal => Duration::from_secs(12),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutTrack::Critical => "critical",
            TimeoutTrack::Moderate => "moderate",
            TimeoutTrack::Normal => "normal",
        }
    }
}

impl fmt::Display for TimeoutTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
