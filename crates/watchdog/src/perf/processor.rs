// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-processor capability interface.
//!
//! The collection service drives every registered processor through these
//! hooks; each has a default empty implementation so a processor only
//! implements the events it cares about. A returned error is fatal to the
//! collection service.

use axle_adapters::stats::{DiskStatsDelta, ProcStatDelta, StatsError, UidStats};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfError {
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("{0}")]
    Processor(String),
}

#[allow(unused_variables)]
pub trait DataProcessor: Send {
    fn name(&self) -> &'static str;

    /// Called once when the collection service starts.
    fn start(&mut self) -> Result<(), PerfError> {
        Ok(())
    }

    fn on_boottime_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        Ok(())
    }

    fn on_periodic_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        Ok(())
    }

    fn on_custom_collection(
        &mut self,
        now_ms: u64,
        filter_packages: &HashSet<String>,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
        Ok(())
    }

    fn on_wake_up_collection(
        &mut self,
        now_ms: u64,
        uid_stats: &[UidStats],
        proc_stat: &ProcStatDelta,
    ) -> Result<(), PerfError> {
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
        Ok(())
    }

    fn on_periodic_monitor(
        &mut self,
        now_ms: u64,
        disk_stats: &DiskStatsDelta,
    ) -> Result<(), PerfError> {
        Ok(())
    }

    /// Human-readable report of the cached records.
    fn on_dump(&self) -> String {
        String::new()
    }

    /// Machine-readable report of the cached records.
    fn on_dump_structured(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// End of a custom collection. With a report target, write the custom
    /// report before the cache is cleared; without one (auto-end), only
    /// clear the cache.
    fn on_custom_collection_dump(&mut self, report: Option<&mut String>) -> Result<(), PerfError> {
        Ok(())
    }

    fn terminate(&mut self) {}
}
