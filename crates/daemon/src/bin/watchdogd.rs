// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watchdog daemon entry point.
//!
//! Health checking and the performance profiler run against the host's proc
//! filesystem. The vehicle transport, per-UID stat interface, and HAL
//! registry are provided by the platform integration; their placeholders here
//! degrade those paths gracefully.

use anyhow::Result;
use axle_adapters::death::NoDeathNotifications;
use axle_adapters::procfs::{ProcfsProcessInfo, ProcfsStatSource};
use axle_adapters::resolver::CachingNameResolver;
use axle_adapters::stats::{UnavailableDiskStatsSource, UnavailableUidStatsSource};
use axle_adapters::system::{NoHalRegistry, NoShutdown};
use axle_adapters::vhal::DisconnectedVhal;
use axle_core::SystemClock;
use axle_daemon::{env, logging, run};
use axle_watchdog::{
    DataProcessor, HealthDeps, PerfSources, PerformanceProfiler, WatchdogServer,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "axle-watchdogd", about = "Vehicle resource watchdog daemon")]
struct Args {
    /// Directory for daily-rolling log files (stderr when omitted)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_dir.as_deref());

    let clock = SystemClock;
    let profiler = PerformanceProfiler::new(
        env::profiler_config(),
        Arc::new(CachingNameResolver::new()),
    );
    let (server, rx) = WatchdogServer::new(
        env::watchdog_config(),
        HealthDeps {
            connector: Arc::new(DisconnectedVhal),
            death_registry: Arc::new(NoDeathNotifications),
            process_info: Arc::new(ProcfsProcessInfo::new(0)),
            hal_registry: Arc::new(NoHalRegistry),
            shutdown: Arc::new(NoShutdown),
        },
        PerfSources {
            uid_stats: Box::new(UnavailableUidStatsSource),
            proc_stat: Box::new(ProcfsStatSource::new()),
            disk_stats: Box::new(UnavailableDiskStatsSource::default()),
        },
        vec![Box::new(profiler) as Box<dyn DataProcessor>],
        clock.clone(),
    );

    run::run_watchdog(Arc::new(server), rx, clock, CancellationToken::new()).await;
    Ok(())
}
