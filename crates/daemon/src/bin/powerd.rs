// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Power policy daemon entry point.
//!
//! Wires the coordinator against the host's sysfs silent-mode files. The
//! vehicle transport is provided by the platform integration; without one
//! the VHAL connect loop runs its retry budget and gives up.

use anyhow::Result;
use axle_adapters::death::NoDeathNotifications;
use axle_adapters::silent::{FsKernelSilentFile, FsSilentModeMonitor};
use axle_adapters::vhal::DisconnectedVhal;
use axle_core::SystemClock;
use axle_daemon::{env, logging, run};
use axle_power::PowerServer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "axle-powerd", about = "Vehicle power policy daemon")]
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
    let (server, rx) = PowerServer::new(
        env::power_config(),
        Arc::new(DisconnectedVhal),
        Arc::new(FsSilentModeMonitor::new(env::silent_mode_hw_state_path())),
        Arc::new(FsKernelSilentFile::new(env::silent_mode_kernel_path())),
        Arc::new(NoDeathNotifications),
        clock.clone(),
    );

    run::run_power(Arc::new(server), rx, clock, CancellationToken::new()).await;
    Ok(())
}
