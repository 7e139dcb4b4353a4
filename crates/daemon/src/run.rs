// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher run loops.
//!
//! Each daemon has exactly one dispatcher task: it drains the service's
//! message channel, polls the timer scheduler on a fixed tick, and runs every
//! handler inline. The loops exit on cancellation or SIGTERM/SIGINT.

use axle_core::{Clock, Scheduler};
use axle_power::{PowerMessage, PowerServer};
use axle_watchdog::{WatchdogMessage, WatchdogServer};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

fn drain_timers<M>(scheduler: &Arc<Mutex<Scheduler<M>>>, now: std::time::Instant) -> Vec<M> {
    scheduler.lock().fired(now)
}

/// Power daemon dispatcher loop. Returns when cancelled or on SIGTERM/SIGINT.
pub async fn run_power<C: Clock + 'static>(
    server: Arc<PowerServer<C>>,
    mut rx: mpsc::UnboundedReceiver<PowerMessage>,
    clock: C,
    cancel: CancellationToken,
) {
    let mut sigterm = signal_stream(tokio::signal::unix::SignalKind::terminate());
    let mut sigint = signal_stream(tokio::signal::unix::SignalKind::interrupt());
    let mut timer_check = tokio::time::interval(crate::env::timer_check_interval());
    let scheduler = server.scheduler();

    server.init();
    info!("power policy daemon is running");

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(message) => server.handle_message(message),
                    None => break,
                }
            }
            _ = timer_check.tick() => {
                for message in drain_timers(&scheduler, clock.now()) {
                    server.handle_message(message);
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = cancel.cancelled() => break,
        }
    }

    server.terminate();
    info!("power policy daemon stopped");
}

/// Watchdog daemon dispatcher loop. Returns when cancelled or on
/// SIGTERM/SIGINT.
pub async fn run_watchdog<C: Clock + 'static>(
    server: Arc<WatchdogServer<C>>,
    mut rx: mpsc::UnboundedReceiver<WatchdogMessage>,
    clock: C,
    cancel: CancellationToken,
) {
    let mut sigterm = signal_stream(tokio::signal::unix::SignalKind::terminate());
    let mut sigint = signal_stream(tokio::signal::unix::SignalKind::interrupt());
    let mut timer_check = tokio::time::interval(crate::env::timer_check_interval());
    let scheduler = server.scheduler();

    if let Err(e) = server.start() {
        tracing::error!(error = %e, "failed to start watchdog services");
        return;
    }
    info!("watchdog daemon is running");

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(message) => server.handle_message(message),
                    None => break,
                }
            }
            _ = timer_check.tick() => {
                for message in drain_timers(&scheduler, clock.now()) {
                    server.handle_message(message);
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = cancel.cancelled() => break,
        }
    }

    server.terminate();
    info!("watchdog daemon stopped");
}

fn signal_stream(kind: tokio::signal::unix::SignalKind) -> tokio::signal::unix::Signal {
    match tokio::signal::unix::signal(kind) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handler");
            // A daemon without signal handlers still runs; cancellation
            // remains available.
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install fallback signal handler");
                    std::process::exit(1);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
