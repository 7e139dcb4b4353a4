// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Performance collection service.
//!
//! Event-driven FSM: INIT → BOOT_TIME → PERIODIC ⇄ CUSTOM, with wake-up and
//! user-switch collections out of band. All state transitions, stat-source
//! refreshes, and processor calls run on the dispatcher; a stat-source or
//! processor failure terminates the service. Timer messages are guarded
//! against the state they were armed for, since a message from the previous
//! collection event can land after a transition.

mod processor;
mod profiler;
pub mod record;

pub use processor::{DataProcessor, PerfError};
pub use profiler::{PerformanceProfiler, ProfilerConfig};

use crate::message::{
    WatchdogMessage, TIMER_PERF_BOOTTIME, TIMER_PERF_CUSTOM, TIMER_PERF_CUSTOM_END,
    TIMER_PERF_MONITOR, TIMER_PERF_PERIODIC, TIMER_PREFIX_PERF,
};
use axle_core::{Clock, Scheduler, ServiceError};
use axle_adapters::stats::{DiskStatsSource, ProcStatSource, UidStatsSource};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Minimum collection interval between subsequent collections.
const MIN_COLLECTION_INTERVAL: Duration = Duration::from_secs(1);

pub const START_CUSTOM_COLLECTION_FLAG: &str = "--start_perf";
pub const END_CUSTOM_COLLECTION_FLAG: &str = "--stop_perf";
pub const INTERVAL_FLAG: &str = "--interval";
pub const MAX_DURATION_FLAG: &str = "--max_duration";
pub const FILTER_PACKAGES_FLAG: &str = "--filter_packages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Init,
    BootTime,
    Periodic,
    Custom,
    Terminated,
}

impl CollectionState {
    fn as_str(&self) -> &'static str {
        match self {
            CollectionState::Init => "INIT",
            CollectionState::BootTime => "BOOT_TIME",
            CollectionState::Periodic => "PERIODIC",
            CollectionState::Custom => "CUSTOM",
            CollectionState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PerfConfig {
    pub boottime_interval: Duration,
    pub periodic_interval: Duration,
    pub periodic_monitor_interval: Duration,
    /// Defaults for operator-driven custom collections.
    pub custom_interval: Duration,
    pub custom_max_duration: Duration,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            boottime_interval: Duration::from_secs(1),
            periodic_interval: Duration::from_secs(10),
            periodic_monitor_interval: Duration::from_secs(2),
            custom_interval: Duration::from_secs(10),
            custom_max_duration: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CustomMetadata {
    interval: Duration,
    filter_packages: HashSet<String>,
}

pub struct PerfSources {
    pub uid_stats: Box<dyn UidStatsSource>,
    pub proc_stat: Box<dyn ProcStatSource>,
    pub disk_stats: Box<dyn DiskStatsSource>,
}

struct PerfInner {
    state: CollectionState,
    started: bool,
    processors: Vec<Box<dyn DataProcessor>>,
    sources: PerfSources,
    custom: Option<CustomMetadata>,
}

pub struct PerfService<C: Clock> {
    clock: C,
    config: PerfConfig,
    scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
    tx: mpsc::UnboundedSender<WatchdogMessage>,
    inner: Mutex<PerfInner>,
}

impl<C: Clock> PerfService<C> {
    pub fn new(
        config: PerfConfig,
        sources: PerfSources,
        processors: Vec<Box<dyn DataProcessor>>,
        scheduler: Arc<Mutex<Scheduler<WatchdogMessage>>>,
        tx: mpsc::UnboundedSender<WatchdogMessage>,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            config,
            scheduler,
            tx,
            inner: Mutex::new(PerfInner {
                state: CollectionState::Init,
                started: false,
                processors,
                sources,
                custom: None,
            }),
        })
    }

    /// Start collection: validates intervals, starts processors, and posts
    /// the first boot-time collection. One-shot.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.started || inner.state != CollectionState::Init {
            return Err(ServiceError::illegal_state(
                "cannot start performance collection more than once",
            ));
        }
        if self.config.boottime_interval < MIN_COLLECTION_INTERVAL
            || self.config.periodic_interval < MIN_COLLECTION_INTERVAL
        {
            inner.state = CollectionState::Terminated;
            return Err(ServiceError::invalid_argument(format!(
                "collection intervals cannot be less than {} second",
                MIN_COLLECTION_INTERVAL.as_secs()
            )));
        }
        let mut start_error = None;
        for processor in &mut inner.processors {
            if let Err(e) = processor.start() {
                start_error = Some((processor.name(), e));
                break;
            }
        }
        if let Some((name, e)) = start_error {
            tracing::error!(processor = name, error = %e, "terminating perf service");
            inner.state = CollectionState::Terminated;
            return Err(ServiceError::illegal_state(format!("failed to start {name}: {e}")));
        }
        inner.started = true;
        inner.state = CollectionState::BootTime;
        drop(inner);
        tracing::info!("starting boot-time performance data collection");
        if self.tx.send(WatchdogMessage::BootTimeCollection).is_err() {
            tracing::error!("dispatcher is not running; boot-time collection not scheduled");
        }
        Ok(())
    }

    pub fn state(&self) -> CollectionState {
        self.inner.lock().state
    }

    /// Dispatcher entry point for collection messages. A handler error
    /// terminates the service.
    pub fn handle_message(&self, message: &WatchdogMessage) {
        let result = match message {
            WatchdogMessage::BootTimeCollection => {
                self.process_collection(CollectionState::BootTime)
            }
            WatchdogMessage::EndBootTimeCollection => self.handle_end_boottime(),
            WatchdogMessage::PeriodicCollection => {
                self.process_collection(CollectionState::Periodic)
            }
            WatchdogMessage::PeriodicMonitor => self.handle_periodic_monitor(),
            WatchdogMessage::CustomCollection => self.process_collection(CollectionState::Custom),
            WatchdogMessage::EndCustomCollection => {
                self.auto_end_custom_collection();
                Ok(())
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "terminating performance collection");
            self.terminate();
        }
    }

    /// External boot-complete signal: one final boot-time collection, then
    /// the periodic phase.
    pub fn on_boot_finished(&self) -> Result<(), ServiceError> {
        let inner = self.inner.lock();
        if inner.state != CollectionState::BootTime {
            // Premature termination or a repeated boot-complete notification;
            // neither is worth failing the caller over.
            tracing::error!(state = %inner.state, "ignoring boot-finished notification");
            return Ok(());
        }
        drop(inner);
        self.scheduler.lock().cancel_timer(TIMER_PERF_BOOTTIME);
        if self.tx.send(WatchdogMessage::EndBootTimeCollection).is_err() {
            tracing::error!("dispatcher is not running; cannot end boot-time collection");
        }
        Ok(())
    }

    /// Out-of-band single collection after a wake-up. Does not change state.
    pub fn on_wake_up_collection(&self) -> Result<(), PerfError> {
        let mut inner = self.inner.lock();
        if inner.state == CollectionState::Terminated || inner.state == CollectionState::Init {
            return Ok(());
        }
        let now_ms = self.clock.epoch_ms();
        refresh_sources(&mut inner.sources)?;
        let PerfInner { processors, sources, .. } = &mut *inner;
        let uid_stats = sources.uid_stats.delta();
        let proc_stat = sources.proc_stat.delta();
        for processor in processors.iter_mut() {
            processor.on_wake_up_collection(now_ms, uid_stats, proc_stat)?;
        }
        Ok(())
    }

    /// Out-of-band user-switch collection. Does not change state.
    pub fn on_user_switch_collection(
        &self,
        from_user: i32,
        to_user: i32,
    ) -> Result<(), PerfError> {
        let mut inner = self.inner.lock();
        if inner.state == CollectionState::Terminated || inner.state == CollectionState::Init {
            return Ok(());
        }
        let now_ms = self.clock.epoch_ms();
        refresh_sources(&mut inner.sources)?;
        let PerfInner { processors, sources, .. } = &mut *inner;
        let uid_stats = sources.uid_stats.delta();
        let proc_stat = sources.proc_stat.delta();
        for processor in processors.iter_mut() {
            processor.on_user_switch_collection(now_ms, from_user, to_user, uid_stats, proc_stat)?;
        }
        Ok(())
    }

    // ---- custom collection ----

    /// Textual custom-collection command surface.
    pub fn on_custom_collection_command(
        &self,
        args: &[String],
        report: &mut String,
    ) -> Result<(), ServiceError> {
        match args.first().map(String::as_str) {
            Some(START_CUSTOM_COLLECTION_FLAG) => {
                let (interval, max_duration, filter_packages) =
                    self.parse_start_flags(&args[1..])?;
                self.start_custom_collection(interval, max_duration, filter_packages)
            }
            Some(END_CUSTOM_COLLECTION_FLAG) => {
                if args.len() != 1 {
                    tracing::warn!("extra arguments to stop custom collection are ignored");
                }
                self.end_custom_collection(report)
            }
            _ => Err(ServiceError::invalid_argument(format!(
                "custom collection arguments must start with {START_CUSTOM_COLLECTION_FLAG} or \
                 {END_CUSTOM_COLLECTION_FLAG}"
            ))),
        }
    }

    fn parse_start_flags(
        &self,
        args: &[String],
    ) -> Result<(Duration, Duration, HashSet<String>), ServiceError> {
        let mut interval = self.config.custom_interval;
        let mut max_duration = self.config.custom_max_duration;
        let mut filter_packages = HashSet::new();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                INTERVAL_FLAG => interval = parse_seconds_flag(INTERVAL_FLAG, iter.next())?,
                MAX_DURATION_FLAG => {
                    max_duration = parse_seconds_flag(MAX_DURATION_FLAG, iter.next())?
                }
                FILTER_PACKAGES_FLAG => {
                    let value = iter.next().ok_or_else(|| {
                        ServiceError::invalid_argument(format!(
                            "must provide value for {FILTER_PACKAGES_FLAG}"
                        ))
                    })?;
                    filter_packages =
                        value.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect();
                }
                unknown => {
                    return Err(ServiceError::invalid_argument(format!(
                        "unknown flag {unknown} provided to start custom collection"
                    )))
                }
            }
        }
        Ok((interval, max_duration, filter_packages))
    }

    pub fn start_custom_collection(
        &self,
        interval: Duration,
        max_duration: Duration,
        filter_packages: HashSet<String>,
    ) -> Result<(), ServiceError> {
        if interval < MIN_COLLECTION_INTERVAL || max_duration < MIN_COLLECTION_INTERVAL {
            return Err(ServiceError::invalid_argument(format!(
                "collection interval and maximum duration must be >= {} second",
                MIN_COLLECTION_INTERVAL.as_secs()
            )));
        }
        let mut inner = self.inner.lock();
        if inner.state != CollectionState::Periodic {
            return Err(ServiceError::illegal_state(format!(
                "cannot start a custom collection when the current collection event is {}",
                inner.state
            )));
        }
        inner.custom = Some(CustomMetadata { interval, filter_packages });
        inner.state = CollectionState::Custom;
        drop(inner);

        let mut scheduler = self.scheduler.lock();
        scheduler.cancel_timers_with_prefix(TIMER_PREFIX_PERF);
        scheduler.set_timer(
            TIMER_PERF_CUSTOM_END,
            WatchdogMessage::EndCustomCollection,
            max_duration,
            self.clock.now(),
        );
        drop(scheduler);
        tracing::info!("starting custom performance data collection");
        if self.tx.send(WatchdogMessage::CustomCollection).is_err() {
            tracing::error!("dispatcher is not running; custom collection not scheduled");
        }
        Ok(())
    }

    /// Operator-driven end: writes the report, clears caches, and returns to
    /// the periodic phase.
    pub fn end_custom_collection(&self, report: &mut String) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        if inner.state != CollectionState::Custom {
            return Err(ServiceError::illegal_state("no custom collection is running"));
        }
        self.write_collectors_status(&inner, report);
        if let Some(custom) = &inner.custom {
            let _ = writeln!(
                report,
                "Collection interval: {} second(s)",
                custom.interval.as_secs()
            );
            if !custom.filter_packages.is_empty() {
                let mut filtered: Vec<&str> =
                    custom.filter_packages.iter().map(String::as_str).collect();
                filtered.sort_unstable();
                let _ = writeln!(report, "Filtered results to packages: {}", filtered.join(", "));
            }
        }
        let PerfInner { processors, custom, state, .. } = &mut *inner;
        for processor in processors.iter_mut() {
            if let Err(e) = processor.on_custom_collection_dump(Some(report)) {
                tracing::warn!(processor = processor.name(), error = %e, "custom collection dump failed");
            }
        }
        *custom = None;
        *state = CollectionState::Periodic;
        drop(inner);
        self.resume_periodic();
        Ok(())
    }

    /// Max-duration expiry: discard the collected data and return to the
    /// periodic phase.
    fn auto_end_custom_collection(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CollectionState::Custom {
            tracing::warn!(state = %inner.state, "skipping end-custom message");
            return;
        }
        tracing::info!("custom collection reached max duration; discarding data");
        let PerfInner { processors, custom, state, .. } = &mut *inner;
        for processor in processors.iter_mut() {
            if let Err(e) = processor.on_custom_collection_dump(None) {
                tracing::warn!(processor = processor.name(), error = %e, "custom collection clear failed");
            }
        }
        *custom = None;
        *state = CollectionState::Periodic;
        drop(inner);
        self.resume_periodic();
    }

    fn resume_periodic(&self) {
        let mut scheduler = self.scheduler.lock();
        scheduler.cancel_timers_with_prefix(TIMER_PREFIX_PERF);
        drop(scheduler);
        tracing::info!("switching to periodic performance data collection");
        if self.tx.send(WatchdogMessage::PeriodicCollection).is_err() {
            tracing::error!("dispatcher is not running; periodic collection not scheduled");
        }
        self.arm_monitor_timer();
    }

    // ---- dispatcher handlers ----

    fn process_collection(&self, event: CollectionState) -> Result<(), PerfError> {
        let mut inner = self.inner.lock();
        // A message from the previous collection event may land after the
        // transition; verify before collecting.
        if inner.state != event {
            tracing::warn!(event = %event, state = %inner.state, "skipping stale collection message");
            return Ok(());
        }
        let interval = match event {
            CollectionState::BootTime => self.config.boottime_interval,
            CollectionState::Periodic => self.config.periodic_interval,
            CollectionState::Custom => inner
                .custom
                .as_ref()
                .map(|c| c.interval)
                .unwrap_or(self.config.custom_interval),
            _ => return Ok(()),
        };
        if interval < MIN_COLLECTION_INTERVAL {
            return Err(PerfError::Processor(format!(
                "collection interval of {:?} for {event} collection cannot be less than {:?}",
                interval, MIN_COLLECTION_INTERVAL
            )));
        }
        self.collect_locked(&mut inner, event)?;
        drop(inner);

        let (timer_id, message) = match event {
            CollectionState::BootTime => (TIMER_PERF_BOOTTIME, WatchdogMessage::BootTimeCollection),
            CollectionState::Periodic => (TIMER_PERF_PERIODIC, WatchdogMessage::PeriodicCollection),
            _ => (TIMER_PERF_CUSTOM, WatchdogMessage::CustomCollection),
        };
        self.scheduler.lock().set_timer(timer_id, message, interval, self.clock.now());
        if event == CollectionState::Periodic
            && !self.scheduler.lock().is_scheduled(TIMER_PERF_MONITOR)
        {
            self.arm_monitor_timer();
        }
        Ok(())
    }

    fn collect_locked(
        &self,
        inner: &mut PerfInner,
        event: CollectionState,
    ) -> Result<(), PerfError> {
        refresh_sources(&mut inner.sources)?;
        let now_ms = self.clock.epoch_ms();
        let PerfInner { processors, sources, custom, .. } = &mut *inner;
        let uid_stats = sources.uid_stats.delta();
        let proc_stat = sources.proc_stat.delta();
        for processor in processors.iter_mut() {
            let result = match event {
                CollectionState::BootTime => {
                    processor.on_boottime_collection(now_ms, uid_stats, proc_stat)
                }
                CollectionState::Periodic => {
                    processor.on_periodic_collection(now_ms, uid_stats, proc_stat)
                }
                CollectionState::Custom => {
                    let empty = HashSet::new();
                    let filter =
                        custom.as_ref().map(|c| &c.filter_packages).unwrap_or(&empty);
                    processor.on_custom_collection(now_ms, filter, uid_stats, proc_stat)
                }
                _ => Ok(()),
            };
            result.map_err(|e| {
                PerfError::Processor(format!(
                    "{} failed on {event} collection: {e}",
                    processor.name()
                ))
            })?;
        }
        Ok(())
    }

    fn handle_end_boottime(&self) -> Result<(), PerfError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != CollectionState::BootTime {
                tracing::warn!(state = %inner.state, "skipping end-boot-time message");
                return Ok(());
            }
            // One final boot-time collection before switching.
            self.collect_locked(&mut inner, CollectionState::BootTime)?;
            inner.state = CollectionState::Periodic;
        }
        let mut scheduler = self.scheduler.lock();
        scheduler.cancel_timers_with_prefix(TIMER_PREFIX_PERF);
        scheduler.set_timer(
            TIMER_PERF_PERIODIC,
            WatchdogMessage::PeriodicCollection,
            self.config.periodic_interval,
            self.clock.now(),
        );
        drop(scheduler);
        self.arm_monitor_timer();
        tracing::info!("switching to periodic performance data collection");
        Ok(())
    }

    fn handle_periodic_monitor(&self) -> Result<(), PerfError> {
        let mut inner = self.inner.lock();
        if inner.state != CollectionState::Periodic && inner.state != CollectionState::Custom {
            return Ok(());
        }
        if !inner.sources.disk_stats.enabled() {
            drop(inner);
            self.arm_monitor_timer();
            return Ok(());
        }
        inner.sources.disk_stats.refresh()?;
        let now_ms = self.clock.epoch_ms();
        let PerfInner { processors, sources, .. } = &mut *inner;
        let disk_stats = sources.disk_stats.delta();
        for processor in processors.iter_mut() {
            processor.on_periodic_monitor(now_ms, disk_stats)?;
        }
        drop(inner);
        self.arm_monitor_timer();
        Ok(())
    }

    fn arm_monitor_timer(&self) {
        self.scheduler.lock().set_timer(
            TIMER_PERF_MONITOR,
            WatchdogMessage::PeriodicMonitor,
            self.config.periodic_monitor_interval,
            self.clock.now(),
        );
    }

    // ---- dump ----

    fn write_collectors_status(&self, inner: &PerfInner, report: &mut String) {
        if !inner.sources.uid_stats.enabled() {
            let _ = writeln!(report, "UID stats collector failed to access its source");
        }
        if !inner.sources.proc_stat.enabled() {
            let _ = writeln!(report, "Proc stat collector failed to access its source");
        }
    }

    pub fn dump(&self, report: &mut String) {
        let inner = self.inner.lock();
        if inner.state == CollectionState::Terminated {
            let _ = writeln!(report, "Performance collection not active. Dumping cached data.");
        }
        self.write_collectors_status(&inner, report);
        let _ = writeln!(report, "Boot-time collection interval: {:?}", self.config.boottime_interval);
        let _ = writeln!(report, "Periodic collection interval: {:?}", self.config.periodic_interval);
        for processor in &inner.processors {
            report.push_str(&processor.on_dump());
        }
    }

    pub fn dump_structured(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        let processors: Vec<serde_json::Value> =
            inner.processors.iter().map(|p| p.on_dump_structured()).collect();
        serde_json::json!({
            "boot_time_interval_ms": self.config.boottime_interval.as_millis() as u64,
            "periodic_interval_ms": self.config.periodic_interval.as_millis() as u64,
            "processors": processors,
        })
    }

    pub fn help_text(&self) -> String {
        format!(
            "Performance data collection options:\n\
             {START_CUSTOM_COLLECTION_FLAG}: starts custom performance data collection\n\
             \t{INTERVAL_FLAG} <seconds>: collection interval (default {}s)\n\
             \t{MAX_DURATION_FLAG} <seconds>: maximum collection duration (default {}s)\n\
             \t{FILTER_PACKAGES_FLAG} <package>,<package>,...: filter results to the given packages\n\
             {END_CUSTOM_COLLECTION_FLAG}: stops custom collection and generates a report\n",
            self.config.custom_interval.as_secs(),
            self.config.custom_max_duration.as_secs(),
        )
    }

    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CollectionState::Terminated {
            return;
        }
        tracing::info!("terminating performance collection service");
        for processor in &mut inner.processors {
            processor.terminate();
        }
        inner.state = CollectionState::Terminated;
        drop(inner);
        self.scheduler.lock().cancel_timers_with_prefix(TIMER_PREFIX_PERF);
    }
}

fn refresh_sources(sources: &mut PerfSources) -> Result<(), PerfError> {
    if !sources.uid_stats.enabled() && !sources.proc_stat.enabled() {
        return Err(PerfError::Processor("no collectors enabled".to_string()));
    }
    if sources.uid_stats.enabled() {
        sources.uid_stats.refresh()?;
    }
    if sources.proc_stat.enabled() {
        sources.proc_stat.refresh()?;
    }
    Ok(())
}

fn parse_seconds_flag(flag: &str, value: Option<&String>) -> Result<Duration, ServiceError> {
    let value = value
        .ok_or_else(|| ServiceError::invalid_argument(format!("value not provided for {flag}")))?;
    let seconds: u64 = value.parse().map_err(|_| {
        ServiceError::invalid_argument(format!("invalid value {value} for {flag}, must be an integer"))
    })?;
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
