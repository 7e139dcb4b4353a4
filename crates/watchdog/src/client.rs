// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health-check client and monitor callback contracts.

use axle_core::{Handle, ProcessIdentifier, ServiceError, TimeoutTrack};
use std::sync::Arc;

/// A registered health-check client. Regular clients and the framework
/// service client answer the same ping contract.
pub trait HealthCheckClient: Send + Sync {
    fn handle(&self) -> Handle;

    /// Ping. The client answers through `tell_client_alive` (or the
    /// framework-service variant) with the same session id.
    fn check_if_alive(&self, session_id: i32, track: TimeoutTrack) -> Result<(), ServiceError>;

    /// Last call before the process is reported to the monitor.
    fn prepare_process_termination(&self) -> Result<(), ServiceError>;
}

/// Receives escalations for unresponsive processes.
pub trait WatchdogMonitor: Send + Sync {
    fn handle(&self) -> Handle;

    fn on_clients_not_responding(
        &self,
        clients: &[ProcessIdentifier],
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Regular,
    FrameworkService,
}

impl ClientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Regular => "regular",
            ClientKind::FrameworkService => "watchdog service",
        }
    }
}

/// Registry entry for one health-check client.
#[derive(Clone)]
pub struct ClientInfo {
    pub client: Arc<dyn HealthCheckClient>,
    pub kind: ClientKind,
    pub pid: i32,
    pub uid: u32,
    pub user_id: i32,
    pub start_time_ms: u64,
    pub session_id: i32,
}

impl ClientInfo {
    pub fn process_identifier(&self) -> ProcessIdentifier {
        ProcessIdentifier { pid: self.pid, start_time_ms: self.start_time_ms }
    }

    pub fn describe(&self) -> String {
        format!(
            "pid = {}, userId = {}, type = {}",
            self.pid,
            self.user_id,
            self.kind.as_str()
        )
    }
}
