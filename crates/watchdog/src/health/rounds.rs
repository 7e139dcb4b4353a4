// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health-check ping rounds.
//!
//! A round drains the previous round's unanswered pings (escalating those
//! clients), then pings every registered client on the track with a fresh
//! session id. Rounds for one track are serial: the next round's timer is
//! armed only after this round's pings are all sent.

use super::{find_client, ProcessHealthService};
use crate::client::ClientInfo;
use axle_core::{Clock, ProcessIdentifier, ServiceError, TimeoutTrack};
use crate::message::{health_timer_id, WatchdogMessage};

impl<C: Clock + 'static> ProcessHealthService<C> {
    /// One round for `track`; runs on the dispatcher.
    pub fn do_health_check(&self, track: TimeoutTrack) {
        if !self.inner.lock().enabled {
            return;
        }
        if let Err(e) = self.dump_and_kill_clients_if_not_responding(track) {
            tracing::warn!(%track, error = %e, "failed to escalate unresponsive clients");
        }

        // Ping against a local snapshot. A client unregistering concurrently
        // may still receive this round's ping; clients handle that.
        let clients_to_check: Vec<ClientInfo> = {
            let mut inner = self.inner.lock();
            let mut to_check = Vec::new();
            let client_handles: Vec<u64> = inner
                .clients
                .get(&track)
                .map(|clients| clients.keys().copied().collect())
                .unwrap_or_default();
            for handle in client_handles {
                let stopped = {
                    let Some(info) = inner.clients.get(&track).and_then(|c| c.get(&handle))
                    else {
                        continue;
                    };
                    inner.stopped_users.contains(&info.user_id)
                };
                if stopped {
                    continue;
                }
                let session_id = Self::new_session_id_locked(&mut inner);
                let Some(info) = inner
                    .clients
                    .get_mut(&track)
                    .and_then(|clients| clients.get_mut(&handle))
                else {
                    continue;
                };
                info.session_id = session_id;
                let info = info.clone();
                if let Some(pinged) = inner.pinged.get_mut(&track) {
                    pinged.insert(session_id, info.clone());
                }
                to_check.push(info);
            }
            to_check
        };

        for info in &clients_to_check {
            if let Err(e) = info.client.check_if_alive(info.session_id, track) {
                tracing::warn!(pid = info.pid, error = %e, "sending a ping message to client failed");
                let mut inner = self.inner.lock();
                if let Some(pinged) = inner.pinged.get_mut(&track) {
                    pinged.remove(&info.session_id);
                }
            }
        }

        if !clients_to_check.is_empty() {
            self.scheduler.lock().set_timer(
                health_timer_id(track),
                WatchdogMessage::HealthCheck(track),
                self.timeout_for(track),
                self.clock.now(),
            );
        }
    }

    /// Clients still in the pinged map missed their deadline: remove them
    /// from the registry and escalate.
    fn dump_and_kill_clients_if_not_responding(
        &self,
        track: TimeoutTrack,
    ) -> Result<(), ServiceError> {
        let mut processes = Vec::new();
        let mut clients_to_notify = Vec::new();
        {
            let mut inner = self.inner.lock();
            let pinged: Vec<ClientInfo> = inner
                .pinged
                .get_mut(&track)
                .map(|pinged| pinged.drain().map(|(_, info)| info).collect())
                .unwrap_or_default();
            for info in pinged {
                let handle = info.client.handle();
                let Some((_, cached)) = find_client(&inner.clients, handle) else { continue };
                if let Some(clients) = inner.clients.get_mut(&track) {
                    clients.shift_remove(&handle.raw());
                }
                if inner.stopped_users.contains(&cached.user_id) {
                    continue;
                }
                clients_to_notify.push(info);
                processes.push(cached.process_identifier());
            }
        }
        for info in &clients_to_notify {
            if let Err(e) = info.client.prepare_process_termination() {
                tracing::warn!(pid = info.pid, error = %e, "prepare_process_termination failed");
            }
        }
        self.dump_and_kill_all(&processes, true)
    }

    /// Route unresponsive processes to the monitor, optionally reporting each
    /// terminated process's command line to the VHAL first.
    pub(crate) fn dump_and_kill_all(
        &self,
        processes: &[ProcessIdentifier],
        report_to_vhal: bool,
    ) -> Result<(), ServiceError> {
        if processes.is_empty() {
            return Ok(());
        }
        let pids: Vec<i32> = processes.iter().map(|p| p.pid).collect();
        let monitor = {
            let inner = self.inner.lock();
            match &inner.monitor {
                Some(monitor) => std::sync::Arc::clone(monitor),
                None => {
                    tracing::warn!(
                        ?pids,
                        "failed to dump and kill processes: monitor is not set"
                    );
                    return Err(ServiceError::illegal_state("monitor is not set"));
                }
            }
        };
        if self.shutdown.is_shutting_down() {
            tracing::info!(?pids, "skip dumping and killing processes: the system is shutting down");
            return Ok(());
        }
        if report_to_vhal {
            self.report_terminated_processes(processes);
        }
        if let Err(e) = monitor.on_clients_not_responding(processes) {
            tracing::warn!(?pids, error = %e, "monitor escalation failed");
        }
        Ok(())
    }
}
