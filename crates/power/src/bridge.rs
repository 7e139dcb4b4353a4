// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Power-side VHAL bridge.
//!
//! Connection attempts run on the dispatcher: the first attempt is posted at
//! startup, failures re-arm a 200 ms retry timer up to 25 attempts, and a
//! death callback resets the handle and restarts the loop. On the first
//! successful connect the initial policy is applied; on reconnects the
//! current policy id is re-announced to the VHAL.

use crate::coordinator::PolicyCoordinator;
use crate::message::{PowerMessage, TIMER_CONNECT_VHAL};
use axle_core::{Clock, PowerState, Scheduler, POLICY_ID_INITIAL_ON};
use axle_adapters::vhal::{PropValue, VhalConnector, VhalListener, VhalProperty};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
pub const MAX_CONNECT_ATTEMPTS: u32 = 25;

struct BridgeInner {
    remaining_attempts: u32,
    first_connection: bool,
}

pub struct VhalBridge<C: Clock> {
    connector: Arc<dyn VhalConnector>,
    coordinator: Arc<PolicyCoordinator<C>>,
    scheduler: Arc<Mutex<Scheduler<PowerMessage>>>,
    tx: mpsc::UnboundedSender<PowerMessage>,
    clock: C,
    inner: Mutex<BridgeInner>,
}

impl<C: Clock + 'static> VhalBridge<C> {
    pub fn new(
        connector: Arc<dyn VhalConnector>,
        coordinator: Arc<PolicyCoordinator<C>>,
        scheduler: Arc<Mutex<Scheduler<PowerMessage>>>,
        tx: mpsc::UnboundedSender<PowerMessage>,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            coordinator,
            scheduler,
            tx,
            clock,
            inner: Mutex::new(BridgeInner {
                remaining_attempts: MAX_CONNECT_ATTEMPTS,
                first_connection: true,
            }),
        })
    }

    /// Post the first connection attempt onto the dispatcher.
    pub fn start(&self) {
        self.inner.lock().remaining_attempts = MAX_CONNECT_ATTEMPTS;
        if self.tx.send(PowerMessage::ConnectVhal).is_err() {
            tracing::error!("dispatcher is not running; cannot connect to VHAL");
        }
    }

    /// One connection attempt; runs on the dispatcher.
    pub fn connect_once(self: &Arc<Self>) {
        if self.coordinator.has_vhal() {
            return;
        }
        let client = match self.connector.connect() {
            Ok(client) => client,
            Err(e) => {
                let remaining = {
                    let mut inner = self.inner.lock();
                    inner.remaining_attempts = inner.remaining_attempts.saturating_sub(1);
                    inner.remaining_attempts
                };
                if remaining == 0 {
                    tracing::error!(
                        attempts = MAX_CONNECT_ATTEMPTS,
                        error = %e,
                        "failed to connect to VHAL; gave up"
                    );
                    return;
                }
                tracing::warn!(
                    retry_ms = CONNECT_RETRY_INTERVAL.as_millis() as u64,
                    error = %e,
                    "failed to connect to VHAL; retrying"
                );
                self.scheduler.lock().set_timer(
                    TIMER_CONNECT_VHAL,
                    PowerMessage::ConnectVhal,
                    CONNECT_RETRY_INTERVAL,
                    self.clock.now(),
                );
                return;
            }
        };

        let bridge = Arc::downgrade(self);
        client.add_death_callback(Arc::new(move || {
            if let Some(bridge) = bridge.upgrade() {
                bridge.handle_vhal_death();
            }
        }));

        self.coordinator.set_vhal(Arc::clone(&client));

        let first_connection = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.first_connection)
        };
        if first_connection {
            self.apply_initial_policy();
        } else {
            let current = self.coordinator.current_policy_id();
            if !current.is_empty() {
                self.coordinator.notify_vhal_current_policy(&current);
            }
        }

        let listener: Arc<dyn VhalListener> =
            Arc::new(BridgeListener(Arc::clone(&self.coordinator)));
        if let Err(e) = client.subscribe(
            &[VhalProperty::PowerPolicyReq, VhalProperty::PowerPolicyGroupReq],
            listener,
        ) {
            tracing::warn!(error = %e, "failed to subscribe to power policy properties");
        }
        tracing::info!("connected to VHAL");
    }

    /// Initial policy: the pending id if set, else the group default for
    /// WaitForVHAL, else `initial_on`.
    fn apply_initial_policy(&self) {
        if self.coordinator.has_taken_over() {
            tracing::info!("skipping initial power policy; CarService is running");
            return;
        }
        let mut policy_id = self.coordinator.pending_policy_id();
        if policy_id.is_empty() {
            let group_id = self.coordinator.policy_group_id();
            policy_id = self
                .coordinator
                .default_policy_for_state(&group_id, PowerState::WaitForVhal)
                .unwrap_or_else(|| POLICY_ID_INITIAL_ON.to_string());
        }
        if let Err(e) = self.coordinator.apply_regular_policy(&policy_id, false) {
            tracing::warn!(policy = %policy_id, error = %e, "cannot apply the initial power policy");
            return;
        }
        tracing::debug!(policy = %policy_id, "initial power policy applied");
    }

    fn handle_vhal_death(&self) {
        tracing::warn!("VHAL died; reconnecting");
        self.coordinator.clear_vhal();
        self.inner.lock().remaining_attempts = MAX_CONNECT_ATTEMPTS;
        if self.tx.send(PowerMessage::ConnectVhal).is_err() {
            tracing::error!("dispatcher is not running; cannot reconnect to VHAL");
        }
    }
}

struct BridgeListener<C: Clock>(Arc<PolicyCoordinator<C>>);

impl<C: Clock + 'static> VhalListener for BridgeListener<C> {
    fn on_property_event(&self, values: &[PropValue]) {
        for value in values {
            match value.prop {
                VhalProperty::PowerPolicyReq if !value.string.is_empty() => {
                    if let Err(e) = self.0.apply_regular_policy(&value.string, false) {
                        tracing::warn!(policy = %value.string, error = %e, "failed to apply requested power policy");
                    }
                }
                VhalProperty::PowerPolicyGroupReq if !value.string.is_empty() => {
                    if let Err(e) = self.0.set_power_policy_group_internal(&value.string) {
                        tracing::warn!(group = %value.string, error = %e, "failed to set requested power policy group");
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
