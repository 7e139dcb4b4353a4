// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Policy coordinator: serializes every policy-change decision.
//!
//! One mutex guards the applied/pending/locked state, the observer registry,
//! the delegate, and the VHAL handle. The decision procedure runs under the
//! lock; fan-out (component state, delegate, VHAL mirror, observers) runs
//! against a snapshot with no lock held, so a slow callback can never stall
//! the next decision.

use crate::catalog::{CatalogError, PolicyCatalog, VendorCatalog};
use crate::component_state::ComponentState;
use crate::message::PowerMessage;
use crate::observer::{ObserverEntry, ObserverRegistry, PolicyObserver};
use crate::silent::SilentModeSink;
use axle_core::{
    CallerContext, Clock, Handle, PolicyMeta, PowerComponent, PowerPolicy, ServiceError,
    POLICY_ID_NO_USER_INTERACTION,
};
use axle_adapters::death::{DeathRecipient, DeathRegistry};
use axle_adapters::vhal::{PropValue, VhalClient, VhalProperty};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Framework-side callback surface for the post-refactor policy path.
pub trait PolicyDelegate: Send + Sync {
    fn handle(&self) -> Handle;

    /// Called with the applied policy before observers are notified so the
    /// framework can actuate component state.
    fn update_power_components(&self, policy: &PowerPolicy) -> Result<(), ServiceError>;

    fn on_power_policy_changed(&self, accumulated: &PowerPolicy) -> Result<(), ServiceError>;

    fn on_apply_power_policy_succeeded(
        &self,
        request_id: i32,
        accumulated: &PowerPolicy,
    ) -> Result<(), ServiceError>;

    fn on_apply_power_policy_failed(
        &self,
        request_id: i32,
        reason: &str,
    ) -> Result<(), ServiceError>;
}

/// Snapshot returned by the takeover handshake.
#[derive(Clone)]
pub struct PolicyState {
    pub policy_id: String,
    pub policy_group_id: String,
    pub registered_policies: Vec<Arc<PowerPolicy>>,
    pub custom_components: Vec<i32>,
}

struct Inner {
    current: Option<PolicyMeta>,
    pending_policy_id: String,
    is_locked: bool,
    car_service_took_over: bool,
    policy_group_id: String,
    last_apply_uptime_ms: u64,
    last_group_set_uptime_ms: u64,
    vhal: Option<Arc<dyn VhalClient>>,
    observers: ObserverRegistry,
    delegate: Option<Arc<dyn PolicyDelegate>>,
    pending_requests: HashSet<i32>,
    silent_mode: bool,
}

struct FanoutSnapshot {
    observers: Vec<(Arc<dyn PolicyObserver>, Vec<PowerComponent>)>,
    delegate: Option<Arc<dyn PolicyDelegate>>,
    vhal: Option<Arc<dyn VhalClient>>,
}

pub struct PolicyCoordinator<C: Clock> {
    clock: C,
    policy_refactoring: bool,
    catalog: Mutex<PolicyCatalog>,
    component_state: Mutex<ComponentState>,
    death_registry: Arc<dyn DeathRegistry>,
    tx: mpsc::UnboundedSender<PowerMessage>,
    inner: Mutex<Inner>,
}

impl<C: Clock + 'static> PolicyCoordinator<C> {
    pub fn new(
        clock: C,
        policy_refactoring: bool,
        death_registry: Arc<dyn DeathRegistry>,
        tx: mpsc::UnboundedSender<PowerMessage>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            policy_refactoring,
            catalog: Mutex::new(PolicyCatalog::new()),
            component_state: Mutex::new(ComponentState::new()),
            death_registry,
            tx,
            inner: Mutex::new(Inner {
                current: None,
                pending_policy_id: String::new(),
                is_locked: false,
                car_service_took_over: false,
                policy_group_id: String::new(),
                last_apply_uptime_ms: 0,
                last_group_set_uptime_ms: 0,
                vhal: None,
                observers: ObserverRegistry::new(),
                delegate: None,
                pending_requests: HashSet::new(),
                silent_mode: false,
            }),
        })
    }

    pub fn load_vendor_catalog(&self, catalog: &VendorCatalog) {
        self.catalog.lock().load_vendor_catalog(catalog);
    }

    // ---- public query surface ----

    pub fn get_current_power_policy(&self) -> Result<PowerPolicy, ServiceError> {
        let inner = self.inner.lock();
        inner
            .current
            .as_ref()
            .map(|meta| PowerPolicy::clone(&meta.policy))
            .ok_or_else(|| ServiceError::illegal_state("the current power policy is not set"))
    }

    pub fn get_power_component_state(&self, component: PowerComponent) -> bool {
        self.component_state.lock().state(component)
    }

    pub fn get_custom_component_state(&self, id: i32) -> Result<bool, ServiceError> {
        self.component_state.lock().custom_state(id)
    }

    pub fn accumulated_policy(&self) -> PowerPolicy {
        self.component_state.lock().accumulated()
    }

    pub fn is_policy_applied(&self) -> bool {
        self.inner.lock().current.is_some()
    }

    pub fn current_policy_id(&self) -> String {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|meta| meta.id().to_string())
            .unwrap_or_default()
    }

    pub fn pending_policy_id(&self) -> String {
        self.inner.lock().pending_policy_id.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().is_locked
    }

    pub fn has_taken_over(&self) -> bool {
        self.inner.lock().car_service_took_over
    }

    // ---- observer registration ----

    pub fn register_power_policy_change_observer(
        self: &Arc<Self>,
        observer: Arc<dyn PolicyObserver>,
        filter: Vec<PowerComponent>,
        caller: CallerContext,
    ) -> Result<(), ServiceError> {
        let handle = observer.handle();
        let mut inner = self.inner.lock();
        if inner.observers.is_registered(handle) {
            return Err(ServiceError::invalid_argument(format!(
                "the callback(pid: {}, uid: {}) is already registered",
                caller.pid, caller.uid
            )));
        }
        self.death_registry
            .link(handle, self.death_recipient())
            .map_err(|_| {
                ServiceError::illegal_state(format!(
                    "the given callback(pid: {}, uid: {}) is dead",
                    caller.pid, caller.uid
                ))
            })?;
        inner.observers.register(ObserverEntry { observer, filter, pid: caller.pid })
    }

    pub fn unregister_power_policy_change_observer(
        &self,
        handle: Handle,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock();
        inner.observers.unregister(handle)?;
        self.death_registry.unlink(handle);
        Ok(())
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    // ---- policy application channels ----

    /// Non-system apply surface; gated by the refactoring feature flag.
    pub fn apply_power_policy(&self, policy_id: &str) -> Result<(), ServiceError> {
        if !self.policy_refactoring {
            return Err(ServiceError::unsupported(
                "applyPowerPolicy requires the policy refactoring flag",
            ));
        }
        self.apply_policy_unchecked(policy_id, false, true)
    }

    /// Non-system group surface; gated by the refactoring feature flag.
    pub fn set_power_policy_group(&self, group_id: &str) -> Result<(), ServiceError> {
        if !self.policy_refactoring {
            return Err(ServiceError::unsupported(
                "setPowerPolicyGroup requires the policy refactoring flag",
            ));
        }
        self.set_power_policy_group_internal(group_id)
    }

    /// Pre-takeover channel used by VHAL property events and silent mode.
    pub fn apply_regular_policy(&self, policy_id: &str, force: bool) -> Result<(), ServiceError> {
        self.apply_policy(policy_id, false, force, false)
    }

    /// Framework notification channel (pre-refactor path, post-takeover).
    pub fn notify_power_policy_change(
        &self,
        caller: CallerContext,
        policy_id: &str,
        force: bool,
    ) -> Result<(), ServiceError> {
        check_system_permission(caller)?;
        self.apply_policy(policy_id, true, force, false)
            .map_err(|e| ServiceError::illegal_state(format!(
                "failed to notify power policy change: {e}"
            )))
    }

    pub fn notify_power_policy_definition(
        &self,
        caller: CallerContext,
        policy_id: &str,
        enabled: &[String],
        disabled: &[String],
    ) -> Result<(), ServiceError> {
        check_system_permission(caller)?;
        self.catalog
            .lock()
            .define_policy(policy_id, enabled, disabled)
            .map_err(ServiceError::from)
    }

    /// Queue an async apply onto the dispatcher. Duplicate request ids are
    /// rejected synchronously.
    pub fn apply_power_policy_async(
        &self,
        caller: CallerContext,
        request_id: i32,
        policy_id: &str,
        force: bool,
    ) -> Result<(), ServiceError> {
        check_system_permission(caller)?;
        {
            let mut inner = self.inner.lock();
            if !inner.pending_requests.insert(request_id) {
                return Err(ServiceError::invalid_argument(format!(
                    "duplicated request ID({request_id})"
                )));
            }
        }
        tracing::info!(
            request_id,
            policy = policy_id,
            force,
            "queueing request for applying power policy"
        );
        let message = PowerMessage::HandleApplyAsync {
            request_id,
            policy_id: policy_id.to_string(),
            force,
        };
        if self.tx.send(message).is_err() {
            self.inner.lock().pending_requests.remove(&request_id);
            return Err(ServiceError::illegal_state("dispatcher is not running"));
        }
        Ok(())
    }

    /// Dispatcher-side handler for a queued async apply.
    pub fn handle_apply_async(&self, request_id: i32, policy_id: &str, force: bool) {
        let delegate = {
            let mut inner = self.inner.lock();
            inner.pending_requests.remove(&request_id);
            inner.delegate.clone()
        };
        if delegate.is_none() {
            tracing::warn!(request_id, "power policy delegate callback is not set");
        }
        match self.apply_policy_unchecked(policy_id, force, false) {
            Ok(()) => {
                if let Some(delegate) = delegate {
                    let accumulated = self.accumulated_policy();
                    if let Err(e) =
                        delegate.on_apply_power_policy_succeeded(request_id, &accumulated)
                    {
                        tracing::warn!(request_id, error = %e, "failed to report apply success");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(request_id, error = %e, "async power policy apply failed");
                if let Some(delegate) = delegate {
                    let reason = e.to_string();
                    if let Err(e) = delegate.on_apply_power_policy_failed(request_id, &reason) {
                        tracing::warn!(request_id, error = %e, "failed to report apply failure");
                    }
                }
            }
        }
    }

    // ---- takeover handshake ----

    /// Mark the framework as the policy owner and return the current state.
    ///
    /// With a delegate, this is the post-refactor handshake; without one, the
    /// pre-refactor handshake. A repeated call returns the same snapshot
    /// semantics.
    pub fn take_over(
        self: &Arc<Self>,
        caller: CallerContext,
        delegate: Option<Arc<dyn PolicyDelegate>>,
    ) -> Result<PolicyState, ServiceError> {
        check_system_permission(caller)?;
        if let Some(delegate) = &delegate {
            self.death_registry
                .link(delegate.handle(), self.death_recipient())
                .map_err(|_| ServiceError::illegal_state("the delegate callback is dead"))?;
        }
        let (registered_policies, custom_components) = {
            let catalog = self.catalog.lock();
            (catalog.registered_policies(), catalog.custom_component_ids())
        };
        let mut inner = self.inner.lock();
        let state = PolicyState {
            policy_id: inner
                .current
                .as_ref()
                .map(|meta| meta.id().to_string())
                .unwrap_or_default(),
            policy_group_id: inner.policy_group_id.clone(),
            registered_policies,
            custom_components,
        };
        if delegate.is_some() {
            inner.delegate = delegate;
        }
        inner.car_service_took_over = true;
        tracing::info!("CarService is now responsible for power policy management");
        Ok(state)
    }

    // ---- policy group ----

    pub fn set_power_policy_group_internal(&self, group_id: &str) -> Result<(), ServiceError> {
        if !self.catalog.lock().is_group_available(group_id) {
            return Err(ServiceError::invalid_argument(format!(
                "power policy group({group_id}) is not available"
            )));
        }
        let mut inner = self.inner.lock();
        if inner.car_service_took_over {
            return Err(ServiceError::illegal_state(
                "after CarService starts serving, power policy group cannot be set in the daemon",
            ));
        }
        inner.policy_group_id = group_id.to_string();
        inner.last_group_set_uptime_ms = self.clock.uptime_ms();
        tracing::info!(group = group_id, "the current power policy group is set");
        Ok(())
    }

    pub fn policy_group_id(&self) -> String {
        self.inner.lock().policy_group_id.clone()
    }

    /// The group's default policy id for a vehicle power state, if any.
    pub fn default_policy_for_state(
        &self,
        group_id: &str,
        state: axle_core::PowerState,
    ) -> Option<String> {
        self.catalog
            .lock()
            .default_for_state(group_id, state)
            .ok()
            .map(|policy| policy.id.clone())
    }

    // ---- VHAL plumbing (driven by the bridge) ----

    pub fn set_vhal(&self, client: Arc<dyn VhalClient>) {
        self.inner.lock().vhal = Some(client);
    }

    pub fn clear_vhal(&self) {
        self.inner.lock().vhal = None;
    }

    pub fn has_vhal(&self) -> bool {
        self.inner.lock().vhal.is_some()
    }

    /// Mirror a policy id to the VHAL's current-policy property. Non-fatal.
    pub fn notify_vhal_current_policy(&self, policy_id: &str) {
        let vhal = self.inner.lock().vhal.clone();
        let Some(vhal) = vhal else {
            tracing::warn!(policy = policy_id, "VHAL is not connected; skipping policy mirror");
            return;
        };
        let value = PropValue::string_value(VhalProperty::CurrentPowerPolicy, policy_id);
        if let Err(e) = vhal.set_value(value) {
            tracing::warn!(policy = policy_id, error = %e, "failed to tell VHAL the new power policy");
        }
    }

    // ---- decision procedure & fan-out ----

    fn apply_policy(
        &self,
        policy_id: &str,
        car_service_expected: bool,
        force: bool,
        notify_delegate: bool,
    ) -> Result<(), ServiceError> {
        let meta = self.lookup_policy(policy_id)?;
        let snapshot = {
            let mut inner = self.inner.lock();
            if inner.car_service_took_over != car_service_expected {
                return Err(ServiceError::illegal_state(if inner.car_service_took_over {
                    "after CarService starts serving, power policy cannot be managed in the daemon"
                } else {
                    "before CarService starts serving, power policy cannot be applied from CarService"
                }));
            }
            match self.can_apply_locked(&mut inner, &meta, force) {
                Some(snapshot) => snapshot,
                None => return Ok(()),
            }
        };
        self.apply_and_notify(&meta, snapshot, notify_delegate);
        Ok(())
    }

    /// Apply without the takeover-channel check (async requests and the
    /// flag-gated public surface).
    fn apply_policy_unchecked(
        &self,
        policy_id: &str,
        force: bool,
        notify_delegate: bool,
    ) -> Result<(), ServiceError> {
        let meta = self.lookup_policy(policy_id)?;
        let snapshot = {
            let mut inner = self.inner.lock();
            match self.can_apply_locked(&mut inner, &meta, force) {
                Some(snapshot) => snapshot,
                None => return Ok(()),
            }
        };
        self.apply_and_notify(&meta, snapshot, notify_delegate);
        Ok(())
    }

    fn lookup_policy(&self, policy_id: &str) -> Result<PolicyMeta, ServiceError> {
        self.catalog.lock().get_policy(policy_id).map_err(|e| match e {
            CatalogError::PolicyNotFound(_) => {
                ServiceError::invalid_argument(format!("failed to apply power policy: {e}"))
            }
            other => ServiceError::from(other),
        })
    }

    /// The decision procedure. Returns the fan-out snapshot on proceed, None
    /// on skip. Mutates pending/locked state per the decision rules.
    fn can_apply_locked(
        &self,
        inner: &mut Inner,
        meta: &PolicyMeta,
        force: bool,
    ) -> Option<FanoutSnapshot> {
        let policy_id = meta.id();
        if inner.vhal.is_none() {
            tracing::info!(policy = policy_id, "queued; will be applied after VHAL gets ready");
            inner.pending_policy_id = policy_id.to_string();
            return None;
        }
        if let Some(current) = &inner.current {
            if current.id() == policy_id {
                tracing::info!(policy = policy_id, "skipped; already the current policy");
                return None;
            }
        }
        if meta.is_preemptive {
            if let Some(current) = &inner.current {
                if !current.is_preemptive {
                    inner.pending_policy_id = current.id().to_string();
                }
            }
            inner.is_locked = true;
        } else if force {
            inner.pending_policy_id.clear();
            inner.is_locked = false;
        } else if inner.is_locked {
            tracing::info!(policy = policy_id, "queued; will be applied after the policy unlocks");
            inner.pending_policy_id = policy_id.to_string();
            return None;
        }
        inner.current = Some(meta.clone());
        inner.last_apply_uptime_ms = self.clock.uptime_ms();
        Some(FanoutSnapshot {
            observers: inner.observers.snapshot(),
            delegate: inner.delegate.clone(),
            vhal: inner.vhal.clone(),
        })
    }

    fn apply_and_notify(&self, meta: &PolicyMeta, snapshot: FanoutSnapshot, notify_delegate: bool) {
        let policy = &meta.policy;
        let accumulated = {
            let mut component_state = self.component_state.lock();
            component_state.apply(policy);
            component_state.accumulated()
        };

        if let Some(delegate) = &snapshot.delegate {
            if let Err(e) = delegate.update_power_components(policy) {
                tracing::warn!(policy = %policy.id, error = %e, "delegate failed to update power components");
            }
        }

        if let Some(vhal) = &snapshot.vhal {
            let value = PropValue::string_value(VhalProperty::CurrentPowerPolicy, &policy.id);
            if let Err(e) = vhal.set_value(value) {
                tracing::warn!(policy = %policy.id, error = %e, "failed to tell VHAL the new power policy");
            }
        }

        for (observer, filter) in &snapshot.observers {
            if !filter_matches(filter, policy) {
                continue;
            }
            if let Err(e) = observer.on_policy_changed(&accumulated) {
                tracing::warn!(
                    observer = %observer.handle(),
                    error = %e,
                    "policy change notification failed"
                );
            }
        }

        if notify_delegate {
            if let Some(delegate) = &snapshot.delegate {
                if let Err(e) = delegate.on_power_policy_changed(&accumulated) {
                    tracing::warn!(policy = %policy.id, error = %e, "delegate policy change notification failed");
                }
            }
        }

        tracing::info!(policy = %policy.id, "the current power policy is applied");
    }

    fn death_recipient(self: &Arc<Self>) -> Arc<dyn DeathRecipient> {
        Arc::new(CoordinatorDeathRecipient(Arc::downgrade(self)))
    }

    fn handle_death(&self, handle: Handle) {
        let mut inner = self.inner.lock();
        if let Some(delegate) = &inner.delegate {
            if delegate.handle() == handle {
                tracing::warn!("power policy delegate died");
                inner.delegate = None;
                return;
            }
        }
        if inner.observers.remove(handle) {
            tracing::warn!(%handle, "policy change observer died");
        }
    }

    pub fn dump(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "POWER POLICY COORDINATOR");
        let _ = writeln!(
            out,
            "  Current policy: {}",
            inner.current.as_ref().map(|m| m.id()).unwrap_or("(not set)")
        );
        let _ = writeln!(out, "  Pending policy: {}", display_or_none(&inner.pending_policy_id));
        let _ = writeln!(out, "  Policy locked: {}", inner.is_locked);
        let _ = writeln!(out, "  Policy group: {}", display_or_none(&inner.policy_group_id));
        let _ = writeln!(out, "  CarService took over: {}", inner.car_service_took_over);
        let _ = writeln!(out, "  Registered observers: {}", inner.observers.len());
        let _ = writeln!(out, "  Silent mode: {}", inner.silent_mode);
        let _ = writeln!(out, "  Last policy apply uptime(ms): {}", inner.last_apply_uptime_ms);
        let _ = writeln!(out, "  Last group set uptime(ms): {}", inner.last_group_set_uptime_ms);
        drop(inner);
        out.push_str(&self.catalog.lock().dump());
        out
    }

    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        let snapshot = inner.observers.snapshot();
        for (observer, _) in snapshot {
            self.death_registry.unlink(observer.handle());
        }
        inner.observers = ObserverRegistry::new();
        if let Some(delegate) = inner.delegate.take() {
            self.death_registry.unlink(delegate.handle());
        }
        inner.vhal = None;
    }
}

impl<C: Clock + 'static> SilentModeSink for PolicyCoordinator<C> {
    fn on_silent_mode_changed(&self, silent: bool) {
        let pending = {
            let mut inner = self.inner.lock();
            if inner.car_service_took_over {
                return;
            }
            inner.silent_mode = silent;
            inner.pending_policy_id.clone()
        };
        tracing::info!(silent, "silent mode changed");
        let result = if silent {
            self.apply_regular_policy(POLICY_ID_NO_USER_INTERACTION, false)
        } else {
            self.apply_regular_policy(&pending, true)
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to apply power policy on silent mode change");
        }
    }
}

struct CoordinatorDeathRecipient<C: Clock>(Weak<PolicyCoordinator<C>>);

impl<C: Clock + 'static> DeathRecipient for CoordinatorDeathRecipient<C> {
    fn on_died(&self, handle: Handle) {
        if let Some(coordinator) = self.0.upgrade() {
            coordinator.handle_death(handle);
        }
    }
}

fn check_system_permission(caller: CallerContext) -> Result<(), ServiceError> {
    if !caller.is_system() {
        return Err(ServiceError::security(format!(
            "calling uid {} is not allowed to manage power policy",
            caller.uid
        )));
    }
    Ok(())
}

/// An empty filter receives every change; otherwise the change must name a
/// filtered component.
fn filter_matches(filter: &[PowerComponent], policy: &PowerPolicy) -> bool {
    if filter.is_empty() {
        return true;
    }
    filter
        .iter()
        .any(|c| policy.enabled.contains(c) || policy.disabled.contains(c))
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() {
        "(none)"
    } else {
        value
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
