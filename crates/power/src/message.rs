// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher messages for the power daemon.

/// Timer id for the VHAL connect retry.
pub const TIMER_CONNECT_VHAL: &str = "vhal:connect";

/// Messages handled on the power daemon's dispatcher task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerMessage {
    /// Attempt one VHAL connection (initial or retry).
    ConnectVhal,
    /// Serialized async policy-apply request from the delegate.
    HandleApplyAsync { request_id: i32, policy_id: String, force: bool },
}
