// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by both daemons.
//!
//! The first four variants map one-to-one onto the RPC exception codes of the
//! transport (`EX_ILLEGAL_ARGUMENT`, `EX_ILLEGAL_STATE`, `EX_SECURITY`,
//! `EX_UNSUPPORTED_OPERATION`). `NotFound` and `Transient` never cross the
//! RPC boundary: lookups convert `NotFound` into the caller-appropriate kind
//! and `Transient` failures are logged and retried or skipped.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("security exception: {0}")]
    Security(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ServiceError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        ServiceError::IllegalState(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        ServiceError::Security(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        ServiceError::Unsupported(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        ServiceError::Transient(msg.into())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
