//! The core's internal error taxonomy (spec.md §7), kept narrow so the
//! session/transaction state machines never leak `anyhow::Error` across
//! their API boundary — grounded in the `thiserror` usage throughout the
//! Pyxxilated-Studios `empath-*` SMTP crates.

use thiserror::Error;

use crate::smtp::transaction::TransactionState;

/// An operation attempted on a [`crate::smtp::transaction::Transaction`]
/// that is not legal in its current state. Per spec.md §4.2, such attempts
/// fail without any side effect — `history`/`mail`/`state` are left
/// untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation not legal while transaction is in state {state:?}")]
pub struct TransactionError {
    pub state: TransactionState,
}

/// Errors that can end a [`crate::smtp::session::Session`]'s serve loop.
///
/// Only the `Bug` variant represents a programmer error; every other
/// variant is a recoverable condition the session maps to a client-visible
/// response and then either continues or closes, per spec.md §7's
/// propagation policy.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying connection was lost, timed out, or a write failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The process-wide stop signal fired while this session was waiting on
    /// a read.
    #[error("shutdown signal received")]
    Shutdown,
}
