//! The per-message transaction state machine (spec.md §3, §4.2).
//!
//! Grounded on `pkg/smtpd/transaction.go` and `pkg/smtpd/mail.go` in the
//! original mailmock implementation. The Go original represents "operation
//! not legal" as a `nil`-receiver guard plus a generic error; here that
//! becomes an explicit `Result<_, TransactionError>` at every call site, per
//! the redesign note in spec.md §9.

use serde::{Deserialize, Serialize};

use crate::reply::{Response, ReplyCatalog};
use crate::smtp::error::TransactionError;
use crate::smtp::parser::Command;

/// The SMTP-level sender/recipient pair, distinct from mail headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

/// An envelope plus its content lines, as described in RFC 5321 §2.3.1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    pub envelope: Envelope,
    pub content: Vec<String>,
}

/// The state of a [`Transaction`]. Initial state is `Initiated`; `Completed`
/// and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Initiated,
    InProgress,
    ReadingData,
    Completed,
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Aborted)
    }
}

/// One `MAIL … RCPT* DATA …` exchange within a session.
///
/// Owns the in-progress envelope/content (`mail`), its `state`, and a
/// `history` of every accepted command's raw text followed by the response
/// that was sent for it (spec.md §3 I3: a transaction in a terminal state
/// never mutates `mail`, `state`, or `history` again).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub mail: Mail,
    pub state: TransactionState,
    pub history: Vec<String>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Creates a new transaction in the `Initiated` state.
    pub fn new() -> Self {
        Self {
            mail: Mail::default(),
            state: TransactionState::Initiated,
            history: Vec::new(),
        }
    }

    /// Drives the state machine for a single command, per the dispatch table
    /// in spec.md §4.2. Returns the response to send the client.
    ///
    /// In `ReadingData`, `Completed`, or `Aborted`, every call fails: the
    /// transaction expects only a [`Transaction::data`] call (or nothing, in
    /// the terminal states), not further commands. On failure no side effect
    /// occurs and `history` is left untouched.
    pub fn process(
        &mut self,
        cmd: &Command,
        catalog: &ReplyCatalog,
    ) -> Result<Response, TransactionError> {
        if !matches!(
            self.state,
            TransactionState::Initiated | TransactionState::InProgress
        ) {
            return Err(TransactionError { state: self.state });
        }

        let response = self.dispatch(cmd, catalog);
        self.history.push(cmd.raw.clone());
        self.history.push(response.to_string());
        Ok(response)
    }

    fn dispatch(&mut self, cmd: &Command, catalog: &ReplyCatalog) -> Response {
        match self.state {
            TransactionState::Initiated => match cmd.name.as_str() {
                "MAIL" => {
                    self.mail.envelope.sender = cmd.arg("FROM").unwrap_or_default().to_string();
                    self.state = TransactionState::InProgress;
                    catalog.success()
                }
                _ => catalog.bad_sequence(),
            },
            TransactionState::InProgress => match cmd.name.as_str() {
                "RCPT" => {
                    self.mail
                        .envelope
                        .recipients
                        .push(cmd.arg("TO").unwrap_or_default().to_string());
                    catalog.success()
                }
                "DATA" => {
                    if self.mail.envelope.recipients.is_empty() {
                        catalog.bad_sequence()
                    } else {
                        self.state = TransactionState::ReadingData;
                        catalog.start_data()
                    }
                }
                _ => catalog.bad_sequence(),
            },
            _ => unreachable!("dispatch is only reached from Initiated/InProgress"),
        }
    }

    /// Sets the collected DATA body and completes the transaction. Legal
    /// only in `ReadingData`.
    pub fn data(
        &mut self,
        lines: Vec<String>,
        catalog: &ReplyCatalog,
    ) -> Result<Response, TransactionError> {
        if self.state != TransactionState::ReadingData {
            return Err(TransactionError { state: self.state });
        }

        self.mail.content = lines;
        self.state = TransactionState::Completed;

        for line in &self.mail.content {
            self.history.push(line.clone());
        }
        self.history.push(".".to_string());

        let response = catalog.success();
        self.history.push(response.to_string());
        Ok(response)
    }

    /// Aborts the transaction. Legal (and idempotent) from `Initiated`,
    /// `InProgress`, `ReadingData`, and `Aborted`; fails from `Completed`.
    /// Never touches `history`.
    pub fn abort(&mut self) -> Result<(), TransactionError> {
        match self.state {
            TransactionState::Initiated | TransactionState::InProgress | TransactionState::ReadingData => {
                self.state = TransactionState::Aborted;
                Ok(())
            }
            TransactionState::Aborted => Ok(()),
            TransactionState::Completed => Err(TransactionError { state: self.state }),
        }
    }
}
