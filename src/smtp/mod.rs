//! The SMTP core: command parsing, the transaction and session state
//! machines, and the connection-accept loop (spec.md §2, components 2-5).

pub mod error;
pub mod parser;
pub mod server;
pub mod session;
pub mod transaction;

pub use server::Server;
pub use session::{Session, SessionState};
pub use transaction::{Envelope, Mail, Transaction, TransactionState};
