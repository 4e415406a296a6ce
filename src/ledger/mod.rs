//! The ballot ledger engine and its collaborators.

pub mod authority;
pub mod command;
pub mod engine;
pub mod state;
pub mod store;
pub mod tally;

pub use authority::{AdminRoster, Authorizer};
pub use command::{Command, CommandOutput};
pub use engine::Ledger;
pub use state::{LedgerState, Policy, Snapshot};
pub use store::{AuditStore, MemoryStore};
