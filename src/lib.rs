//! Transactional configuration daemon library.
//!
//! Clients open sessions, edit a private candidate tree validated against a
//! schema, and commit it; the commit runs the affected actions and publishes
//! a new running configuration.

pub mod commit;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod persistence;
pub mod rpc;
pub mod schema;
pub mod session;
pub mod store;
pub mod tree;

#[cfg(test)]
mod testing;

pub use config::DaemonConfig;
pub use error::{ConfigdError, ConfigdResult};
pub use lifecycle::Shutdown;
pub use schema::Schema;
pub use store::{ConfigStore, Scope};
