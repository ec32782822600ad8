//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load schema → Build store → Restore boot configuration → Start RPC listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Finish in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: schema first, then running state, then listeners
//! - A boot configuration that fails to apply is logged, not fatal; the
//!   daemon starts with an empty running tree so it can be repaired

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
