//! Fabric core for CI specialist messaging
//!
//! The fabric is the in-process hub that clients talk to instead of raw
//! sockets. It maps logical specialist names to endpoints through the port
//! scheme, owns one single-flight [`crate::channel::SpecialistChannel`] per
//! specialist, fans broadcasts out across many of them, applies the
//! forwarding overlay before every dispatch, and feeds roster counters and
//! observer hooks after every completion.
//!
//! ## Message flow
//!
//! ```text
//! Caller -> Fabric::send -> PortMapper (normalize)
//!              |
//!              v
//!        ForwardingOverlay ---- terminal:... ----> TerminalInbox
//!              |                                      (fail-open)
//!              v
//!        SpecialistChannel  ->  TCP, one frame in flight
//!              |
//!              v
//!        Roster counters + FabricObserver hooks
//! ```
//!
//! Ordering: FIFO per channel, no guarantees across specialists. Undelivered
//! in-flight messages are lost on restart; there is no durable queue.

pub mod config;
mod core;

pub use config::{ConfigError, FabricConfig, FabricConfigBuilder};
pub use core::Fabric;

/// Init-once process-wide accessor.
///
/// The fabric is designed to be owned by the application entry point and
/// passed explicitly; prefer that. Legacy call sites that expect a
/// module-level accessor can install the constructed fabric here exactly
/// once and fetch shared handles afterwards.
pub mod global {
    use super::Fabric;
    use std::sync::{Arc, OnceLock};

    static FABRIC: OnceLock<Arc<Fabric>> = OnceLock::new();

    /// Installs the process-wide fabric. Fails (returning the rejected
    /// handle) if one was already installed; the first installation wins.
    pub fn init(fabric: Arc<Fabric>) -> Result<(), Arc<Fabric>> {
        FABRIC.set(fabric)
    }

    /// The installed fabric, if [`init`] has run
    #[must_use]
    pub fn get() -> Option<Arc<Fabric>> {
        FABRIC.get().cloned()
    }
}
