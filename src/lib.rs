//! # Tekton Fabric - CI Specialist Messaging
//!
//! The messaging fabric is the in-process core every Tekton client uses to
//! talk to CI specialists: long-running processes speaking line-delimited
//! JSON over TCP. It maps logical names to endpoints through a deterministic
//! port scheme, owns one serialized request/response channel per specialist,
//! fans broadcasts out across many of them, exposes discovery and health
//! data, and applies a persisted forwarding overlay that can divert a
//! specialist's traffic to another specialist or a human terminal's inbox.
//!
//! ## Architecture
//!
//! The fabric is a constructed value owned by the application entry point
//! and passed explicitly into client facades — no hidden globals:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tekton_fabric::{Fabric, FabricConfig, PortMapper, ShellFacade};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), tekton_fabric::FabricError> {
//! let mapper = PortMapper::from_env()?;
//! let fabric = Arc::new(Fabric::new(FabricConfig::production(), mapper));
//!
//! let shell = ShellFacade::new(Arc::clone(&fabric));
//! let reply = shell.send_name("apollo", "hello").await?;
//! println!("{}", reply.content);
//!
//! fabric.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - One channel and at most one live connection per specialist
//! - Strict FIFO and single-flight per channel: no pipelining, no wire-level
//!   correlation ids needed
//! - Every request completes with a reply or a typed error; nothing is
//!   abandoned silently
//! - Broadcasts aggregate exactly one result per addressed specialist, and a
//!   failing specialist never blocks its peers beyond its own deadline
//! - Forwarding is fail-open: overlay trouble reaches the original
//!   specialist rather than failing the send
//!
//! Not provided, on purpose: durable queuing, cross-host clustering,
//! authentication, or specialist restart.

// Core modules
pub mod channel;
pub mod codec;
pub mod discovery;
pub mod domain_types;
pub mod error;
pub mod fabric;
pub mod facade;
pub mod forwarding;
pub mod observability;
pub mod ports;
pub mod roster;

// Re-export the types that make up the public surface
pub use crate::channel::ChannelState;
pub use crate::discovery::{Discovery, Health, PlatformManifest, SpecialistSummary};
pub use crate::domain_types::{
    Endpoint, Reply, RequestId, RoleName, SpecialistId, TerminalName,
};
pub use crate::error::FabricError;
pub use crate::fabric::{ConfigError, Fabric, FabricConfig, FabricConfigBuilder};
pub use crate::facade::{OrchestratorFacade, ShellFacade, TeamChatResult};
pub use crate::forwarding::{ForwardEntry, ForwardFormat, Route, TerminalInbox};
pub use crate::observability::FabricObserver;
pub use crate::ports::PortMapper;
pub use crate::roster::{Performance, Roster, RosterEntry};
