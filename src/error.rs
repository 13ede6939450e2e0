//! Error types for the messaging fabric
//!
//! Every per-call failure is surfaced to callers as a structured
//! [`FabricError`] value; panics are reserved for nothing. Broadcast
//! aggregates carry one `Result` per target, so individual specialist
//! failures never fail the aggregate.

#![allow(clippy::module_name_repetitions)]

use crate::domain_types::SpecialistId;
use thiserror::Error;

/// Comprehensive error type for fabric operations
#[derive(Debug, Error)]
pub enum FabricError {
    /// Missing or invalid startup configuration (port bases, store path)
    #[error("configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// The addressed name is not in the component catalog
    #[error("unknown CI specialist: {id}")]
    UnknownSpecialist {
        /// The name as the caller supplied it
        id: String,
    },

    /// The forwarding overlay contains a cycle for this source
    #[error("forwarding loop detected: {chain}")]
    ForwardingLoop {
        /// The visited chain, rendered `a -> b -> a`
        chain: String,
    },

    /// No connection could be established to the specialist
    #[error("{id} is unreachable: {reason}")]
    Unreachable {
        /// Target specialist
        id: SpecialistId,
        /// Dial failure detail
        reason: String,
    },

    /// The connection failed mid-exchange
    #[error("transport failure talking to {id}: {reason}")]
    Transport {
        /// Target specialist
        id: SpecialistId,
        /// I/O failure detail
        reason: String,
    },

    /// The on-wire response deadline expired
    #[error("no reply from {id} within {deadline_ms}ms")]
    Timeout {
        /// Target specialist
        id: SpecialistId,
        /// The deadline that expired
        deadline_ms: u64,
    },

    /// The specialist sent a frame the fabric could not accept
    #[error("protocol violation from {id}: {reason}")]
    Protocol {
        /// Target specialist
        id: SpecialistId,
        /// Decode or framing failure detail
        reason: String,
    },

    /// The channel's pending FIFO is at capacity
    #[error("request queue for {id} is full")]
    QueueFull {
        /// Target specialist
        id: SpecialistId,
    },

    /// The channel was closed while the request was pending
    #[error("channel to {id} is closed")]
    ChannelClosed {
        /// Target specialist
        id: SpecialistId,
    },

    /// The caller supplied an unusable argument (e.g. empty broadcast set)
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong
        message: String,
    },

    /// Hire refused because the specialist failed its health probe
    #[error("{id} failed its health probe")]
    UnhealthyTarget {
        /// Target specialist
        id: SpecialistId,
    },

    /// The specialist is not in the roster
    #[error("{id} is not in the roster")]
    NotHired {
        /// Target specialist
        id: SpecialistId,
    },
}

impl FabricError {
    /// Whether the error is transient from the caller's point of view:
    /// a retry against the same specialist may succeed without operator
    /// intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. }
                | Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::Protocol { .. }
                | Self::QueueFull { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let id = SpecialistId::from_canonical("apollo-ci");
        assert!(
            FabricError::Timeout {
                id: id.clone(),
                deadline_ms: 100
            }
            .is_transient()
        );
        assert!(!FabricError::UnknownSpecialist { id: "x".into() }.is_transient());
        assert!(!FabricError::ChannelClosed { id }.is_transient());
    }

    #[test]
    fn errors_render_the_specialist() {
        let err = FabricError::QueueFull {
            id: SpecialistId::from_canonical("athena-ci"),
        };
        assert!(err.to_string().contains("athena-ci"));
    }
}
