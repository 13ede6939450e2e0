//! Domain types for the messaging fabric
//!
//! Strongly-typed domain values used across the fabric to prevent primitive
//! obsession and keep validation at construction time.

#![allow(clippy::unreadable_literal)]

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fabric-side correlation identifier for one request.
///
/// Assigned when a request is enqueued and unique for the lifetime of the
/// process. Never serialized onto the wire; specialists only ever see the
/// request body.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random request ID
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Logical identifier of a CI specialist, canonically `<component>-ci`.
///
/// Construction happens through [`crate::ports::PortMapper::normalize`],
/// which accepts the canonical form, bare component names, hyphen/underscore
/// variants, and raw `host:port` strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecialistId(String);

impl SpecialistId {
    /// Wraps an already-canonical id. Callers outside the port mapper should
    /// prefer [`crate::ports::PortMapper::normalize`].
    #[must_use]
    pub fn from_canonical(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The canonical id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The component name with the `-ci` suffix stripped
    #[must_use]
    pub fn component(&self) -> &str {
        self.0.strip_suffix("-ci").unwrap_or(&self.0)
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Name of a terminal inbox that forwarded traffic can be diverted to
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct TerminalName(String);

/// Role label attached to a rostered specialist
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        Display,
        TryFrom,
        Into
    )
)]
pub struct RoleName(String);

/// Bounded capacity of a channel's pending-request FIFO
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 65_536),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1024
)]
pub struct QueueCapacity(usize);

impl QueueCapacity {
    /// Gets the value as usize for use with tokio channels
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Maximum size of a single wire frame in bytes
#[nutype(
    validate(greater_or_equal = 1024, less_or_equal = 16_777_216),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 1_048_576
)]
pub struct FrameSizeLimit(usize);

impl FrameSizeLimit {
    /// Gets the value as usize
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner()
    }
}

/// Upper bound on a forwarding chain walk before declaring a loop
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 8),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 4
)]
pub struct MaxForwardHops(u8);

impl MaxForwardHops {
    /// Gets the value as u8
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.into_inner()
    }
}

/// Dial timeout for establishing a specialist connection, in milliseconds
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 60_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 2000
)]
pub struct ConnectTimeoutMs(u64);

impl ConnectTimeoutMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Default on-wire response deadline, in milliseconds
#[nutype(
    validate(greater_or_equal = 100, less_or_equal = 600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct DefaultDeadlineMs(u64);

impl DefaultDeadlineMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// TTL for cached health-probe results, in milliseconds
#[nutype(
    validate(less_or_equal = 3_600_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 30_000
)]
pub struct ProbeCacheTtlMs(u64);

impl ProbeCacheTtlMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// Coordinator slack added on top of per-target deadlines when aggregating a
/// broadcast, in milliseconds
#[nutype(
    validate(less_or_equal = 60_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default,
        TryFrom,
        Into
    ),
    default = 500
)]
pub struct BroadcastSlackMs(u64);

impl BroadcastSlackMs {
    /// Converts to Duration
    #[must_use]
    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.into_inner())
    }
}

/// TCP endpoint of a specialist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name, loopback for the single-host deployment
    pub host: String,
    /// Specialist TCP port
    pub port: u16,
}

impl Endpoint {
    /// Endpoint on the loopback interface
    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}:{}", self.host, self.port))
    }
}

/// A successful specialist reply as seen by fabric callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Body of the specialist's answer
    pub content: String,
    /// Time spent on the wire, write-to-read, in milliseconds
    pub latency_ms: u64,
}
