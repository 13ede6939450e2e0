//! Fabric configuration
//!
//! Pre-configured settings for development and production deployments with
//! validation and builder support. Port bases are deliberately *not* part of
//! this config — they come from the environment via
//! [`crate::ports::PortMapper::from_env`] so parallel Tekton instances
//! cannot share a config file and silently collide.

#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use crate::channel::ChannelSettings;
use crate::domain_types::{
    BroadcastSlackMs, ConnectTimeoutMs, DefaultDeadlineMs, FrameSizeLimit, MaxForwardHops,
    ProbeCacheTtlMs, QueueCapacity,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field combination fails validation
    #[error("invalid configuration: {field} - {reason}")]
    ValidationError {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Complete fabric configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    /// Per-channel pending FIFO capacity
    pub queue_capacity: QueueCapacity,
    /// Dial timeout for specialist connections
    pub connect_timeout_ms: ConnectTimeoutMs,
    /// On-wire deadline used when the caller does not supply one
    pub default_deadline_ms: DefaultDeadlineMs,
    /// Ceiling on queue wait before a request fails without touching the
    /// wire; `None` means each request's own deadline
    pub queue_wait_slo_ms: Option<u64>,
    /// How long probe results stay cached
    pub probe_cache_ttl_ms: ProbeCacheTtlMs,
    /// Coordinator slack on top of per-target broadcast deadlines
    pub broadcast_slack_ms: BroadcastSlackMs,
    /// Per-frame wire size cap
    pub frame_size_limit: FrameSizeLimit,
    /// Forwarding chain walk bound
    pub max_forward_hops: MaxForwardHops,
    /// Location of the persisted forwarding table
    pub forward_store_path: PathBuf,
}

impl FabricConfig {
    /// Development settings: short timeouts for fast feedback, small queues
    /// for easy debugging.
    ///
    /// # Panics
    /// Panics if any of the hardcoded values are out of range for their
    /// domain types.
    #[must_use]
    pub fn development() -> Self {
        Self {
            queue_capacity: QueueCapacity::try_new(64).unwrap(),
            connect_timeout_ms: ConnectTimeoutMs::try_new(1000).unwrap(),
            default_deadline_ms: DefaultDeadlineMs::try_new(10_000).unwrap(),
            queue_wait_slo_ms: None,
            probe_cache_ttl_ms: ProbeCacheTtlMs::try_new(5000).unwrap(),
            broadcast_slack_ms: BroadcastSlackMs::try_new(250).unwrap(),
            frame_size_limit: FrameSizeLimit::default(),
            max_forward_hops: MaxForwardHops::default(),
            forward_store_path: Self::default_store_path(),
        }
    }

    /// Production settings: the spec'd defaults — 1024-deep queues, 30 s
    /// deadlines, 30 s probe cache.
    #[must_use]
    pub fn production() -> Self {
        Self {
            queue_capacity: QueueCapacity::default(),
            connect_timeout_ms: ConnectTimeoutMs::default(),
            default_deadline_ms: DefaultDeadlineMs::default(),
            queue_wait_slo_ms: None,
            probe_cache_ttl_ms: ProbeCacheTtlMs::default(),
            broadcast_slack_ms: BroadcastSlackMs::default(),
            frame_size_limit: FrameSizeLimit::default(),
            max_forward_hops: MaxForwardHops::default(),
            forward_store_path: Self::default_store_path(),
        }
    }

    /// Starts a builder seeded with production settings
    #[must_use]
    pub fn builder() -> FabricConfigBuilder {
        FabricConfigBuilder::new()
    }

    /// The well-known forwarding store location under the platform root
    /// (`TEKTON_ROOT`, falling back to the working directory).
    #[must_use]
    pub fn default_store_path() -> PathBuf {
        let root = std::env::var("TEKTON_ROOT").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(root).join(".tekton").join("forwarding.json")
    }

    /// Checks cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_wait_slo_ms.is_some_and(|slo| slo < 100) {
            return Err(ConfigError::ValidationError {
                field: "queue_wait_slo_ms".to_string(),
                reason: "below the 100ms floor".to_string(),
            });
        }
        if self.forward_store_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "forward_store_path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Default on-wire deadline as a `Duration`
    #[must_use]
    pub fn default_deadline(&self) -> Duration {
        self.default_deadline_ms.as_duration()
    }

    pub(crate) fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            queue_capacity: self.queue_capacity,
            connect_timeout: self.connect_timeout_ms.as_duration(),
            frame_limit: self.frame_size_limit.as_usize(),
            queue_wait_slo: self.queue_wait_slo_ms.map(Duration::from_millis),
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Builder for custom configurations
pub struct FabricConfigBuilder {
    config: FabricConfig,
}

impl FabricConfigBuilder {
    /// Seeds the builder with production settings
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: FabricConfig::production(),
        }
    }

    /// Sets the per-channel queue capacity
    #[must_use]
    pub fn queue_capacity(mut self, capacity: QueueCapacity) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Sets the dial timeout
    #[must_use]
    pub fn connect_timeout_ms(mut self, timeout: ConnectTimeoutMs) -> Self {
        self.config.connect_timeout_ms = timeout;
        self
    }

    /// Sets the default on-wire deadline
    #[must_use]
    pub fn default_deadline_ms(mut self, deadline: DefaultDeadlineMs) -> Self {
        self.config.default_deadline_ms = deadline;
        self
    }

    /// Sets an explicit queue-wait SLO
    #[must_use]
    pub fn queue_wait_slo_ms(mut self, slo: u64) -> Self {
        self.config.queue_wait_slo_ms = Some(slo);
        self
    }

    /// Sets the probe cache TTL
    #[must_use]
    pub fn probe_cache_ttl_ms(mut self, ttl: ProbeCacheTtlMs) -> Self {
        self.config.probe_cache_ttl_ms = ttl;
        self
    }

    /// Sets the broadcast coordinator slack
    #[must_use]
    pub fn broadcast_slack_ms(mut self, slack: BroadcastSlackMs) -> Self {
        self.config.broadcast_slack_ms = slack;
        self
    }

    /// Sets the per-frame size cap
    #[must_use]
    pub fn frame_size_limit(mut self, limit: FrameSizeLimit) -> Self {
        self.config.frame_size_limit = limit;
        self
    }

    /// Sets the forwarding chain walk bound
    #[must_use]
    pub fn max_forward_hops(mut self, hops: MaxForwardHops) -> Self {
        self.config.max_forward_hops = hops;
        self
    }

    /// Sets the forwarding store location
    #[must_use]
    pub fn forward_store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.forward_store_path = path.into();
        self
    }

    /// Builds and validates the configuration
    pub fn build(self) -> Result<FabricConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FabricConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(FabricConfig::development().validate().is_ok());
        assert!(FabricConfig::production().validate().is_ok());
    }

    #[test]
    fn builder_overrides_take_effect() {
        let config = FabricConfig::builder()
            .queue_capacity(QueueCapacity::try_new(4).unwrap())
            .default_deadline_ms(DefaultDeadlineMs::try_new(500).unwrap())
            .forward_store_path("/tmp/forwarding.json")
            .build()
            .unwrap();
        assert_eq!(config.queue_capacity.as_usize(), 4);
        assert_eq!(config.default_deadline(), Duration::from_millis(500));
    }

    #[test]
    fn sub_floor_queue_wait_slo_is_rejected() {
        let result = FabricConfig::builder().queue_wait_slo_ms(10).build();
        assert!(result.is_err());
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = FabricConfig::development();
        let json = serde_json::to_string(&config).unwrap();
        let back: FabricConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.queue_capacity, back.queue_capacity);
        assert_eq!(config.default_deadline_ms, back.default_deadline_ms);
    }
}
