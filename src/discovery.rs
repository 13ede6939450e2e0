//! Discovery and health probing
//!
//! Enumerates the component catalog, computes endpoints through the port
//! scheme, and probes specialists over short-lived connections. Probe
//! results are cached with a TTL so discovery-heavy clients (status pages,
//! shells) do not hammer specialists with pings.

#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use crate::codec::{self, WireReply, WireRequest};
use crate::domain_types::{Endpoint, SpecialistId};
use crate::error::FabricError;
use crate::fabric::FabricConfig;
use crate::ports::PortMapper;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tokio_util::codec::Framed;
use tracing::debug;

/// Result of one health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Whether the specialist answered a ping with anything parseable
    pub healthy: bool,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
    /// Round-trip of the probe when it succeeded
    pub latency_ms: Option<u64>,
}

/// One row of the discovery inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistSummary {
    /// Canonical specialist id
    pub id: SpecialistId,
    /// Where it listens
    pub endpoint: Endpoint,
    /// Most recent probe verdict, if one ran
    pub healthy: Option<bool>,
    /// When that probe ran
    pub last_probe_at: Option<DateTime<Utc>>,
    /// Roles from static catalog metadata
    pub roles: Vec<String>,
    /// Model last seen via an `info` probe; may be stale
    pub model: Option<String>,
    /// Catalog description of the backing component
    pub description: String,
}

/// Static self-description of the fabric for external clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformManifest {
    /// Crate version
    pub version: String,
    /// How specialist ports are derived
    pub endpoint_formula: String,
    /// All roles present in the catalog
    pub roles: Vec<String>,
    /// Wire operations every specialist is expected to speak
    pub capabilities: Vec<String>,
}

/// What an `info` probe taught us about a specialist
#[derive(Debug, Clone)]
struct CachedInfo {
    model: Option<String>,
    capabilities: Vec<String>,
}

struct CachedHealth {
    health: Health,
    at: Instant,
}

/// Discovery service over the component catalog
pub struct Discovery {
    mapper: PortMapper,
    probe_timeout: Duration,
    cache_ttl: Duration,
    frame_limit: usize,
    health_cache: DashMap<SpecialistId, CachedHealth>,
    info_cache: DashMap<SpecialistId, CachedInfo>,
}

impl Discovery {
    /// Builds a discovery service sharing the fabric's mapper and tunables
    #[must_use]
    pub fn new(mapper: PortMapper, config: &FabricConfig) -> Self {
        Self {
            mapper,
            probe_timeout: config.connect_timeout_ms.as_duration(),
            cache_ttl: config.probe_cache_ttl_ms.as_duration(),
            frame_limit: config.frame_size_limit.as_usize(),
            health_cache: DashMap::new(),
            info_cache: DashMap::new(),
        }
    }

    /// Lists every catalog specialist, probing each (through the cache).
    /// With a role filter, only specialists whose catalog roles include it.
    pub async fn list_specialists(&self, role: Option<&str>) -> Vec<SpecialistSummary> {
        let mut summaries = Vec::new();
        for (id, endpoint) in self.mapper.all_specialists() {
            let Ok(spec) = self.mapper.catalog_entry(&id) else {
                continue;
            };
            let roles = vec![spec.category.to_string()];
            if let Some(role) = role {
                if !roles.iter().any(|r| r == role) {
                    continue;
                }
            }

            let health = self.probe(&id).await;
            if health.healthy && !self.info_cache.contains_key(&id) {
                self.refresh_info(&id).await;
            }
            let model = self
                .info_cache
                .get(&id)
                .and_then(|info| info.model.clone());

            summaries.push(SpecialistSummary {
                id,
                endpoint,
                healthy: Some(health.healthy),
                last_probe_at: Some(health.checked_at),
                roles,
                model,
                description: spec.description.to_string(),
            });
        }
        summaries
    }

    /// Probes one specialist, reusing a cached verdict while it is fresh
    pub async fn probe(&self, id: &SpecialistId) -> Health {
        if let Some(cached) = self.health_cache.get(id) {
            if cached.at.elapsed() < self.cache_ttl {
                return cached.health.clone();
            }
        }
        let health = self.probe_uncached(id).await;
        self.health_cache.insert(
            id.clone(),
            CachedHealth {
                health: health.clone(),
                at: Instant::now(),
            },
        );
        health
    }

    /// Probes one specialist right now, bypassing and refreshing the cache
    pub async fn test_connection(&self, id: &SpecialistId) -> Health {
        let health = self.probe_uncached(id).await;
        self.health_cache.insert(
            id.clone(),
            CachedHealth {
                health: health.clone(),
                at: Instant::now(),
            },
        );
        health
    }

    /// Specialists whose advertised capabilities include all of `required`.
    /// Capability data comes from `info` probes, so only specialists that
    /// have been seen healthy can match.
    pub async fn find_by_capability(&self, required: &[String]) -> Vec<SpecialistId> {
        let summaries = self.list_specialists(None).await;
        summaries
            .into_iter()
            .filter(|summary| {
                self.info_cache.get(&summary.id).is_some_and(|info| {
                    required.iter().all(|cap| info.capabilities.contains(cap))
                })
            })
            .map(|summary| summary.id)
            .collect()
    }

    /// Static self-description of the fabric. No side effects.
    #[must_use]
    pub fn manifest(&self) -> PlatformManifest {
        let mut roles: Vec<String> = self
            .mapper
            .catalog()
            .iter()
            .map(|spec| spec.category.to_string())
            .collect();
        roles.sort();
        roles.dedup();
        PlatformManifest {
            version: env!("CARGO_PKG_VERSION").to_string(),
            endpoint_formula: "ai_port = AI_PORT_BASE + (component_port - COMPONENT_PORT_BASE)"
                .to_string(),
            roles,
            capabilities: ["chat", "ping", "info", "schema"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Forgets all cached probe and info results
    pub fn clear_cache(&self) {
        self.health_cache.clear();
        self.info_cache.clear();
    }

    async fn probe_uncached(&self, id: &SpecialistId) -> Health {
        let checked_at = Utc::now();
        let started = Instant::now();
        let reply = self.exchange_once(id, &WireRequest::Ping).await;
        match reply {
            Ok(_) => Health {
                healthy: true,
                checked_at,
                latency_ms: Some(
                    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                ),
            },
            Err(reason) => {
                debug!(specialist = %id, reason, "health probe failed");
                Health {
                    healthy: false,
                    checked_at,
                    latency_ms: None,
                }
            }
        }
    }

    async fn refresh_info(&self, id: &SpecialistId) {
        match self.exchange_once(id, &WireRequest::Info).await {
            Ok(WireReply::Info(info)) => {
                self.info_cache.insert(
                    id.clone(),
                    CachedInfo {
                        model: info.model_name,
                        capabilities: info.capabilities,
                    },
                );
            }
            Ok(_) => {
                // The specialist answered but not with identity fields;
                // remember that so we do not re-ask on every listing.
                self.info_cache.insert(
                    id.clone(),
                    CachedInfo {
                        model: None,
                        capabilities: Vec::new(),
                    },
                );
            }
            Err(reason) => debug!(specialist = %id, reason, "info probe failed"),
        }
    }

    /// One request/response over a fresh, short-lived connection
    async fn exchange_once(
        &self,
        id: &SpecialistId,
        request: &WireRequest<'_>,
    ) -> Result<WireReply, String> {
        let endpoint = self
            .mapper
            .endpoint_for(id.as_str())
            .map_err(|err| err.to_string())?;
        let stream = timeout(
            self.probe_timeout,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| "connect timed out".to_string())?
        .map_err(|err| err.to_string())?;

        let mut framed = Framed::new(stream, codec::framer(self.frame_limit));
        let frame = codec::encode(request).map_err(|err| err.to_string())?;
        framed.send(frame).await.map_err(|err| err.to_string())?;

        let line = timeout(self.probe_timeout, framed.next())
            .await
            .map_err(|_| "probe timed out".to_string())?
            .ok_or_else(|| "connection closed".to_string())?
            .map_err(|err| err.to_string())?;
        codec::decode(&line).map_err(|err| err.to_string())
    }

    /// Normalizes a caller-supplied name through the shared mapper
    pub fn normalize(&self, name: &str) -> Result<SpecialistId, FabricError> {
        self.mapper.normalize(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery() -> Discovery {
        Discovery::new(PortMapper::new(8000, 45000), &FabricConfig::development())
    }

    #[test]
    fn manifest_describes_the_port_scheme() {
        let manifest = discovery().manifest();
        assert!(manifest.endpoint_formula.contains("AI_PORT_BASE"));
        assert!(manifest.roles.contains(&"attention".to_string()));
        assert!(manifest.capabilities.contains(&"chat".to_string()));
        assert_eq!(manifest.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn manifest_roles_are_deduplicated_and_sorted() {
        let roles = discovery().manifest().roles;
        let mut sorted = roles.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(roles, sorted);
    }
}
