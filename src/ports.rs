//! Port mapper and component catalog
//!
//! Every Tekton component has a fixed application port expressed as an offset
//! from `COMPONENT_PORT_BASE`; its CI specialist listens on the same offset
//! from `AI_PORT_BASE`. Both bases come from the environment and are
//! required, so that parallel Tekton instances on one host cannot collide.
//!
//! The mapper is a pure function of the two bases and the static catalog:
//! same inputs, same outputs, no I/O after construction.

#![allow(clippy::missing_errors_doc, clippy::unreadable_literal)]

use crate::domain_types::{Endpoint, SpecialistId};
use crate::error::FabricError;

/// Environment variable carrying the component application port base
pub const COMPONENT_PORT_BASE_VAR: &str = "COMPONENT_PORT_BASE";
/// Environment variable carrying the CI specialist port base
pub const AI_PORT_BASE_VAR: &str = "AI_PORT_BASE";

/// Static description of one platform component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpec {
    /// Component name as used in catalog lookups (underscore form)
    pub name: &'static str,
    /// Offset from the component port base
    pub offset: u16,
    /// Human-readable description
    pub description: &'static str,
    /// Category, doubling as the specialist's default role
    pub category: &'static str,
}

/// The fixed component catalog.
///
/// Order matters: discovery listings and broadcasts walk it in this order.
const CATALOG: &[ComponentSpec] = &[
    ComponentSpec { name: "engram", offset: 0, description: "Memory and experience storage", category: "memory" },
    ComponentSpec { name: "hermes", offset: 1, description: "Service registry and messaging", category: "messaging" },
    ComponentSpec { name: "ergon", offset: 2, description: "Agent building and management", category: "agents" },
    ComponentSpec { name: "rhetor", offset: 3, description: "LLM orchestration and prompt engineering", category: "orchestration" },
    ComponentSpec { name: "terma", offset: 4, description: "Terminal session management", category: "terminal" },
    ComponentSpec { name: "athena", offset: 5, description: "Knowledge graph", category: "knowledge" },
    ComponentSpec { name: "prometheus", offset: 6, description: "Planning and retrospectives", category: "planning" },
    ComponentSpec { name: "harmonia", offset: 7, description: "Workflow orchestration", category: "workflow" },
    ComponentSpec { name: "telos", offset: 8, description: "Requirements tracking", category: "requirements" },
    ComponentSpec { name: "synthesis", offset: 9, description: "Execution engine", category: "execution" },
    ComponentSpec { name: "tekton_core", offset: 10, description: "Project and repository management", category: "projects" },
    ComponentSpec { name: "metis", offset: 11, description: "Task decomposition", category: "tasks" },
    ComponentSpec { name: "apollo", offset: 12, description: "Attention and context preparation", category: "attention" },
    ComponentSpec { name: "penia", offset: 13, description: "Token budget management", category: "budget" },
    ComponentSpec { name: "sophia", offset: 14, description: "Learning and measurement", category: "learning" },
    ComponentSpec { name: "noesis", offset: 15, description: "Discovery and research", category: "research" },
    ComponentSpec { name: "numa", offset: 16, description: "Platform companion and coordination", category: "coordination" },
    ComponentSpec { name: "hephaestus", offset: 80, description: "User interface", category: "ui" },
];

/// Deterministic name-to-endpoint mapping for CI specialists.
///
/// `ai_port = ai_base + (component_port - component_base)`, which with the
/// catalog's offset representation reduces to `ai_base + offset`.
#[derive(Debug, Clone)]
pub struct PortMapper {
    component_base: u16,
    ai_base: u16,
    host: String,
}

impl PortMapper {
    /// Builds a mapper from explicit bases. The loopback host is used for
    /// every endpoint; the fabric is a single-host deployment.
    #[must_use]
    pub fn new(component_base: u16, ai_base: u16) -> Self {
        Self {
            component_base,
            ai_base,
            host: "localhost".to_string(),
        }
    }

    /// Reads both port bases from the environment. Absence of either is a
    /// fatal configuration error; there are no defaults, so parallel Tekton
    /// instances on one host cannot silently collide.
    pub fn from_env() -> Result<Self, FabricError> {
        let component_base = read_base(COMPONENT_PORT_BASE_VAR)?;
        let ai_base = read_base(AI_PORT_BASE_VAR)?;
        Ok(Self::new(component_base, ai_base))
    }

    /// The component application port base
    #[must_use]
    pub fn component_base(&self) -> u16 {
        self.component_base
    }

    /// The CI specialist port base
    #[must_use]
    pub fn ai_base(&self) -> u16 {
        self.ai_base
    }

    /// Application port of a catalog component
    #[must_use]
    pub fn component_port(&self, spec: &ComponentSpec) -> u16 {
        self.component_base + spec.offset
    }

    /// Specialist port of a catalog component
    #[must_use]
    pub fn ai_port(&self, spec: &ComponentSpec) -> u16 {
        self.ai_base + spec.offset
    }

    /// Inverse of the port formula, for diagnostics
    #[must_use]
    pub fn component_port_for_ai(&self, ai_port: u16) -> u16 {
        self.component_base + (ai_port - self.ai_base)
    }

    /// Reverse lookup from a specialist port to its canonical id
    #[must_use]
    pub fn specialist_for_port(&self, ai_port: u16) -> Option<SpecialistId> {
        let offset = ai_port.checked_sub(self.ai_base)?;
        CATALOG
            .iter()
            .find(|spec| spec.offset == offset)
            .map(|spec| canonical_id(spec.name))
    }

    /// Resolves a specialist's endpoint. The name may be canonical
    /// (`apollo-ci`), bare (`apollo`), a hyphen/underscore variant, or a raw
    /// `host:port` string; anything not in the catalog is a hard error.
    pub fn endpoint_for(&self, name: &str) -> Result<Endpoint, FabricError> {
        if let Some((host, port)) = split_endpoint(name) {
            return Ok(Endpoint {
                host: host.to_string(),
                port,
            });
        }
        let spec = self.spec_for(name)?;
        Ok(Endpoint {
            host: self.host.clone(),
            port: self.ai_port(spec),
        })
    }

    /// Normalizes any accepted input form to the canonical `<name>-ci` id.
    ///
    /// Raw `host:port` inputs are mapped back through the port scheme; a port
    /// outside the catalog is an [`FabricError::UnknownSpecialist`] error
    /// rather than a silently-passed opaque address.
    pub fn normalize(&self, name: &str) -> Result<SpecialistId, FabricError> {
        if let Some((_, port)) = split_endpoint(name) {
            return self
                .specialist_for_port(port)
                .ok_or_else(|| FabricError::UnknownSpecialist {
                    id: name.to_string(),
                });
        }
        self.spec_for(name).map(|spec| canonical_id(spec.name))
    }

    /// All specialists with their endpoints, in catalog order
    #[must_use]
    pub fn all_specialists(&self) -> Vec<(SpecialistId, Endpoint)> {
        CATALOG
            .iter()
            .map(|spec| {
                (
                    canonical_id(spec.name),
                    Endpoint {
                        host: self.host.clone(),
                        port: self.ai_port(spec),
                    },
                )
            })
            .collect()
    }

    /// The static catalog entry backing a specialist id
    pub fn catalog_entry(&self, id: &SpecialistId) -> Result<&'static ComponentSpec, FabricError> {
        self.spec_for(id.as_str())
    }

    /// The full static catalog, in order
    #[must_use]
    pub fn catalog(&self) -> &'static [ComponentSpec] {
        CATALOG
    }

    fn spec_for(&self, name: &str) -> Result<&'static ComponentSpec, FabricError> {
        let component = component_key(name);
        CATALOG
            .iter()
            .find(|spec| spec.name == component)
            .ok_or_else(|| FabricError::UnknownSpecialist {
                id: name.to_string(),
            })
    }
}

fn read_base(var: &str) -> Result<u16, FabricError> {
    let raw = std::env::var(var).map_err(|_| FabricError::Config {
        message: format!("{var} must be set; each Tekton instance has unique port ranges"),
    })?;
    raw.trim().parse::<u16>().map_err(|_| FabricError::Config {
        message: format!("{var}={raw} is not a valid port"),
    })
}

/// Canonical id for a catalog component name
fn canonical_id(component: &str) -> SpecialistId {
    SpecialistId::from_canonical(format!("{component}-ci"))
}

/// Reduces any accepted name form to the catalog's underscore key
fn component_key(name: &str) -> String {
    let trimmed = name.trim();
    let without_suffix = trimmed
        .strip_suffix("-ci")
        .or_else(|| trimmed.strip_suffix("_ci"))
        .unwrap_or(trimmed);
    without_suffix.replace('-', "_").to_ascii_lowercase()
}

/// Splits `host:port` input, returning None for plain names
fn split_endpoint(name: &str) -> Option<(&str, u16)> {
    let (host, port) = name.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mapper() -> PortMapper {
        PortMapper::new(8000, 45000)
    }

    #[test]
    fn apollo_endpoint_follows_the_formula() {
        let endpoint = mapper().endpoint_for("apollo-ci").unwrap();
        assert_eq!(endpoint, Endpoint::localhost(45012));
    }

    #[test]
    fn bare_and_variant_names_normalize_to_canonical() {
        let m = mapper();
        for input in ["apollo", "apollo-ci", "Apollo", "apollo_ci"] {
            assert_eq!(m.normalize(input).unwrap().as_str(), "apollo-ci");
        }
        assert_eq!(m.normalize("tekton-core").unwrap().as_str(), "tekton_core-ci");
    }

    #[test]
    fn raw_endpoint_maps_back_to_canonical() {
        let m = mapper();
        assert_eq!(m.normalize("localhost:45012").unwrap().as_str(), "apollo-ci");
        assert!(matches!(
            m.normalize("localhost:46000"),
            Err(FabricError::UnknownSpecialist { .. })
        ));
    }

    #[test]
    fn unknown_name_is_a_hard_error() {
        assert!(matches!(
            mapper().endpoint_for("zeus-ci"),
            Err(FabricError::UnknownSpecialist { .. })
        ));
    }

    #[test]
    fn inverse_round_trips_for_every_catalog_entry() {
        let m = mapper();
        for spec in m.catalog() {
            let ai = m.ai_port(spec);
            assert_eq!(m.component_port_for_ai(ai), m.component_port(spec));
            assert_eq!(
                m.specialist_for_port(ai).unwrap().component(),
                spec.name
            );
        }
    }

    #[test]
    fn all_specialists_preserves_catalog_order() {
        let all = mapper().all_specialists();
        assert_eq!(all.len(), 18);
        assert_eq!(all[0].0.as_str(), "engram-ci");
        assert_eq!(all[0].1.port, 45000);
        assert_eq!(all.last().unwrap().1.port, 45080);
    }

    proptest! {
        /// ai_port = AI_PORT_BASE + (component_port - COMPONENT_PORT_BASE)
        /// holds for every catalog entry under arbitrary non-colliding bases.
        #[test]
        fn port_formula_holds(component_base in 1024u16..20_000, ai_base in 20_001u16..40_000) {
            let m = PortMapper::new(component_base, ai_base);
            for spec in m.catalog() {
                let component_port = m.component_port(spec);
                prop_assert_eq!(
                    m.ai_port(spec),
                    ai_base + (component_port - component_base)
                );
            }
        }

        /// The mapper is pure: repeated resolution yields identical endpoints.
        #[test]
        fn endpoint_resolution_is_deterministic(idx in 0usize..18) {
            let m = mapper();
            let spec = m.catalog()[idx];
            let a = m.endpoint_for(spec.name).unwrap();
            let b = m.endpoint_for(spec.name).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
