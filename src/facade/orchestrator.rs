//! Orchestrator facade
//!
//! Rhetor's vocabulary: inventory, hire/fire/reassign against the roster,
//! candidate search by role, and team chat — a broadcast followed by an
//! optional synthesis pass through a coordinator specialist.

#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use crate::discovery::{Discovery, SpecialistSummary};
use crate::domain_types::{Reply, RoleName, SpecialistId};
use crate::error::FabricError;
use crate::fabric::Fabric;
use crate::roster::{Performance, RosterEntry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Default coordinator for team chat synthesis
const DEFAULT_COORDINATOR: &str = "numa-ci";

/// Outcome of a team chat round
#[derive(Debug)]
pub struct TeamChatResult {
    /// Who was asked to synthesize
    pub coordinator: SpecialistId,
    /// One entry per addressed specialist
    pub responses: HashMap<String, Result<Reply, FabricError>>,
    /// The coordinator's synthesis, when one was produced
    pub summary: Option<String>,
}

/// Thin surface over the fabric for orchestrator-style clients
pub struct OrchestratorFacade {
    fabric: Arc<Fabric>,
    discovery: Arc<Discovery>,
}

impl OrchestratorFacade {
    /// Wraps a fabric and its discovery service
    #[must_use]
    pub fn new(fabric: Arc<Fabric>, discovery: Arc<Discovery>) -> Self {
        Self { fabric, discovery }
    }

    /// Inventory of catalog specialists, optionally filtered by role
    pub async fn list(&self, role: Option<&str>) -> Vec<SpecialistSummary> {
        self.discovery.list_specialists(role).await
    }

    /// Hires a specialist into the roster.
    ///
    /// The target must pass a health probe first; without an explicit role
    /// the catalog category is used. Idempotent for already-hired ids.
    pub async fn hire(
        &self,
        name: &str,
        role: Option<RoleName>,
    ) -> Result<RosterEntry, FabricError> {
        let id = self.fabric.mapper().normalize(name)?;
        let health = self.discovery.probe(&id).await;
        if !health.healthy {
            return Err(FabricError::UnhealthyTarget { id });
        }
        let role = match role {
            Some(role) => role,
            None => self.default_role(&id)?,
        };
        Ok(self.fabric.roster().hire(id, role))
    }

    /// Removes a specialist from the roster; false when it was not hired
    pub fn fire(&self, name: &str) -> Result<bool, FabricError> {
        let id = self.fabric.mapper().normalize(name)?;
        Ok(self.fabric.roster().fire(&id))
    }

    /// Changes a hired specialist's role
    pub fn reassign(&self, name: &str, role: RoleName) -> Result<RosterEntry, FabricError> {
        let id = self.fabric.mapper().normalize(name)?;
        self.fabric.roster().reassign(&id, role)
    }

    /// The current roster
    #[must_use]
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.fabric.roster().entries()
    }

    /// Performance counters for a hired specialist
    pub fn performance(&self, name: &str) -> Result<Performance, FabricError> {
        let id = self.fabric.mapper().normalize(name)?;
        self.fabric
            .roster()
            .performance(&id)
            .ok_or(FabricError::NotHired { id })
    }

    /// Healthy specialists that can fill a role: rostered ones with that
    /// role first, then catalog entries whose category matches.
    pub async fn find_candidates(&self, role: &str) -> Vec<SpecialistId> {
        let mut candidates = Vec::new();

        for entry in self.fabric.roster().entries() {
            if entry.role.to_string() == role
                && self.discovery.probe(&entry.specialist_id).await.healthy
            {
                candidates.push(entry.specialist_id);
            }
        }

        for spec in self.fabric.mapper().catalog() {
            if spec.category != role {
                continue;
            }
            let Ok(id) = self.fabric.mapper().normalize(spec.name) else {
                continue;
            };
            if candidates.contains(&id) {
                continue;
            }
            if self.discovery.probe(&id).await.healthy {
                candidates.push(id);
            }
        }

        candidates
    }

    /// Broadcasts `body` to the targets (or to every healthy specialist
    /// when none are named), then asks the coordinator to synthesize the
    /// successful responses. The coordinator's own broadcast response, if it
    /// was a target, is not fed back into its own synthesis input.
    pub async fn team_chat(
        &self,
        targets: &[String],
        body: &str,
        coordinator: Option<&str>,
    ) -> Result<TeamChatResult, FabricError> {
        let coordinator = self
            .fabric
            .mapper()
            .normalize(coordinator.unwrap_or(DEFAULT_COORDINATOR))?;

        let targets: Vec<String> = if targets.is_empty() {
            self.healthy_targets().await
        } else {
            targets.to_vec()
        };
        if targets.is_empty() {
            return Err(FabricError::InvalidArgument {
                message: "no healthy specialists available for team chat".to_string(),
            });
        }

        let deadline = self.fabric.config().default_deadline();
        let responses = self.fabric.broadcast(&targets, body, deadline).await?;

        let mut synthesis_input = BTreeMap::new();
        for (target, result) in &responses {
            let Ok(reply) = result else { continue };
            let is_coordinator = self
                .fabric
                .mapper()
                .normalize(target)
                .is_ok_and(|id| id == coordinator);
            if !is_coordinator {
                synthesis_input.insert(target.clone(), reply.content.clone());
            }
        }

        let summary = if synthesis_input.is_empty() {
            None
        } else {
            self.synthesize(&coordinator, body, &synthesis_input).await
        };

        Ok(TeamChatResult {
            coordinator,
            responses,
            summary,
        })
    }

    async fn synthesize(
        &self,
        coordinator: &SpecialistId,
        topic: &str,
        responses: &BTreeMap<String, String>,
    ) -> Option<String> {
        let rendered = serde_json::to_string_pretty(responses).ok()?;
        let prompt = format!(
            "As the team coordinator, please synthesize these responses to: \
             \"{topic}\"\n\nResponses:\n{rendered}\n\nProvide a unified response \
             that combines the key insights."
        );
        match self.fabric.send(coordinator.as_str(), &prompt).await {
            Ok(reply) => Some(reply.content),
            Err(err) => {
                warn!(coordinator = %coordinator, error = %err, "team chat synthesis failed");
                None
            }
        }
    }

    async fn healthy_targets(&self) -> Vec<String> {
        self.discovery
            .list_specialists(None)
            .await
            .into_iter()
            .filter(|summary| summary.healthy == Some(true))
            .map(|summary| summary.id.as_str().to_string())
            .collect()
    }

    fn default_role(&self, id: &SpecialistId) -> Result<RoleName, FabricError> {
        let spec = self.fabric.mapper().catalog_entry(id)?;
        RoleName::try_new(spec.category.to_string()).map_err(|err| FabricError::Config {
            message: format!("catalog category for {id} is unusable as a role: {err}"),
        })
    }
}
