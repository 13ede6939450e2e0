//! Rhetor's specialist roster
//!
//! A per-process table of "hired" specialists with role labels and
//! lightweight performance counters. Deliberately non-durable: the roster is
//! created empty and discarded at shutdown, and the core offers no
//! persistence hook — a caller wanting snapshots owns them and reads the
//! public API. Counters are statistics, not ledger entries; they are
//! eventually consistent with respect to concurrent sends.

#![allow(
    clippy::cast_precision_loss,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

use crate::domain_types::{RoleName, SpecialistId};
use crate::error::FabricError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Lightweight per-specialist request counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Performance {
    /// Sends addressed to this specialist while rostered
    pub requests: u64,
    /// Sends that completed with a reply
    pub successes: u64,
    /// Sends that completed with an error
    pub failures: u64,
    /// Running mean of wire latency over completed sends
    pub avg_response_time_ms: f64,
}

/// One hired specialist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The hired specialist
    pub specialist_id: SpecialistId,
    /// Current role label
    pub role: RoleName,
    /// When the specialist was hired
    pub hired_at: DateTime<Utc>,
    /// When the role was last changed, if ever
    pub reassigned_at: Option<DateTime<Utc>>,
    /// Request counters maintained by the fabric
    pub performance: Performance,
}

/// The in-memory roster table
#[derive(Default)]
pub struct Roster {
    entries: RwLock<HashMap<SpecialistId, RosterEntry>>,
    dirty: AtomicBool,
}

impl Roster {
    /// Creates an empty roster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a specialist to the roster. Idempotent: hiring an already-hired
    /// specialist returns its existing entry unchanged.
    pub fn hire(&self, id: SpecialistId, role: RoleName) -> RosterEntry {
        let Ok(mut entries) = self.entries.write() else {
            return placeholder_entry(id, role);
        };
        if let Some(existing) = entries.get(&id) {
            return existing.clone();
        }
        let entry = RosterEntry {
            specialist_id: id.clone(),
            role: role.clone(),
            hired_at: Utc::now(),
            reassigned_at: None,
            performance: Performance::default(),
        };
        entries.insert(id.clone(), entry.clone());
        drop(entries);
        self.dirty.store(true, Ordering::SeqCst);
        info!(specialist = %id, role = %role, "hired CI specialist");
        entry
    }

    /// Removes a specialist. Returns false (a no-op) when it was not hired.
    pub fn fire(&self, id: &SpecialistId) -> bool {
        let removed = self
            .entries
            .write()
            .is_ok_and(|mut entries| entries.remove(id).is_some());
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
            info!(specialist = %id, "fired CI specialist");
        }
        removed
    }

    /// Changes a hired specialist's role
    pub fn reassign(&self, id: &SpecialistId, role: RoleName) -> Result<RosterEntry, FabricError> {
        let updated = {
            let mut entries = self.entries.write().map_err(|_| FabricError::NotHired {
                id: id.clone(),
            })?;
            let entry = entries.get_mut(id).ok_or_else(|| FabricError::NotHired {
                id: id.clone(),
            })?;
            entry.role = role;
            entry.reassigned_at = Some(Utc::now());
            entry.clone()
        };
        self.dirty.store(true, Ordering::SeqCst);
        info!(specialist = %id, role = %updated.role, "reassigned CI specialist");
        Ok(updated)
    }

    /// All current entries, sorted by specialist id
    #[must_use]
    pub fn entries(&self) -> Vec<RosterEntry> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .map_or_else(|_| Vec::new(), |entries| entries.values().cloned().collect());
        all.sort_by(|a, b| a.specialist_id.as_str().cmp(b.specialist_id.as_str()));
        all
    }

    /// Whether the specialist is currently hired
    #[must_use]
    pub fn contains(&self, id: &SpecialistId) -> bool {
        self.entries
            .read()
            .is_ok_and(|entries| entries.contains_key(id))
    }

    /// Performance counters for a hired specialist
    #[must_use]
    pub fn performance(&self, id: &SpecialistId) -> Option<Performance> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(id).map(|entry| entry.performance))
    }

    /// Records one completed send for a rostered specialist. Called by the
    /// fabric after every user-visible completion; silently ignored for
    /// specialists that are not hired.
    pub(crate) fn record_outcome(&self, id: &SpecialistId, ok: bool, latency_ms: u64) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        let Some(entry) = entries.get_mut(id) else {
            return;
        };
        let perf = &mut entry.performance;
        perf.requests += 1;
        if ok {
            perf.successes += 1;
        } else {
            perf.failures += 1;
        }
        let completed = perf.successes + perf.failures;
        if completed > 0 {
            let n = completed as f64;
            perf.avg_response_time_ms += (latency_ms as f64 - perf.avg_response_time_ms) / n;
        }
    }

    /// Takes the config-dirty flag, clearing it. External observers poll
    /// this to learn that the roster changed since they last looked.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

fn placeholder_entry(id: SpecialistId, role: RoleName) -> RosterEntry {
    RosterEntry {
        specialist_id: id,
        role,
        hired_at: Utc::now(),
        reassigned_at: None,
        performance: Performance::default(),
    }
}
