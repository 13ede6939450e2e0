//! Forwarding overlay
//!
//! A persisted redirection table consulted before every send. An entry
//! diverts one logical specialist's traffic either to another specialist or
//! to a human terminal's inbox. The table lives in a single human-editable
//! JSON file under the platform root; the in-memory copy is authoritative
//! between reloads and is refreshed whenever the file's mtime changes.
//!
//! Overlay trouble never fails a send: lookup failures, malformed files and
//! undeliverable terminal messages all fall open to the original specialist.

#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use crate::domain_types::{MaxForwardHops, SpecialistId, TerminalName};
use crate::error::FabricError;
use crate::ports::PortMapper;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::{debug, warn};

/// How a forwarded body is rendered for a terminal inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForwardFormat {
    /// `[source-ci] body`
    #[default]
    Plain,
    /// `{"from":"source-ci","body":"...","ts":"<iso8601>"}`
    JsonEnvelope,
}

/// One persisted overlay entry, keyed in the store by canonical source id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEntry {
    /// Another specialist id, or `terminal:<name>`
    pub destination: String,
    /// Rendering used for terminal destinations
    #[serde(default)]
    pub format: ForwardFormat,
}

/// Where a send actually goes after overlay resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Deliver to this specialist's channel
    Direct(SpecialistId),
    /// Divert to a terminal inbox, falling back to `source` on failure
    Terminal {
        /// The specialist whose entry named the terminal
        source: SpecialistId,
        /// Inbox to deliver into
        terminal: TerminalName,
        /// Rendering for the delivered message
        format: ForwardFormat,
    },
}

/// External collaborator that lands one formatted message in a named
/// terminal's inbox. Any non-true result triggers fail-open back to the
/// underlying specialist.
#[async_trait]
pub trait TerminalInbox: Send + Sync {
    /// Delivers `message` to `terminal`, reporting success
    async fn deliver(&self, terminal: &TerminalName, message: &str) -> bool;
}

type OverlayMap = HashMap<String, ForwardEntry>;

/// The overlay table plus its backing store
pub struct ForwardingOverlay {
    path: PathBuf,
    snapshot: RwLock<Arc<OverlayMap>>,
    last_modified: Mutex<Option<SystemTime>>,
    max_hops: MaxForwardHops,
}

impl ForwardingOverlay {
    /// Loads the overlay from `path`. A missing file is an empty overlay; a
    /// malformed one is reported and treated as empty (it will be retried on
    /// the next mtime change).
    pub fn load(path: impl Into<PathBuf>, max_hops: MaxForwardHops) -> Self {
        let path = path.into();
        let (map, modified) = read_store(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "forwarding store unreadable; starting empty");
            (OverlayMap::new(), None)
        });
        Self {
            path,
            snapshot: RwLock::new(Arc::new(map)),
            last_modified: Mutex::new(modified),
            max_hops,
        }
    }

    /// A point-in-time snapshot of the table
    #[must_use]
    pub fn snapshot(&self) -> Arc<OverlayMap> {
        self.snapshot
            .read()
            .map_or_else(|_| Arc::new(OverlayMap::new()), |guard| Arc::clone(&guard))
    }

    /// Re-reads the store if its mtime moved since the last load. Failures
    /// keep the previous overlay in place; the overlay must never take a
    /// send down with it.
    pub fn maybe_reload(&self) {
        let on_disk = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();
        let cached = self.last_modified.lock().ok().and_then(|guard| *guard);
        if on_disk != cached {
            if let Err(err) = self.reload() {
                warn!(path = %self.path.display(), error = %err, "forwarding reload failed; keeping previous overlay");
            }
        }
    }

    /// Unconditionally re-reads the store
    pub fn reload(&self) -> Result<(), FabricError> {
        let (map, modified) = read_store(&self.path).map_err(|err| FabricError::Config {
            message: format!("cannot reload {}: {err}", self.path.display()),
        })?;
        self.install(map, modified);
        debug!(path = %self.path.display(), "forwarding overlay reloaded");
        Ok(())
    }

    /// Adds or replaces an entry and persists the table atomically
    pub fn set(&self, source: &SpecialistId, entry: ForwardEntry) -> Result<(), FabricError> {
        let mut map = (*self.snapshot()).clone();
        map.insert(source.as_str().to_string(), entry);
        self.persist(map)
    }

    /// Removes an entry, reporting whether it existed
    pub fn remove(&self, source: &SpecialistId) -> Result<bool, FabricError> {
        let mut map = (*self.snapshot()).clone();
        let existed = map.remove(source.as_str()).is_some();
        if existed {
            self.persist(map)?;
        }
        Ok(existed)
    }

    /// All entries, sorted by source id
    #[must_use]
    pub fn list(&self) -> Vec<(String, ForwardEntry)> {
        let mut entries: Vec<_> = self
            .snapshot()
            .iter()
            .map(|(source, entry)| (source.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Resolves where traffic for `source` should actually go, walking
    /// specialist redirects up to the hop bound. Cycles are a first-class
    /// error; entries pointing at unknown specialists fall open to the last
    /// known-good hop.
    pub fn resolve(&self, source: &SpecialistId, mapper: &PortMapper) -> Result<Route, FabricError> {
        let map = self.snapshot();
        let mut current = source.clone();
        let mut visited = vec![current.as_str().to_string()];

        for _ in 0..self.max_hops.as_u8() {
            let Some(entry) = map.get(current.as_str()) else {
                return Ok(Route::Direct(current));
            };

            if let Some(terminal) = entry.destination.strip_prefix("terminal:") {
                return match TerminalName::try_new(terminal.to_string()) {
                    Ok(terminal) => Ok(Route::Terminal {
                        source: current,
                        terminal,
                        format: entry.format,
                    }),
                    Err(err) => {
                        warn!(source = %current, error = %err, "bad terminal destination; ignoring forward");
                        Ok(Route::Direct(current))
                    }
                };
            }

            let next = match mapper.normalize(&entry.destination) {
                Ok(next) => next,
                Err(err) => {
                    warn!(source = %current, destination = %entry.destination, error = %err,
                          "forward destination unknown; ignoring forward");
                    return Ok(Route::Direct(current));
                }
            };
            if visited.iter().any(|seen| seen == next.as_str()) {
                visited.push(next.as_str().to_string());
                return Err(FabricError::ForwardingLoop {
                    chain: visited.join(" -> "),
                });
            }
            visited.push(next.as_str().to_string());
            current = next;
        }

        Err(FabricError::ForwardingLoop {
            chain: visited.join(" -> "),
        })
    }

    fn persist(&self, map: OverlayMap) -> Result<(), FabricError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| FabricError::Config {
                message: format!("cannot create {}: {err}", parent.display()),
            })?;
        }
        let body = serde_json::to_string_pretty(&map).map_err(|err| FabricError::Config {
            message: format!("cannot serialize forwarding table: {err}"),
        })?;
        // Atomic replace so concurrent readers never observe a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|err| FabricError::Config {
            message: format!("cannot write {}: {err}", tmp.display()),
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|err| FabricError::Config {
            message: format!("cannot replace {}: {err}", self.path.display()),
        })?;

        let modified = std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok();
        self.install(map, modified);
        Ok(())
    }

    fn install(&self, map: OverlayMap, modified: Option<SystemTime>) {
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = Arc::new(map);
        }
        if let Ok(mut last) = self.last_modified.lock() {
            *last = modified;
        }
    }
}

/// Renders a forwarded body the way the destination terminal expects it
#[must_use]
pub fn format_for_terminal(source: &SpecialistId, body: &str, format: ForwardFormat) -> String {
    match format {
        ForwardFormat::Plain => format!("[{source}] {body}"),
        ForwardFormat::JsonEnvelope => serde_json::json!({
            "from": source.as_str(),
            "body": body,
            "ts": chrono::Utc::now().to_rfc3339(),
        })
        .to_string(),
    }
}

fn read_store(path: &Path) -> Result<(OverlayMap, Option<SystemTime>), std::io::Error> {
    if !path.exists() {
        return Ok((OverlayMap::new(), None));
    }
    let raw = std::fs::read_to_string(path)?;
    let map: OverlayMap = serde_json::from_str(&raw)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    Ok((map, modified))
}
