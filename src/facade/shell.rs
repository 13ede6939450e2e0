//! Shell-style facade
//!
//! The vocabulary interactive users get through `aish`-style tooling:
//! send-by-name, platform-wide broadcast, and forward management. Names are
//! forgiving — hyphen/underscore variants and the `-ci` suffix are
//! normalized so nobody has to remember canonical ids at a prompt.

#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use crate::domain_types::{Reply, TerminalName};
use crate::error::FabricError;
use crate::fabric::Fabric;
use crate::forwarding::{ForwardEntry, ForwardFormat};
use std::collections::HashMap;
use std::sync::Arc;

/// Thin surface over the fabric for shell-style clients
pub struct ShellFacade {
    fabric: Arc<Fabric>,
}

impl ShellFacade {
    /// Wraps a fabric
    #[must_use]
    pub fn new(fabric: Arc<Fabric>) -> Self {
        Self { fabric }
    }

    /// Sends one prompt to a specialist addressed by any accepted name form
    pub async fn send_name(&self, name: &str, body: &str) -> Result<Reply, FabricError> {
        self.fabric.send(name, body).await
    }

    /// Sends one prompt to every specialist in the catalog
    pub async fn broadcast(
        &self,
        body: &str,
    ) -> Result<HashMap<String, Result<Reply, FabricError>>, FabricError> {
        let targets: Vec<String> = self
            .fabric
            .mapper()
            .all_specialists()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect();
        self.fabric
            .broadcast(&targets, body, self.fabric.config().default_deadline())
            .await
    }

    /// All forwarding entries, sorted by source
    #[must_use]
    pub fn list_forwards(&self) -> Vec<(String, ForwardEntry)> {
        self.fabric.overlay().list()
    }

    /// Diverts a specialist's traffic.
    ///
    /// The destination may be another specialist (any accepted name form) or
    /// a terminal. A `terminal:` prefix forces the terminal reading;
    /// otherwise a name that is not in the catalog is taken as a terminal,
    /// matching how operators type `forward apollo casey` at a prompt.
    pub fn set_forward(
        &self,
        name: &str,
        destination: &str,
        json: bool,
    ) -> Result<ForwardEntry, FabricError> {
        let source = self.fabric.mapper().normalize(name)?;
        let destination = self.resolve_destination(destination)?;
        let entry = ForwardEntry {
            destination,
            format: if json {
                ForwardFormat::JsonEnvelope
            } else {
                ForwardFormat::Plain
            },
        };
        self.fabric.overlay().set(&source, entry.clone())?;
        Ok(entry)
    }

    /// Stops diverting a specialist's traffic; false when nothing was set
    pub fn remove_forward(&self, name: &str) -> Result<bool, FabricError> {
        let source = self.fabric.mapper().normalize(name)?;
        self.fabric.overlay().remove(&source)
    }

    fn resolve_destination(&self, destination: &str) -> Result<String, FabricError> {
        if let Some(terminal) = destination.strip_prefix("terminal:") {
            let terminal = TerminalName::try_new(terminal.to_string()).map_err(|err| {
                FabricError::InvalidArgument {
                    message: format!("bad terminal name: {err}"),
                }
            })?;
            return Ok(format!("terminal:{terminal}"));
        }
        match self.fabric.mapper().normalize(destination) {
            Ok(specialist) => Ok(specialist.as_str().to_string()),
            Err(FabricError::UnknownSpecialist { .. }) => {
                let terminal = TerminalName::try_new(destination.to_string()).map_err(|err| {
                    FabricError::InvalidArgument {
                        message: format!("bad destination: {err}"),
                    }
                })?;
                Ok(format!("terminal:{terminal}"))
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fabric::FabricConfig;
    use crate::ports::PortMapper;

    fn facade(dir: &tempfile::TempDir) -> ShellFacade {
        let config = FabricConfig::builder()
            .forward_store_path(dir.path().join("forwarding.json"))
            .build()
            .unwrap();
        ShellFacade::new(Arc::new(Fabric::new(config, PortMapper::new(8000, 45000))))
    }

    #[test]
    fn set_forward_normalizes_specialist_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(&dir);
        let entry = facade.set_forward("apollo", "athena", false).unwrap();
        assert_eq!(entry.destination, "athena-ci");

        let forwards = facade.list_forwards();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].0, "apollo-ci");
    }

    #[test]
    fn unknown_destination_becomes_a_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(&dir);
        let entry = facade.set_forward("apollo", "casey", true).unwrap();
        assert_eq!(entry.destination, "terminal:casey");
        assert_eq!(entry.format, ForwardFormat::JsonEnvelope);
    }

    #[test]
    fn remove_forward_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let facade = facade(&dir);
        assert!(!facade.remove_forward("apollo").unwrap());
        facade.set_forward("apollo", "terminal:casey", false).unwrap();
        assert!(facade.remove_forward("apollo-ci").unwrap());
    }
}
