//! The process-wide fabric
//!
//! Coordinates every specialist channel behind one surface: `send` with
//! overlay routing, fan-out `broadcast`/`collect`, channel lifecycle, roster
//! counter updates and observer notification. The fabric itself does no
//! wire I/O — channels own their sockets; the fabric's channel map is held
//! under a short lock used only for lookup and creation.

#![allow(clippy::missing_errors_doc)]

use crate::channel::{ChannelState, SpecialistChannel};
use crate::domain_types::{Reply, SpecialistId};
use crate::error::FabricError;
use crate::fabric::config::FabricConfig;
use crate::forwarding::{ForwardingOverlay, Route, TerminalInbox, format_for_terminal};
use crate::observability::{FabricObserver, ObserverSet};
use crate::ports::PortMapper;
use crate::roster::Roster;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{Instant, timeout};
use tracing::{info, warn};

/// The messaging fabric: registry of specialist channels plus the routing,
/// roster and observability layers that sit on top of them.
///
/// Constructed once by the application entry point and passed explicitly to
/// client facades; safe for concurrent use from any number of callers.
pub struct Fabric {
    config: FabricConfig,
    mapper: Arc<PortMapper>,
    channels: DashMap<SpecialistId, Arc<SpecialistChannel>>,
    overlay: ForwardingOverlay,
    roster: Roster,
    observers: Arc<ObserverSet>,
    inbox: OnceLock<Arc<dyn TerminalInbox>>,
}

impl Fabric {
    /// Creates the fabric. Channels are dialed lazily on first send; the
    /// forwarding overlay is loaded from its store immediately.
    #[must_use]
    pub fn new(config: FabricConfig, mapper: PortMapper) -> Self {
        let overlay =
            ForwardingOverlay::load(config.forward_store_path.clone(), config.max_forward_hops);
        Self {
            config,
            mapper: Arc::new(mapper),
            channels: DashMap::new(),
            overlay,
            roster: Roster::new(),
            observers: Arc::new(ObserverSet::default()),
            inbox: OnceLock::new(),
        }
    }

    /// The port mapper backing this fabric
    #[must_use]
    pub fn mapper(&self) -> &PortMapper {
        &self.mapper
    }

    /// The fabric's configuration
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// The forwarding overlay
    #[must_use]
    pub fn overlay(&self) -> &ForwardingOverlay {
        &self.overlay
    }

    /// The orchestrator's roster
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Attaches an observer for send completions and channel state changes
    pub fn add_observer(&self, observer: Arc<dyn FabricObserver>) {
        self.observers.add(observer);
    }

    /// Wires in the terminal-inbox collaborator used by forwarding entries
    /// with terminal destinations. Without one, such entries fall open to
    /// the underlying specialist.
    pub fn set_terminal_inbox(&self, inbox: Arc<dyn TerminalInbox>) {
        if self.inbox.set(inbox).is_err() {
            warn!("terminal inbox already wired; ignoring replacement");
        }
    }

    /// Sends one prompt with the configured default deadline
    pub async fn send(&self, name: &str, body: &str) -> Result<Reply, FabricError> {
        self.send_with_deadline(name, body, self.config.default_deadline())
            .await
    }

    /// Sends one prompt and awaits the reply.
    ///
    /// The name is normalized, the forwarding overlay applied, and the
    /// endpoint resolved through the port scheme. Successive sends from one
    /// caller to one specialist complete in submission order.
    pub async fn send_with_deadline(
        &self,
        name: &str,
        body: &str,
        deadline: Duration,
    ) -> Result<Reply, FabricError> {
        let id = self.mapper.normalize(name)?;
        self.overlay.maybe_reload();
        match self.overlay.resolve(&id, &self.mapper)? {
            Route::Direct(target) => self.dispatch(&target, body, deadline).await,
            Route::Terminal {
                source,
                terminal,
                format,
            } => {
                if let Some(delivered) = self.deliver_to_terminal(&source, &terminal, body, format).await {
                    return Ok(delivered);
                }
                // Fail-open: the human diversion did not work out, so the
                // specialist gets the message after all.
                self.dispatch(&source, body, deadline).await
            }
        }
    }

    /// Fans one body out to many specialists, aggregating one result per
    /// addressed id. Individual failures (including per-target deadlines)
    /// become typed error entries and never block peers; only an empty
    /// target set fails the broadcast itself.
    pub async fn broadcast(
        &self,
        targets: &[String],
        body: &str,
        deadline: Duration,
    ) -> Result<HashMap<String, Result<Reply, FabricError>>, FabricError> {
        let mut stream = self.collect(targets, body, deadline)?;
        let mut results = HashMap::new();
        while let Some((target, result)) = stream.next().await {
            results.insert(target, result);
        }
        Ok(results)
    }

    /// Like [`Fabric::broadcast`] but yields each completion as it arrives.
    ///
    /// Every addressed id is yielded exactly once; targets still unresolved
    /// when the aggregate deadline (per-target deadline plus coordinator
    /// slack) passes are yielded as `Timeout` entries.
    pub fn collect<'a>(
        &'a self,
        targets: &[String],
        body: &'a str,
        deadline: Duration,
    ) -> Result<
        impl Stream<Item = (String, Result<Reply, FabricError>)> + 'a,
        FabricError,
    > {
        if targets.is_empty() {
            return Err(FabricError::InvalidArgument {
                message: "broadcast requires at least one target".to_string(),
            });
        }
        let mut seen = HashSet::new();
        let unique: Vec<String> = targets
            .iter()
            .filter(|target| seen.insert(target.as_str()))
            .cloned()
            .collect();

        let aggregate_deadline = deadline + self.config.broadcast_slack_ms.as_duration();
        let tasks: FuturesUnordered<_> = unique
            .into_iter()
            .map(move |target| async move {
                let outcome = timeout(
                    aggregate_deadline,
                    self.send_with_deadline(&target, body, deadline),
                )
                .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(FabricError::Timeout {
                        id: SpecialistId::from_canonical(target.clone()),
                        deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    }),
                };
                (target, result)
            })
            .collect();
        Ok(tasks)
    }

    /// Current lifecycle state of a specialist's channel, if one exists
    #[must_use]
    pub fn channel_state(&self, id: &SpecialistId) -> Option<ChannelState> {
        self.channels.get(id).map(|channel| channel.state())
    }

    /// Number of channels created so far
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drains every channel and discards the registry. In-flight and queued
    /// requests fail with `ChannelClosed`.
    pub async fn close(&self) {
        let channels: Vec<_> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.channels.clear();
        for channel in channels {
            channel.close().await;
        }
        info!("fabric closed");
    }

    async fn deliver_to_terminal(
        &self,
        source: &SpecialistId,
        terminal: &crate::domain_types::TerminalName,
        body: &str,
        format: crate::forwarding::ForwardFormat,
    ) -> Option<Reply> {
        let Some(inbox) = self.inbox.get() else {
            warn!(source = %source, terminal = %terminal,
                  "no terminal inbox collaborator wired; falling back to specialist");
            return None;
        };
        let started = Instant::now();
        let message = format_for_terminal(source, body, format);
        if inbox.deliver(terminal, &message).await {
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.roster.record_outcome(source, true, latency_ms);
            self.observers.send_completed(source, latency_ms, true);
            return Some(Reply {
                content: format!("Message forwarded to {terminal}"),
                latency_ms,
            });
        }
        warn!(source = %source, terminal = %terminal,
              "terminal inbox delivery failed; falling back to specialist");
        None
    }

    /// Delivers to the specialist's channel, creating it on first use
    async fn dispatch(
        &self,
        id: &SpecialistId,
        body: &str,
        deadline: Duration,
    ) -> Result<Reply, FabricError> {
        let channel = self.channel(id)?;
        let started = Instant::now();
        let result = channel.request(body.to_string(), deadline).await;

        let (ok, latency_ms) = match &result {
            Ok(reply) => (true, reply.latency_ms),
            Err(_) => (
                false,
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ),
        };
        self.roster.record_outcome(id, ok, latency_ms);
        self.observers.send_completed(id, latency_ms, ok);
        result
    }

    fn channel(&self, id: &SpecialistId) -> Result<Arc<SpecialistChannel>, FabricError> {
        if let Some(channel) = self.channels.get(id) {
            return Ok(Arc::clone(&channel));
        }
        let endpoint = self.mapper.endpoint_for(id.as_str())?;
        let channel = self
            .channels
            .entry(id.clone())
            .or_insert_with(|| {
                SpecialistChannel::spawn(
                    id.clone(),
                    endpoint,
                    self.config.channel_settings(),
                    Arc::clone(&self.observers),
                )
            })
            .clone();
        Ok(channel)
    }
}
