//! Specialist channel: one connection, one queue, one CI
//!
//! Each specialist gets exactly one channel owning exactly one TCP
//! connection and a bounded FIFO of pending requests. The channel writes one
//! frame, reads one frame, completes one waiter, and only then touches the
//! next request — strict request/response correlation without wire-level
//! correlation ids.
//!
//! The connection is established lazily and re-established on demand after a
//! failure, at most one dial attempt per send. On a response deadline the
//! socket is closed and reopened: a late reply to a timed-out frame would
//! desynchronize every exchange after it.

#![allow(clippy::module_name_repetitions)]

use crate::codec::{self, WireReply, WireRequest};
use crate::domain_types::{Endpoint, QueueCapacity, Reply, RequestId, SpecialistId};
use crate::error::FabricError;
use crate::observability::ObserverSet;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, trace, warn};

/// Connection lifecycle states of a specialist channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection; next send will dial
    Disconnected,
    /// Dial in progress
    Connecting,
    /// Connected, no request on the wire
    Idle,
    /// Exactly one request awaiting its response
    InFlight,
    /// Channel is shutting down; pendings fail with `ChannelClosed`
    Draining,
    /// A wire failure was observed; socket released on next use
    Failed,
}

/// Tunables a channel is spawned with, derived from the fabric config
#[derive(Debug, Clone)]
pub(crate) struct ChannelSettings {
    pub queue_capacity: QueueCapacity,
    pub connect_timeout: Duration,
    pub frame_limit: usize,
    /// Ceiling on time spent waiting in the FIFO before the request is
    /// failed without touching the wire. `None` means "same as the
    /// request's own deadline".
    pub queue_wait_slo: Option<Duration>,
}

/// One queued request together with its single-use completion handle
struct Pending {
    id: RequestId,
    body: String,
    deadline: Duration,
    enqueued_at: Instant,
    done: oneshot::Sender<Result<Reply, FabricError>>,
}

/// The per-specialist single-flight request pipeline.
///
/// Cheap to share; all I/O happens on the owned worker task.
pub struct SpecialistChannel {
    id: SpecialistId,
    endpoint: Endpoint,
    tx: mpsc::Sender<Pending>,
    shutdown: Arc<Notify>,
    state: Arc<StateCell>,
    worker: Mutex<Option<JoinHandle<()>>>,
    completed_exchanges: AtomicU64,
}

impl SpecialistChannel {
    /// Spawns the channel and its I/O worker. The connection is not dialed
    /// until the first request arrives.
    pub(crate) fn spawn(
        id: SpecialistId,
        endpoint: Endpoint,
        settings: ChannelSettings,
        observers: Arc<ObserverSet>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.as_usize());
        let shutdown = Arc::new(Notify::new());
        let state = Arc::new(StateCell::new(id.clone(), observers));

        let worker = Worker {
            id: id.clone(),
            endpoint: endpoint.clone(),
            settings,
            state: Arc::clone(&state),
            conn: None,
        };
        let handle = tokio::spawn(worker.run(rx, Arc::clone(&shutdown)));

        Arc::new(Self {
            id,
            endpoint,
            tx,
            shutdown,
            state,
            worker: Mutex::new(Some(handle)),
            completed_exchanges: AtomicU64::new(0),
        })
    }

    /// The specialist this channel serves
    #[must_use]
    pub fn id(&self) -> &SpecialistId {
        &self.id
    }

    /// The endpoint this channel dials
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// Number of completed wire exchanges since the channel was spawned
    #[must_use]
    pub fn completed_exchanges(&self) -> u64 {
        self.completed_exchanges.load(Ordering::Relaxed)
    }

    /// Enqueues a request and awaits its completion.
    ///
    /// Fails immediately with `QueueFull` when the FIFO is at capacity; no
    /// blocking backpressure on producers. The deadline bounds on-wire time
    /// only — queue wait is governed by the channel's queue-wait SLO.
    pub(crate) async fn request(
        &self,
        body: String,
        deadline: Duration,
    ) -> Result<Reply, FabricError> {
        let (done, rx) = oneshot::channel();
        let pending = Pending {
            id: RequestId::generate(),
            body,
            deadline,
            enqueued_at: Instant::now(),
            done,
        };
        trace!(specialist = %self.id, request = %pending.id, "enqueue");

        match self.tx.try_send(pending) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                return Err(FabricError::QueueFull {
                    id: self.id.clone(),
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(FabricError::ChannelClosed {
                    id: self.id.clone(),
                });
            }
        }

        let result = rx.await.unwrap_or_else(|_| {
            Err(FabricError::ChannelClosed {
                id: self.id.clone(),
            })
        });
        if result.is_ok() {
            self.completed_exchanges.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Drains all pending requests with `ChannelClosed` and releases the
    /// connection. Terminal: a closed channel never accepts another request.
    pub(crate) async fn close(&self) {
        self.shutdown.notify_one();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(specialist = %self.id, error = %err, "channel worker ended abnormally");
            }
        }
    }
}

/// State holder that reports every transition to the observer set
pub(crate) struct StateCell {
    id: SpecialistId,
    current: std::sync::Mutex<ChannelState>,
    observers: Arc<ObserverSet>,
}

impl StateCell {
    fn new(id: SpecialistId, observers: Arc<ObserverSet>) -> Self {
        Self {
            id,
            current: std::sync::Mutex::new(ChannelState::Disconnected),
            observers,
        }
    }

    fn get(&self) -> ChannelState {
        self.current
            .lock()
            .map_or(ChannelState::Failed, |state| *state)
    }

    fn set(&self, new: ChannelState) {
        let old = {
            let Ok(mut current) = self.current.lock() else {
                return;
            };
            let old = *current;
            if old == new {
                return;
            }
            *current = new;
            old
        };
        self.observers.state_changed(&self.id, old, new);
    }
}

/// The I/O worker owning the socket and consuming the FIFO
struct Worker {
    id: SpecialistId,
    endpoint: Endpoint,
    settings: ChannelSettings,
    state: Arc<StateCell>,
    conn: Option<Framed<TcpStream, LinesCodec>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Pending>, shutdown: Arc<Notify>) {
        loop {
            let pending = tokio::select! {
                biased;
                () = shutdown.notified() => break,
                next = rx.recv() => match next {
                    Some(pending) => pending,
                    None => break,
                },
            };
            self.serve(pending).await;
        }
        self.drain(rx).await;
    }

    async fn serve(&mut self, pending: Pending) {
        // Queue-wait SLO: a request starved behind a slow peer fails here
        // without ever touching the wire.
        let slo = self.settings.queue_wait_slo.unwrap_or(pending.deadline);
        if pending.enqueued_at.elapsed() > slo {
            complete(
                &self.id,
                pending,
                Err(FabricError::Timeout {
                    id: self.id.clone(),
                    deadline_ms: u64::try_from(slo.as_millis()).unwrap_or(u64::MAX),
                }),
            );
            return;
        }

        // A failure observed on the previous exchange leaves the channel
        // cold; release it before dialing again.
        if self.state.get() == ChannelState::Failed {
            self.state.set(ChannelState::Disconnected);
        }

        // Connect on demand: at most one dial attempt per send.
        if self.conn.is_none() {
            self.state.set(ChannelState::Connecting);
            match self.dial().await {
                Ok(framed) => {
                    self.state.set(ChannelState::Idle);
                    self.conn = Some(framed);
                }
                Err(reason) => {
                    self.state.set(ChannelState::Disconnected);
                    complete(
                        &self.id,
                        pending,
                        Err(FabricError::Unreachable {
                            id: self.id.clone(),
                            reason,
                        }),
                    );
                    return;
                }
            }
        }

        let Some(mut framed) = self.conn.take() else {
            return;
        };
        self.state.set(ChannelState::InFlight);
        let (result, reusable) = Self::exchange(&self.id, &mut framed, &pending).await;
        if reusable {
            self.conn = Some(framed);
            self.state.set(ChannelState::Idle);
        } else {
            drop(framed);
            self.state.set(ChannelState::Failed);
        }
        complete(&self.id, pending, result);
    }

    /// One write-then-read exchange. Returns the outcome and whether the
    /// connection is still aligned and safe to reuse.
    async fn exchange(
        id: &SpecialistId,
        framed: &mut Framed<TcpStream, LinesCodec>,
        pending: &Pending,
    ) -> (Result<Reply, FabricError>, bool) {
        let frame = match codec::encode(&WireRequest::Chat {
            content: &pending.body,
        }) {
            Ok(frame) => frame,
            Err(err) => {
                // Nothing went on the wire; the connection stays aligned.
                return (
                    Err(FabricError::Protocol {
                        id: id.clone(),
                        reason: err.to_string(),
                    }),
                    true,
                );
            }
        };

        if let Err(err) = framed.send(frame).await {
            return (
                Err(FabricError::Transport {
                    id: id.clone(),
                    reason: err.to_string(),
                }),
                false,
            );
        }

        // The response deadline starts at frame write, not at enqueue.
        let wrote_at = Instant::now();
        match timeout(pending.deadline, framed.next()).await {
            Err(_) => (
                Err(FabricError::Timeout {
                    id: id.clone(),
                    deadline_ms: u64::try_from(pending.deadline.as_millis()).unwrap_or(u64::MAX),
                }),
                false,
            ),
            Ok(None) => (
                Err(FabricError::Transport {
                    id: id.clone(),
                    reason: "connection closed by specialist".to_string(),
                }),
                false,
            ),
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => (
                Err(FabricError::Protocol {
                    id: id.clone(),
                    reason: "frame exceeds size limit".to_string(),
                }),
                false,
            ),
            Ok(Some(Err(LinesCodecError::Io(err)))) => (
                Err(FabricError::Transport {
                    id: id.clone(),
                    reason: err.to_string(),
                }),
                false,
            ),
            Ok(Some(Ok(line))) => {
                let latency_ms =
                    u64::try_from(wrote_at.elapsed().as_millis()).unwrap_or(u64::MAX);
                match codec::decode(&line) {
                    Ok(reply) => {
                        let content = match reply {
                            WireReply::Chat { body } => body,
                            WireReply::Info(info) => info.raw.to_string(),
                            WireReply::Other(value) => value.to_string(),
                        };
                        (Ok(Reply { content, latency_ms }), true)
                    }
                    Err(err) => (
                        Err(FabricError::Protocol {
                            id: id.clone(),
                            reason: err.to_string(),
                        }),
                        false,
                    ),
                }
            }
        }
    }

    async fn dial(&self) -> Result<Framed<TcpStream, LinesCodec>, String> {
        debug!(specialist = %self.id, endpoint = %self.endpoint, "dialing");
        let connect = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port));
        match timeout(self.settings.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(Framed::new(stream, codec::framer(self.settings.frame_limit)))
            }
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "connect timed out after {}ms",
                self.settings.connect_timeout.as_millis()
            )),
        }
    }

    async fn drain(mut self, mut rx: mpsc::Receiver<Pending>) {
        self.state.set(ChannelState::Draining);
        self.conn = None;
        rx.close();
        while let Some(pending) = rx.recv().await {
            complete(
                &self.id,
                pending,
                Err(FabricError::ChannelClosed {
                    id: self.id.clone(),
                }),
            );
        }
    }
}

fn complete(id: &SpecialistId, pending: Pending, result: Result<Reply, FabricError>) {
    let request = pending.id;
    if pending.done.send(result).is_err() {
        // The waiter gave up (e.g. a broadcast that already returned). The
        // exchange still ran to completion so the wire stays aligned.
        debug!(specialist = %id, request = %request, "waiter gone; response discarded");
    }
}
