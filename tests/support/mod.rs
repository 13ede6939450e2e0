//! Shared test harness: mock CI specialists speaking the newline-delimited
//! JSON protocol over real TCP listeners, plus fabric construction helpers.
#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tekton_fabric::{Fabric, FabricConfig, PortMapper};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Component port base used by every test fabric
pub const COMPONENT_BASE: u16 = 8000;

/// Catalog offsets the tests rely on
pub const APOLLO_OFFSET: u16 = 12;
pub const ATHENA_OFFSET: u16 = 5;
pub const NUMA_OFFSET: u16 = 16;

/// How a mock specialist answers chat frames
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Echo `content` back as `response` after the delay
    Echo { delay_ms: u64 },
    /// Echo with a prefix so tests can tell specialists apart
    EchoPrefixed {
        prefix: &'static str,
        delay_ms: u64,
    },
    /// Never answer anything, on any connection
    Silent,
    /// First connection never answers chat; later connections echo
    SilentOnce,
    /// First connection closes after reading one chat frame; later echo
    CloseOnce,
    /// First chat reply is an oversize junk line; later echo
    OversizeOnce { bytes: usize },
}

/// A TCP listener that behaves like a CI specialist
pub struct MockSpecialist {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl MockSpecialist {
    /// Starts a mock specialist on the given port
    pub async fn start(port: u16, behavior: Behavior) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap_or_else(|err| panic!("cannot bind mock specialist on {port}: {err}"));
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let conn_index = connections.fetch_add(1, Ordering::SeqCst);
                let log = Arc::clone(&log);
                tokio::spawn(handle_connection(stream, behavior, conn_index, log));
            }
        });

        Self {
            port,
            received,
            handle,
        }
    }

    /// The port this mock listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Chat bodies received so far, in wire order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for MockSpecialist {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    behavior: Behavior,
    conn_index: usize,
    log: Arc<Mutex<Vec<String>>>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut chats_on_conn = 0usize;

    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let message_type = value["type"].as_str().unwrap_or("chat");

        match message_type {
            "ping" => {
                if !matches!(behavior, Behavior::Silent)
                    && !(matches!(behavior, Behavior::SilentOnce) && conn_index == 0)
                {
                    write_frame(&mut write_half, &json!({"pong": true})).await;
                }
            }
            "info" => {
                write_frame(
                    &mut write_half,
                    &json!({"model_name": "mock-model", "capabilities": ["chat", "ping"]}),
                )
                .await;
            }
            _ => {
                let content = value["content"].as_str().unwrap_or("").to_string();
                log.lock().unwrap().push(content.clone());
                chats_on_conn += 1;

                match behavior {
                    Behavior::Echo { delay_ms } => {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        write_frame(&mut write_half, &json!({"response": content})).await;
                    }
                    Behavior::EchoPrefixed { prefix, delay_ms } => {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        write_frame(
                            &mut write_half,
                            &json!({"response": format!("{prefix}{content}")}),
                        )
                        .await;
                    }
                    Behavior::Silent => {}
                    Behavior::SilentOnce => {
                        if conn_index > 0 {
                            write_frame(&mut write_half, &json!({"response": content})).await;
                        }
                    }
                    Behavior::CloseOnce => {
                        if conn_index == 0 {
                            return;
                        }
                        write_frame(&mut write_half, &json!({"response": content})).await;
                    }
                    Behavior::OversizeOnce { bytes } => {
                        if conn_index == 0 && chats_on_conn == 1 {
                            let junk = "x".repeat(bytes);
                            let _ = write_half.write_all(junk.as_bytes()).await;
                            let _ = write_half.write_all(b"\n").await;
                            let _ = write_half.flush().await;
                        } else {
                            write_frame(&mut write_half, &json!({"response": content})).await;
                        }
                    }
                }
            }
        }
    }
}

async fn write_frame(write_half: &mut OwnedWriteHalf, value: &Value) {
    let mut frame = value.to_string();
    frame.push('\n');
    let _ = write_half.write_all(frame.as_bytes()).await;
    let _ = write_half.flush().await;
}

/// Picks an AI port base whose catalog range is very likely free, by taking
/// an ephemeral port from the OS.
pub async fn pick_ai_base() -> u16 {
    for _ in 0..16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let base = listener.local_addr().unwrap().port();
        drop(listener);
        // Leave room for the hephaestus offset at +80.
        if base < u16::MAX - 100 {
            return base;
        }
    }
    panic!("could not reserve a port base");
}

/// Fabric tuned for fast tests: short dial timeout, 2 s deadlines, probe
/// cache disabled so health checks always observe the current mock state.
pub fn test_config(dir: &tempfile::TempDir) -> FabricConfig {
    FabricConfig::builder()
        .connect_timeout_ms(tekton_fabric::domain_types::ConnectTimeoutMs::try_new(500).unwrap())
        .default_deadline_ms(
            tekton_fabric::domain_types::DefaultDeadlineMs::try_new(2000).unwrap(),
        )
        .probe_cache_ttl_ms(tekton_fabric::domain_types::ProbeCacheTtlMs::try_new(0).unwrap())
        .forward_store_path(dir.path().join("forwarding.json"))
        .build()
        .unwrap()
}

/// Builds a fabric whose catalog points at `ai_base`
pub fn fabric(ai_base: u16, dir: &tempfile::TempDir) -> Arc<Fabric> {
    Arc::new(Fabric::new(
        test_config(dir),
        PortMapper::new(COMPONENT_BASE, ai_base),
    ))
}
