//! Content Write Debouncer
//!
//! Coalesces rapid content edits into one persisted write per node:
//! - Per-node quiet period: a node is written once no edit arrived for it
//!   within the window (default 300ms)
//! - Last-write-wins: a newer edit replaces the pending one and restarts the
//!   node's window
//! - `flush()` writes everything pending immediately
//! - Graceful shutdown flushes before the worker exits
//!
//! Content writes never touch edges, so the debouncer runs outside the
//! per-root structural lock.

use crate::services::error::ServiceError;
use crate::services::node_repository::NodeRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Destination of coalesced content writes
#[async_trait]
pub trait ContentSink: Send + Sync + 'static {
    async fn write_content(&self, node_id: &str, content: String) -> Result<(), ServiceError>;
}

#[async_trait]
impl ContentSink for NodeRepository {
    async fn write_content(&self, node_id: &str, content: String) -> Result<(), ServiceError> {
        self.update_content(node_id, content).await.map(|_| ())
    }
}

enum Command {
    Write { node_id: String, content: String },
    Flush(oneshot::Sender<usize>),
}

struct Pending {
    content: String,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    superseded: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Debouncer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebouncerStats {
    pub received: u64,
    /// Edits replaced by a newer edit before being written
    pub superseded: u64,
    pub persisted: u64,
    pub failed: u64,
}

/// Background coalescer for content-only writes
pub struct ContentDebouncer {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
    worker: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl ContentDebouncer {
    /// Spawn the worker task; `quiet` is the per-node debounce window
    pub fn new(sink: Arc<dyn ContentSink>, quiet: Duration) -> Self {
        tracing::info!("ContentDebouncer starting ({:?} quiet period)", quiet);

        let (command_tx, mut command_rx) = mpsc::channel::<Command>(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();

        let worker = tokio::spawn(async move {
            let mut pending: HashMap<String, Pending> = HashMap::new();
            loop {
                let next_deadline = pending.values().map(|p| p.deadline).min();
                let wake_at =
                    next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

                tokio::select! {
                    biased; // Check shutdown first

                    _ = shutdown_rx.recv() => {
                        tracing::info!("ContentDebouncer shutting down");
                        flush_all(&sink, &worker_counters, &mut pending).await;
                        break;
                    }

                    command = command_rx.recv() => match command {
                        Some(Command::Write { node_id, content }) => {
                            let entry = Pending { content, deadline: Instant::now() + quiet };
                            if pending.insert(node_id, entry).is_some() {
                                worker_counters.superseded.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Some(Command::Flush(reply)) => {
                            let written = flush_all(&sink, &worker_counters, &mut pending).await;
                            let _ = reply.send(written);
                        }
                        None => {
                            flush_all(&sink, &worker_counters, &mut pending).await;
                            break;
                        }
                    },

                    _ = sleep_until(wake_at), if next_deadline.is_some() => {
                        let now = Instant::now();
                        let due: Vec<String> = pending
                            .iter()
                            .filter(|(_, p)| p.deadline <= now)
                            .map(|(id, _)| id.clone())
                            .collect();
                        for node_id in due {
                            if let Some(entry) = pending.remove(&node_id) {
                                persist(&sink, &worker_counters, &node_id, entry.content).await;
                            }
                        }
                    }
                }
            }
        });

        Self {
            command_tx,
            shutdown_tx,
            worker,
            counters,
        }
    }

    /// Queue a content write for `node_id`, replacing any pending one
    pub async fn write(
        &self,
        node_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.command_tx
            .send(Command::Write {
                node_id: node_id.into(),
                content: content.into(),
            })
            .await
            .map_err(|_| ServiceError::ShutDown("content debouncer".to_string()))
    }

    /// Write every pending edit now, returning how many were persisted
    pub async fn flush(&self) -> Result<usize, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Flush(reply_tx))
            .await
            .map_err(|_| ServiceError::ShutDown("content debouncer".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ServiceError::ShutDown("content debouncer".to_string()))
    }

    pub fn stats(&self) -> DebouncerStats {
        DebouncerStats {
            received: self.counters.received.load(Ordering::Relaxed),
            superseded: self.counters.superseded.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Flush pending edits and stop the worker
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        let _ = self.shutdown_tx.send(()).await;
        self.worker
            .await
            .map_err(|err| ServiceError::ShutDown(format!("content debouncer worker: {}", err)))
    }
}

async fn persist(
    sink: &Arc<dyn ContentSink>,
    counters: &Counters,
    node_id: &str,
    content: String,
) -> bool {
    match sink.write_content(node_id, content).await {
        Ok(()) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Debounced content write for '{}' failed: {}", node_id, err);
            false
        }
    }
}

async fn flush_all(
    sink: &Arc<dyn ContentSink>,
    counters: &Counters,
    pending: &mut HashMap<String, Pending>,
) -> usize {
    let mut written = 0;
    for (node_id, entry) in pending.drain() {
        if persist(sink, counters, &node_id, entry.content).await {
            written += 1;
        }
    }
    written
}
