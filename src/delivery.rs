//! Delivery: handing converted documents to the user.
//!
//! Some hosts drop or block downloads triggered in quick succession, so the
//! [`DeliveryQueue`] supports two modes (see [`DeliveryMode`]):
//!
//! * **Staggered**: documents are held until [`DeliveryQueue::flush`], then
//!   released together with the first triggered at once and each following
//!   one a fixed stagger later.
//! * **Serialized**: documents enter a FIFO drained by a single worker task.
//!   The worker delivers the head, waits the inter-item delay, then takes the
//!   next; it exits when the queue is empty and the next [`push`] restarts it.
//!   Starting the worker is decided under the same lock the worker uses to
//!   observe an empty queue, so there is never more than one.
//!
//! [`push`]: DeliveryQueue::push

use crate::config::DeliveryMode;
use crate::error::{Any2PdfError, DeliveryError};
use crate::output::ConvertedDocument;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Where finished documents go.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    async fn deliver(&self, document: &ConvertedDocument) -> Result<(), DeliveryError>;
}

/// Writes each document into a directory, never overwriting existing files.
///
/// A name that is taken gets a ` (n)` suffix: `a_converted (1).pdf`,
/// `a_converted (2).pdf`, …. Each file is written to a temporary sibling and
/// atomically renamed into place.
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    /// Target an existing directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create `dir` (and parents) if needed, then target it.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, Any2PdfError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Any2PdfError::OutputWriteFailed {
                path: dir.clone(),
                source: e,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DeliveryTarget for DirectoryTarget {
    async fn deliver(&self, document: &ConvertedDocument) -> Result<(), DeliveryError> {
        let dir = self.dir.clone();
        let stem = document.suggested_file_name.clone();
        let bytes = Arc::clone(&document.bytes);
        let name = document.file_name();

        let written = tokio::task::spawn_blocking(move || write_unique(&dir, &stem, &bytes))
            .await
            .map_err(|e| DeliveryError::Rejected {
                name: name.clone(),
                reason: format!("writer task panicked: {e}"),
            })?
            .map_err(|source| DeliveryError::WriteFailed {
                name: name.clone(),
                source,
            })?;

        info!("Wrote {}", written.display());
        Ok(())
    }
}

/// Persist `bytes` as `<stem>.pdf` in `dir`, or the first free ` (n)` variant.
fn write_unique(dir: &Path, stem: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    let mut n = 0u32;
    loop {
        let candidate = if n == 0 {
            dir.join(format!("{stem}.pdf"))
        } else {
            dir.join(format!("{stem} ({n}).pdf"))
        };
        match tmp.persist_noclobber(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                tmp = e.file;
                n += 1;
            }
            Err(e) => return Err(e.error),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    /// Documents accepted by the queue.
    pub queued: usize,
    /// Documents the target accepted.
    pub delivered: usize,
    /// Documents the target refused or failed to store.
    pub failed: usize,
}

#[derive(Default)]
struct QueueState {
    fifo: VecDeque<ConvertedDocument>,
    held: Vec<ConvertedDocument>,
    processing: bool,
    stats: DeliveryStats,
}

struct Shared {
    target: Arc<dyn DeliveryTarget>,
    mode: DeliveryMode,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // State stays consistent across a panic in a target; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn deliver_one(&self, document: ConvertedDocument) {
        debug!("Delivering {}", document.file_name());
        // A panicking target counts as a failed delivery; the worker must
        // survive it or `processing` stays set and the queue stalls.
        let outcome = AssertUnwindSafe(self.target.deliver(&document))
            .catch_unwind()
            .await;
        let mut state = self.lock();
        match outcome {
            Ok(Ok(())) => state.stats.delivered += 1,
            Ok(Err(e)) => {
                warn!("{}", e);
                state.stats.failed += 1;
            }
            Err(_) => {
                warn!("Delivery target panicked on {}", document.file_name());
                state.stats.failed += 1;
            }
        }
    }
}

/// Orders converted documents for handoff to a [`DeliveryTarget`].
///
/// The queue is scoped to one batch. Cloning yields another handle to the
/// same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    shared: Arc<Shared>,
}

impl DeliveryQueue {
    pub fn new(target: Arc<dyn DeliveryTarget>, mode: DeliveryMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                mode,
                state: Mutex::new(QueueState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.shared.mode
    }

    /// Accept a finished document.
    ///
    /// In serialized mode this starts the worker if it is idle, so it must be
    /// called from within a Tokio runtime. In staggered mode the document is
    /// held until the next [`flush`](Self::flush).
    pub fn push(&self, document: ConvertedDocument) {
        let mut state = self.shared.lock();
        state.stats.queued += 1;
        match self.shared.mode {
            DeliveryMode::Staggered { .. } => state.held.push(document),
            DeliveryMode::Serialized { delay_ms } => {
                state.fifo.push_back(document);
                if !state.processing {
                    state.processing = true;
                    drop(state);
                    debug!("Starting delivery worker");
                    tokio::spawn(run_worker(
                        Arc::clone(&self.shared),
                        Duration::from_millis(delay_ms),
                    ));
                }
            }
        }
    }

    /// Release every held document (staggered mode) and wait for them.
    ///
    /// In serialized mode documents are already flowing; this returns at once.
    pub async fn flush(&self) {
        let DeliveryMode::Staggered { stagger_ms } = self.shared.mode else {
            return;
        };
        let held = std::mem::take(&mut self.shared.lock().held);
        if held.is_empty() {
            return;
        }
        debug!("Releasing {} held documents", held.len());
        let stagger = Duration::from_millis(stagger_ms);
        join_all(held.into_iter().enumerate().map(|(i, doc)| {
            let shared = Arc::clone(&self.shared);
            async move {
                if i > 0 {
                    tokio::time::sleep(stagger * i as u32).await;
                }
                shared.deliver_one(doc).await;
            }
        }))
        .await;
    }

    /// Wait until the serialized worker drained the queue and exited.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.lock();
                if !state.processing && state.fifo.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.shared.lock().stats
    }
}

async fn run_worker(shared: Arc<Shared>, delay: Duration) {
    loop {
        let next = {
            let mut state = shared.lock();
            match state.fifo.pop_front() {
                Some(doc) => doc,
                None => {
                    state.processing = false;
                    drop(state);
                    debug!("Delivery queue drained");
                    shared.idle.notify_waiters();
                    return;
                }
            }
        };
        shared.deliver_one(next).await;
        tokio::time::sleep(delay).await;
    }
}
