use crate::compose::{TicketScript, compose_outgoing};
use crate::error::StoreError;
use crate::message::{Message, decode_conversation, encode_conversation};
use crate::storage::KeyValueStore;
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

const NOTICE_CAPACITY: usize = 16;

static CLAIMED_KEYS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-wide claim on one key of one storage medium. Owned by the writer
/// task and released on drop, after the last queued write has finished.
struct KeyLease {
    id: String,
}

impl KeyLease {
    fn claim(location: &str, key: &str) -> Result<Self, StoreError> {
        let id = format!("{}#{}", location, key);
        let mut claimed = CLAIMED_KEYS.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(id.clone()) {
            return Err(StoreError::KeyInUse(key.to_string()));
        }
        Ok(Self { id })
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        CLAIMED_KEYS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Extra attempts after the first failed write.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Published when a conversation snapshot could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub key: String,
    pub attempts: u32,
    pub error: String,
}

enum WriteJob {
    Save(Vec<Message>),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// The authoritative in-memory conversation, mirrored to a key-value store.
///
/// Every append pushes a full snapshot onto a single writer task. The writer
/// handles snapshots strictly in order and collapses a backlog into its newest
/// entry, so a slow early write can never land after a later one. The writer
/// holds the key's lease, so the key stays claimed until it has drained.
pub struct ConversationStore {
    key: String,
    backend: Arc<dyn KeyValueStore>,
    messages: RwLock<Vec<Message>>,
    loaded: AtomicBool,
    writes: mpsc::UnboundedSender<WriteJob>,
    notices: broadcast::Sender<WriteFailure>,
}

impl ConversationStore {
    pub fn new(
        key: impl Into<String>,
        backend: Arc<dyn KeyValueStore>,
        policy: WritePolicy,
    ) -> Result<Arc<Self>, StoreError> {
        let key = key.into();
        let lease = KeyLease::claim(&backend.location(), &key)?;

        let (writes, jobs) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        tokio::spawn(run_writer(
            lease,
            key.clone(),
            backend.clone(),
            policy,
            jobs,
            notices.clone(),
        ));

        Ok(Arc::new(Self {
            key,
            backend,
            messages: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
            writes,
            notices,
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replaces the in-memory conversation with the persisted one.
    ///
    /// Must run once, before the first append. On any failure the in-memory
    /// conversation is left empty.
    pub async fn load(&self) -> Result<usize, StoreError> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyLoaded(self.key.clone()));
        }

        let payload = self
            .backend
            .get(&self.key)
            .await
            .map_err(|source| StoreError::Read {
                key: self.key.clone(),
                source,
            })?;

        let Some(payload) = payload else {
            info!("No saved conversation under '{}'", self.key);
            return Ok(0);
        };

        let loaded = decode_conversation(&payload).map_err(|source| StoreError::Decode {
            key: self.key.clone(),
            source,
        })?;

        let count = loaded.len();
        *self.messages.write().await = loaded;
        info!("Loaded {} messages from '{}'", count, self.key);
        Ok(count)
    }

    /// Loads the saved conversation, logging and carrying on empty if it
    /// cannot be read.
    pub async fn activate(&self) -> usize {
        match self.load().await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to load messages, starting with an empty conversation: {}", e);
                0
            }
        }
    }

    pub async fn append(&self, message: Message) -> usize {
        let mut messages = self.messages.write().await;
        messages.push(message);
        let len = messages.len();

        // Enqueued under the lock so snapshots reach the writer in append order.
        if self.writes.send(WriteJob::Save(messages.clone())).is_err() {
            error!(
                "Write queue for '{}' is closed; message kept in memory only",
                self.key
            );
        }

        len
    }

    /// Writes `messages` as the full conversation, bypassing the write queue.
    pub async fn save(&self, messages: &[Message]) -> Result<(), StoreError> {
        persist(self.backend.as_ref(), &self.key, messages).await
    }

    pub async fn send_text(&self, text: &str, now: DateTime<FixedOffset>) -> Option<Message> {
        let message = compose_outgoing(text, now)?;
        self.append(message.clone()).await;
        Some(message)
    }

    pub async fn trigger_ticket(
        &self,
        script: &TicketScript,
        now: DateTime<FixedOffset>,
    ) -> Message {
        let message = script.compose_scripted_incoming(now);
        self.append(message.clone()).await;
        message
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Waits until every write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.writes.send(WriteJob::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Drains the write queue, stops the writer and releases the key.
    /// Appends made afterwards stay in memory only.
    pub async fn close(&self) {
        let (done, wait) = oneshot::channel();
        if self.writes.send(WriteJob::Close(done)).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WriteFailure> {
        self.notices.subscribe()
    }
}

async fn persist(
    backend: &dyn KeyValueStore,
    key: &str,
    messages: &[Message],
) -> Result<(), StoreError> {
    let payload = encode_conversation(messages).map_err(StoreError::Encode)?;
    backend
        .set(key, &payload)
        .await
        .map_err(|source| StoreError::Write {
            key: key.to_string(),
            source,
        })
}

async fn run_writer(
    lease: KeyLease,
    key: String,
    backend: Arc<dyn KeyValueStore>,
    policy: WritePolicy,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    notices: broadcast::Sender<WriteFailure>,
) {
    let mut closers = Vec::new();

    while let Some(job) = jobs.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();

        let mut next = Some(job);
        while let Some(job) = next {
            match job {
                WriteJob::Save(snapshot) => latest = Some(snapshot),
                WriteJob::Flush(done) => waiters.push(done),
                WriteJob::Close(done) => closers.push(done),
            }
            next = if closers.is_empty() {
                jobs.try_recv().ok()
            } else {
                None
            };
        }

        if let Some(snapshot) = latest {
            write_with_retry(&key, backend.as_ref(), policy, &snapshot, &notices).await;
        }

        for done in waiters {
            let _ = done.send(());
        }

        if !closers.is_empty() {
            break;
        }
    }

    drop(jobs);
    drop(lease);
    info!("Writer for '{}' stopped", key);

    for done in closers {
        let _ = done.send(());
    }
}

async fn write_with_retry(
    key: &str,
    backend: &dyn KeyValueStore,
    policy: WritePolicy,
    snapshot: &[Message],
    notices: &broadcast::Sender<WriteFailure>,
) {
    let attempts = policy.retry_attempts.saturating_add(1);
    let mut attempt = 1;

    loop {
        match persist(backend, key, snapshot).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Saved '{}' on attempt {}", key, attempt);
                }
                return;
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Failed to save messages (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                tokio::time::sleep(policy.retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("Failed to save messages after {} attempts: {}", attempts, e);
                let _ = notices.send(WriteFailure {
                    key: key.to_string(),
                    attempts,
                    error: e.to_string(),
                });
                return;
            }
        }
    }
}
