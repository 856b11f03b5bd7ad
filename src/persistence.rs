//! Persistence seam: the pause row is the single source of truth and is
//! never cached in-process - every store implementation here does a
//! read-through on every call, including Redis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PauseState {
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    pub last_paused_by: Option<String>,
    pub last_paused_at: Option<DateTime<Utc>>,
}

impl PauseState {
    pub fn clear() -> Self {
        Self {
            is_paused: false,
            pause_reason: None,
            last_paused_by: None,
            last_paused_at: None,
        }
    }
}

impl Default for PauseState {
    fn default() -> Self {
        Self::clear()
    }
}

#[async_trait]
pub trait PauseStateStore: Send + Sync {
    async fn get(&self, moderator_id: &str) -> anyhow::Result<Option<PauseState>>;
    async fn set(&self, moderator_id: &str, state: PauseState) -> anyhow::Result<()>;
    async fn clear(&self, moderator_id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundStatus {
    Queued,
    Sending,
    Sent,
    Failed,
    Retrying,
}

#[async_trait]
pub trait OutboundMessageStore: Send + Sync {
    async fn has_sending(&self, moderator_id: &str) -> anyhow::Result<bool>;
    async fn set_status(&self, message_id: &str, moderator_id: &str, status: OutboundStatus) -> anyhow::Result<()>;
}

/// In-memory implementation used by every unit test in this crate.
#[derive(Default)]
pub struct InMemoryPauseStateStore {
    states: Mutex<HashMap<String, PauseState>>,
}

#[async_trait]
impl PauseStateStore for InMemoryPauseStateStore {
    async fn get(&self, moderator_id: &str) -> anyhow::Result<Option<PauseState>> {
        Ok(self.states.lock().await.get(moderator_id).cloned())
    }

    async fn set(&self, moderator_id: &str, state: PauseState) -> anyhow::Result<()> {
        self.states.lock().await.insert(moderator_id.to_string(), state);
        Ok(())
    }

    async fn clear(&self, moderator_id: &str) -> anyhow::Result<()> {
        self.states.lock().await.remove(moderator_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct OutboundRecord {
    moderator_id: String,
    status: OutboundStatus,
}

/// In-memory implementation keyed by message id; `has_sending` scans for any
/// record owned by the moderator currently in `Sending`.
#[derive(Default)]
pub struct InMemoryOutboundMessageStore {
    records: Mutex<HashMap<String, OutboundRecord>>,
}

impl InMemoryOutboundMessageStore {
    /// Test/demo helper: seed a record without going through the façade.
    pub async fn seed(&self, message_id: &str, moderator_id: &str, status: OutboundStatus) {
        self.records.lock().await.insert(
            message_id.to_string(),
            OutboundRecord {
                moderator_id: moderator_id.to_string(),
                status,
            },
        );
    }
}

#[async_trait]
impl OutboundMessageStore for InMemoryOutboundMessageStore {
    async fn has_sending(&self, moderator_id: &str) -> anyhow::Result<bool> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .any(|r| r.moderator_id == moderator_id && r.status == OutboundStatus::Sending))
    }

    async fn set_status(&self, message_id: &str, moderator_id: &str, status: OutboundStatus) -> anyhow::Result<()> {
        if let Some(record) = self.records.lock().await.get_mut(message_id) {
            record.moderator_id = moderator_id.to_string();
            record.status = status;
        }
        Ok(())
    }
}

/// Redis-backed pause state, keyed `pause_state:{moderator_id}`. Opens a
/// fresh connection per call and deliberately does not layer a local cache
/// in front of reads - a cache would let a stale pause/resume slip through.
pub struct RedisPauseStateStore {
    client: redis::Client,
}

impl RedisPauseStateStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    fn key(moderator_id: &str) -> String {
        format!("pause_state:{}", moderator_id)
    }
}

#[async_trait]
impl PauseStateStore for RedisPauseStateStore {
    async fn get(&self, moderator_id: &str) -> anyhow::Result<Option<PauseState>> {
        let mut conn = self.client.get_tokio_connection().await?;
        let raw: Option<String> = redis::AsyncCommands::get(&mut conn, Self::key(moderator_id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn set(&self, moderator_id: &str, state: PauseState) -> anyhow::Result<()> {
        let mut conn = self.client.get_tokio_connection().await?;
        let json = serde_json::to_string(&state)?;
        let _: () = redis::AsyncCommands::set(&mut conn, Self::key(moderator_id), json).await?;
        Ok(())
    }

    async fn clear(&self, moderator_id: &str) -> anyhow::Result<()> {
        let mut conn = self.client.get_tokio_connection().await?;
        let _: () = redis::AsyncCommands::del(&mut conn, Self::key(moderator_id)).await?;
        Ok(())
    }
}

/// Redis-backed outbound message status, one hash field per message id
/// recording `moderator_id:status`.
pub struct RedisOutboundMessageStore {
    client: redis::Client,
}

impl RedisOutboundMessageStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }

    fn encode(moderator_id: &str, status: OutboundStatus) -> String {
        format!("{}:{}", moderator_id, status_str(status))
    }
}

fn status_str(status: OutboundStatus) -> &'static str {
    match status {
        OutboundStatus::Queued => "queued",
        OutboundStatus::Sending => "sending",
        OutboundStatus::Sent => "sent",
        OutboundStatus::Failed => "failed",
        OutboundStatus::Retrying => "retrying",
    }
}

#[async_trait]
impl OutboundMessageStore for RedisOutboundMessageStore {
    async fn has_sending(&self, moderator_id: &str) -> anyhow::Result<bool> {
        let mut conn = self.client.get_tokio_connection().await?;
        let entries: Vec<String> = redis::AsyncCommands::hvals(&mut conn, "outbound_messages").await?;
        let needle = format!("{}:sending", moderator_id);
        Ok(entries.iter().any(|e| e == &needle))
    }

    async fn set_status(&self, message_id: &str, moderator_id: &str, status: OutboundStatus) -> anyhow::Result<()> {
        let mut conn = self.client.get_tokio_connection().await?;
        let _: () =
            redis::AsyncCommands::hset(&mut conn, "outbound_messages", message_id, Self::encode(moderator_id, status))
                .await?;
        Ok(())
    }
}

pub type SharedPauseStateStore = Arc<dyn PauseStateStore>;
pub type SharedOutboundMessageStore = Arc<dyn OutboundMessageStore>;
