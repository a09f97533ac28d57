use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{ConversationState, PostId, ProactiveReplyRecord, Stage};

mod file_store;

pub use file_store::JsonFileStore;

const CHECKPOINTS: &str = "checkpoints";
const REPLY_CURSOR: &str = "replyCursor";
const SELF_TEST: &str = "selfTest";
const PROACTIVE_REPLIES: &str = "proactiveReplies";
const CONVERSATIONS: &str = "conversations";

/// Durable key-value document store. A missing document is `Ok(None)`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a document. With `merge`, top-level fields are merged into any
    /// existing document instead of replacing it.
    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Value,
        merge: bool,
    ) -> Result<(), StoreError>;
}

#[derive(Serialize, Deserialize)]
struct CursorDoc {
    value: PostId,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProactiveReplyDoc {
    author_id: String,
    replied_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDoc {
    count: u32,
    last_at: DateTime<Utc>,
    last_seen_id: PostId,
    stage: Stage,
}

#[derive(Serialize, Deserialize)]
struct SelfTestDoc {
    value: String,
}

/// Typed access to the bot's persisted state.
#[derive(Clone)]
pub struct MemoryStore {
    store: Arc<dyn DocumentStore>,
}

impl MemoryStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        MemoryStore { store }
    }

    pub async fn load_reply_cursor(&self) -> anyhow::Result<Option<PostId>> {
        let doc = self
            .read::<CursorDoc>(CHECKPOINTS, REPLY_CURSOR)
            .await
            .context("failed to load reply cursor")?;
        Ok(doc.map(|d| d.value))
    }

    /// Moves the reply cursor to `candidate` only if it is strictly greater
    /// than the value currently stored. Returns whether a write happened.
    pub async fn advance_reply_cursor(&self, candidate: &PostId) -> anyhow::Result<bool> {
        let current = self.load_reply_cursor().await?;
        if current.as_ref().is_some_and(|c| c >= candidate) {
            return Ok(false);
        }
        self.write(
            CHECKPOINTS,
            REPLY_CURSOR,
            &CursorDoc {
                value: candidate.clone(),
            },
        )
        .await
        .context("failed to store reply cursor")?;
        Ok(true)
    }

    pub async fn has_proactive_reply(&self, post_id: &PostId) -> anyhow::Result<bool> {
        let doc = self
            .store
            .get(PROACTIVE_REPLIES, post_id.as_str())
            .await
            .with_context(|| format!("failed to check proactive reply record for {post_id}"))?;
        Ok(doc.is_some())
    }

    pub async fn record_proactive_reply(&self, record: &ProactiveReplyRecord) -> anyhow::Result<()> {
        self.write(
            PROACTIVE_REPLIES,
            record.post_id.as_str(),
            &ProactiveReplyDoc {
                author_id: record.author_id.clone(),
                replied_at: record.replied_at,
            },
        )
        .await
        .with_context(|| format!("failed to record proactive reply to {}", record.post_id))
    }

    pub async fn load_proactive_reply(
        &self,
        post_id: &PostId,
    ) -> anyhow::Result<Option<ProactiveReplyRecord>> {
        let doc = self
            .read::<ProactiveReplyDoc>(PROACTIVE_REPLIES, post_id.as_str())
            .await?;
        Ok(doc.map(|d| ProactiveReplyRecord {
            post_id: post_id.clone(),
            author_id: d.author_id,
            replied_at: d.replied_at,
        }))
    }

    pub async fn load_conversation(
        &self,
        author_id: &str,
        thread_id: &str,
    ) -> anyhow::Result<Option<ConversationState>> {
        let key = conversation_key(author_id, thread_id);
        let doc = self
            .read::<ConversationDoc>(CONVERSATIONS, &key)
            .await
            .with_context(|| format!("failed to load conversation {key}"))?;
        Ok(doc.map(|d| {
            ConversationState::restore(author_id, thread_id, d.count, d.last_at, d.last_seen_id)
        }))
    }

    pub async fn save_conversation(&self, state: &ConversationState) -> anyhow::Result<()> {
        let key = conversation_key(state.author_id(), state.thread_id());
        self.write(
            CONVERSATIONS,
            &key,
            &ConversationDoc {
                count: state.count(),
                last_at: state.last_at(),
                last_seen_id: state.last_seen_id().clone(),
                stage: state.stage(),
            },
        )
        .await
        .with_context(|| format!("failed to save conversation {key}"))
    }

    /// Round-trips a timestamp through the store to prove it is reachable and writable.
    pub async fn self_test(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        let written = now.to_rfc3339();
        self.write(
            CHECKPOINTS,
            SELF_TEST,
            &SelfTestDoc {
                value: written.clone(),
            },
        )
        .await?;
        let read = self.read::<SelfTestDoc>(CHECKPOINTS, SELF_TEST).await?;
        match read {
            Some(doc) if doc.value == written => Ok(()),
            Some(doc) => Err(anyhow::anyhow!(
                "store self-test read back {:?}, expected {:?}",
                doc.value,
                written
            )),
            None => Err(anyhow::anyhow!("store self-test document vanished after write")),
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.store.get(collection, key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    collection: collection.to_string(),
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let fields = serde_json::to_value(doc)?;
        self.store.set(collection, key, fields, true).await
    }
}

fn conversation_key(author_id: &str, thread_id: &str) -> String {
    format!("{author_id}_{thread_id}")
}
