use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::error::ModelError;

/// Identifier of a post on the social network.
///
/// Ids arrive as decimal strings that can exceed what a float (and in
/// principle a `u64`) holds, so they are kept as normalised digit strings and
/// ordered as arbitrary-precision integers: shorter is smaller, equal lengths
/// compare digit by digit.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostId(String);

impl PostId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ModelError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ModelError::InvalidPostId(raw.to_string()));
        }
        let normalised = raw.trim_start_matches('0');
        let normalised = if normalised.is_empty() { "0" } else { normalised };
        Ok(PostId(normalised.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<String> for PostId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PostId::new(value)
    }
}

impl From<PostId> for String {
    fn from(id: PostId) -> Self {
        id.0
    }
}

impl std::str::FromStr for PostId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostId::new(s)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostId({})", self.0)
    }
}

/// A post returned by search, considered for a proactive reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePost {
    pub id: PostId,
    pub author_id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub retweet_count: u64,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorMetadata {
    pub id: String,
    pub followers_count: u64,
}

/// Authors expanded alongside search results, keyed by author id.
#[derive(Debug, Clone, Default)]
pub struct AuthorLookup {
    authors: HashMap<String, AuthorMetadata>,
}

impl AuthorLookup {
    pub fn insert(&mut self, author: AuthorMetadata) {
        self.authors.insert(author.id.clone(), author);
    }

    pub fn get(&self, author_id: &str) -> Option<&AuthorMetadata> {
        self.authors.get(author_id)
    }

    /// Follower count, with unknown authors counted as having none.
    pub fn followers_of(&self, author_id: &str) -> u64 {
        self.get(author_id).map_or(0, |a| a.followers_count)
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

impl Extend<AuthorMetadata> for AuthorLookup {
    fn extend<T: IntoIterator<Item = AuthorMetadata>>(&mut self, iter: T) {
        for author in iter {
            self.insert(author);
        }
    }
}

impl FromIterator<AuthorMetadata> for AuthorLookup {
    fn from_iter<T: IntoIterator<Item = AuthorMetadata>>(iter: T) -> Self {
        let mut lookup = AuthorLookup::default();
        lookup.extend(iter);
        lookup
    }
}

/// A post directed at the bot, read from the mentions timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub id: PostId,
    pub author_id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
}

impl Mention {
    /// Thread this mention belongs to; a mention that starts a thread is its own thread.
    pub fn thread_id(&self) -> &str {
        self.conversation_id
            .as_deref()
            .unwrap_or_else(|| self.id.as_str())
    }
}

/// Dedup marker for a searched post the bot has already replied to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProactiveReplyRecord {
    pub post_id: PostId,
    pub author_id: String,
    pub replied_at: DateTime<Utc>,
}

/// How much about the project a reply in a thread may reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Warm = 1,
    Hinting = 2,
    Disclosure = 3,
}

impl Stage {
    pub fn for_reply_count(count: u32) -> Stage {
        match count {
            0..=2 => Stage::Warm,
            3..=4 => Stage::Hinting,
            _ => Stage::Disclosure,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Stage {
    type Error = ModelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Stage::Warm),
            2 => Ok(Stage::Hinting),
            3 => Ok(Stage::Disclosure),
            other => Err(ModelError::InvalidStage(other)),
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

/// The bot's memory of one (author, thread) pair.
///
/// Fields are private so the stage can only ever be derived from the count
/// and the count and last-seen id only ever move forward.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    author_id: String,
    thread_id: String,
    count: u32,
    last_at: DateTime<Utc>,
    last_seen_id: PostId,
}

impl ConversationState {
    /// State after the first reply in a thread.
    pub fn first_reply(
        author_id: impl Into<String>,
        thread_id: impl Into<String>,
        mention_id: PostId,
        at: DateTime<Utc>,
    ) -> Self {
        ConversationState {
            author_id: author_id.into(),
            thread_id: thread_id.into(),
            count: 1,
            last_at: at,
            last_seen_id: mention_id,
        }
    }

    /// Rebuilds a state from persisted fields. Any persisted stage is ignored.
    pub fn restore(
        author_id: impl Into<String>,
        thread_id: impl Into<String>,
        count: u32,
        last_at: DateTime<Utc>,
        last_seen_id: PostId,
    ) -> Self {
        ConversationState {
            author_id: author_id.into(),
            thread_id: thread_id.into(),
            count,
            last_at,
            last_seen_id,
        }
    }

    /// State after one more reply in this thread.
    pub fn after_reply(&self, mention_id: PostId, at: DateTime<Utc>) -> Self {
        ConversationState {
            author_id: self.author_id.clone(),
            thread_id: self.thread_id.clone(),
            count: self.count.saturating_add(1),
            last_at: at.max(self.last_at),
            last_seen_id: mention_id.max(self.last_seen_id.clone()),
        }
    }

    pub fn author_id(&self) -> &str {
        &self.author_id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn last_at(&self) -> DateTime<Utc> {
        self.last_at
    }

    pub fn last_seen_id(&self) -> &PostId {
        &self.last_seen_id
    }

    pub fn stage(&self) -> Stage {
        Stage::for_reply_count(self.count)
    }
}
