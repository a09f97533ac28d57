use async_trait::async_trait;

use crate::models::{AuthorMetadata, CandidatePost, Mention, PostId};

pub mod twitter;

/// One page of search results plus the authors expanded alongside it.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<CandidatePost>,
    pub authors: Vec<AuthorMetadata>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait SocialReader: Send + Sync {
    /// One call to the recent-search endpoint. `max_results` must be within 10..=100.
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> anyhow::Result<SearchPage>;

    /// Mentions of `user_id` newer than `since_id`, in whatever order the API returns them.
    async fn mentions_since(
        &self,
        user_id: &str,
        since_id: Option<&PostId>,
        max_results: u32,
    ) -> anyhow::Result<Vec<Mention>>;
}

#[async_trait]
pub trait SocialWriter: Send + Sync {
    async fn post_tweet(&self, text: &str) -> anyhow::Result<PostId>;

    async fn reply(&self, text: &str, in_reply_to: &PostId) -> anyhow::Result<PostId>;
}
