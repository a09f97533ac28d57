use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{AuthorLookup, CandidatePost};
use crate::providers::SocialReader;

/// Smallest and largest page the recent-search endpoint accepts.
pub const MIN_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Posts gathered across search pages, in page order.
#[derive(Debug, Default)]
pub struct SearchPool {
    pub posts: Vec<CandidatePost>,
    pub authors: AuthorLookup,
    pub pages: usize,
}

/// Builds the topic-union search query: any of the topics, original posts
/// only, in one language.
pub fn build_topic_query(topics: &[String], language: &str) -> String {
    let terms: Vec<String> = topics
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.contains(char::is_whitespace) {
                format!("\"{t}\"")
            } else {
                t.to_string()
            }
        })
        .collect();
    format!("({}) -is:retweet -is:reply lang:{language}", terms.join(" OR "))
}

/// Page size for the next call given how many posts are still wanted.
pub fn page_size_for(remaining: usize) -> usize {
    remaining.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

pub struct SearchPager {
    reader: Arc<dyn SocialReader>,
}

impl SearchPager {
    pub fn new(reader: Arc<dyn SocialReader>) -> Self {
        SearchPager { reader }
    }

    /// Follows continuation tokens until `desired` posts are collected or the
    /// API runs dry. A failed page aborts the whole collection.
    pub async fn collect(&self, query: &str, desired: usize) -> anyhow::Result<SearchPool> {
        let mut pool = SearchPool::default();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = desired.saturating_sub(pool.posts.len());
            if remaining == 0 {
                break;
            }
            // A trailing call would be undersized; what we have is enough
            if remaining < MIN_PAGE_SIZE && !pool.posts.is_empty() {
                break;
            }

            let size = page_size_for(remaining);
            debug!(size, page = pool.pages + 1, "requesting search page");
            let page = self
                .reader
                .search(query, size as u32, page_token.as_deref())
                .await?;
            pool.pages += 1;

            let received = page.posts.len();
            pool.posts.extend(page.posts);
            pool.authors.extend(page.authors);

            match page.next_token {
                Some(token) if received > 0 => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            posts = pool.posts.len(),
            authors = pool.authors.len(),
            pages = pool.pages,
            "search pool collected"
        );
        Ok(pool)
    }
}
