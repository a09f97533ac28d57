use std::collections::HashSet;

use crate::models::{AuthorLookup, CandidatePost, PostId};

/// Fixed eligibility rules for proactive targets. Only the like bar varies
/// between passes, so it is supplied per call.
#[derive(Debug, Clone)]
pub struct QualityFilter {
    bot_user_id: String,
    min_followers: u64,
}

impl QualityFilter {
    pub fn new(bot_user_id: impl Into<String>, min_followers: u64) -> Self {
        QualityFilter {
            bot_user_id: bot_user_id.into(),
            min_followers,
        }
    }

    pub fn is_eligible(
        &self,
        post: &CandidatePost,
        authors: &AuthorLookup,
        min_likes: u64,
        min_retweets: u64,
    ) -> bool {
        post.author_id != self.bot_user_id
            && post.text.contains('?')
            && post.like_count >= min_likes
            && post.retweet_count >= min_retweets
            && authors.followers_of(&post.author_id) >= self.min_followers
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub posts: Vec<CandidatePost>,
    /// Like thresholds that contributed at least one post, strictest first.
    pub thresholds_used: Vec<u64>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Walks the like thresholds from strictest to laxest, topping up the quota
/// from each in turn and stopping once it is full.
pub fn select_candidates(
    pool: &[CandidatePost],
    authors: &AuthorLookup,
    filter: &QualityFilter,
    like_thresholds: &[u64],
    min_retweets: u64,
    quota: usize,
) -> Selection {
    let mut selection = Selection::default();
    let mut accepted: HashSet<PostId> = HashSet::new();

    for &min_likes in like_thresholds {
        let remaining = quota.saturating_sub(selection.posts.len());
        if remaining == 0 {
            break;
        }

        let fresh: Vec<&CandidatePost> = pool
            .iter()
            .filter(|post| filter.is_eligible(post, authors, min_likes, min_retweets))
            .filter(|post| !accepted.contains(&post.id))
            .collect();

        let mut took_any = false;
        for post in fresh {
            if selection.posts.len() >= quota {
                break;
            }
            // The same post can appear twice in a pool; only take it once
            if accepted.insert(post.id.clone()) {
                selection.posts.push(post.clone());
                took_any = true;
            }
        }
        if took_any {
            selection.thresholds_used.push(min_likes);
        }
    }

    selection
}
