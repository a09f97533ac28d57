use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::character::CharacterConfig;
use crate::config::Config;
use crate::core::agent::{generate_reply, Generator};
use crate::core::search::{build_topic_query, SearchPager};
use crate::core::selection::{select_candidates, QualityFilter};
use crate::error::is_rate_limited;
use crate::memory::MemoryStore;
use crate::models::{PostId, ProactiveReplyRecord};
use crate::providers::{SocialReader, SocialWriter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProactiveReport {
    pub pool_size: usize,
    pub selected: usize,
    pub thresholds_used: Vec<u64>,
    pub replied: Vec<PostId>,
    pub already_recorded: usize,
    pub generation_failed: usize,
    pub post_failed: usize,
    pub dedup_check_failed: usize,
    /// Candidates left untouched because tweet mode is off.
    pub held_back: usize,
}

/// Searches for questions worth answering and replies to a bounded number of them.
pub struct ProactivePipeline {
    config: Arc<Config>,
    pager: SearchPager,
    filter: QualityFilter,
    generator: Arc<dyn Generator>,
    writer: Arc<dyn SocialWriter>,
    memory: MemoryStore,
    character: Arc<CharacterConfig>,
}

impl ProactivePipeline {
    pub fn new(
        config: Arc<Config>,
        bot_user_id: &str,
        reader: Arc<dyn SocialReader>,
        writer: Arc<dyn SocialWriter>,
        generator: Arc<dyn Generator>,
        memory: MemoryStore,
        character: Arc<CharacterConfig>,
    ) -> Self {
        let filter = QualityFilter::new(bot_user_id, config.min_followers);
        ProactivePipeline {
            config,
            pager: SearchPager::new(reader),
            filter,
            generator,
            writer,
            memory,
            character,
        }
    }

    pub async fn run(&self) -> anyhow::Result<ProactiveReport> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> anyhow::Result<ProactiveReport> {
        let mut report = ProactiveReport::default();

        let query = build_topic_query(&self.config.search_topics, &self.config.search_language);
        info!(%query, "starting proactive engagement run");
        let pool = self
            .pager
            .collect(&query, self.config.search_pool_size)
            .await?;
        report.pool_size = pool.posts.len();
        if pool.posts.is_empty() {
            info!("search returned no posts, nothing to do");
            return Ok(report);
        }

        let selection = select_candidates(
            &pool.posts,
            &pool.authors,
            &self.filter,
            &self.config.like_thresholds,
            self.config.min_retweets,
            self.config.max_replies_per_run,
        );
        report.selected = selection.posts.len();
        report.thresholds_used = selection.thresholds_used.clone();
        if selection.is_empty() {
            info!(pool = report.pool_size, "no candidates met any quality bar");
            return Ok(report);
        }
        info!(
            selected = report.selected,
            thresholds = ?report.thresholds_used,
            "candidates selected"
        );

        for candidate in &selection.posts {
            match self.memory.has_proactive_reply(&candidate.id).await {
                Ok(true) => {
                    info!(post_id = %candidate.id, "already replied to this post, skipping");
                    report.already_recorded += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(post_id = %candidate.id, error = %e, "dedup check failed, skipping");
                    report.dedup_check_failed += 1;
                    continue;
                }
            }

            let prompt = self.character.proactive_prompt(&candidate.text);
            let Some(reply) = generate_reply(self.generator.as_ref(), &prompt, &candidate.text).await
            else {
                warn!(post_id = %candidate.id, "no reply generated, leaving for a later run");
                report.generation_failed += 1;
                continue;
            };

            if !self.config.tweet_mode {
                info!(post_id = %candidate.id, %reply, "tweet mode disabled, not posting");
                report.held_back += 1;
                continue;
            }

            match self.writer.reply(&reply, &candidate.id).await {
                Ok(reply_id) => {
                    info!(post_id = %candidate.id, %reply_id, "proactive reply posted");
                    report.replied.push(candidate.id.clone());
                    let record = ProactiveReplyRecord {
                        post_id: candidate.id.clone(),
                        author_id: candidate.author_id.clone(),
                        replied_at: now,
                    };
                    if let Err(e) = self.memory.record_proactive_reply(&record).await {
                        error!(post_id = %candidate.id, error = %e, "reply posted but record not saved");
                    }
                }
                Err(e) => {
                    if is_rate_limited(&e) {
                        warn!(post_id = %candidate.id, "rate limited while replying");
                    } else {
                        error!(post_id = %candidate.id, error = %e, "failed to post proactive reply");
                    }
                    report.post_failed += 1;
                }
            }
        }

        info!(
            replied = report.replied.len(),
            generation_failed = report.generation_failed,
            post_failed = report.post_failed,
            "proactive engagement run finished"
        );
        Ok(report)
    }
}
