use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::character::CharacterConfig;
use crate::config::Config;
use crate::core::agent::{generate_reply, Generator};
use crate::core::conversation::{state_after_reply, ConversationGate, GateDecision};
use crate::error::is_rate_limited;
use crate::memory::MemoryStore;
use crate::models::PostId;
use crate::providers::{SocialReader, SocialWriter};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub fetched: usize,
    /// Mention ids in the order they were considered.
    pub processed: Vec<PostId>,
    pub replied: Vec<PostId>,
    pub skipped: usize,
    pub failed: usize,
    pub cursor: Option<PostId>,
    pub cursor_advanced: bool,
}

/// Replies to new mentions since the stored cursor, one thread at a time.
pub struct ReplySweep {
    config: Arc<Config>,
    bot_user_id: String,
    gate: ConversationGate,
    reader: Arc<dyn SocialReader>,
    writer: Arc<dyn SocialWriter>,
    generator: Arc<dyn Generator>,
    memory: MemoryStore,
    character: Arc<CharacterConfig>,
}

impl ReplySweep {
    pub fn new(
        config: Arc<Config>,
        bot_user_id: &str,
        reader: Arc<dyn SocialReader>,
        writer: Arc<dyn SocialWriter>,
        generator: Arc<dyn Generator>,
        memory: MemoryStore,
        character: Arc<CharacterConfig>,
    ) -> Self {
        let gate = ConversationGate::new(bot_user_id, config.reply_cooldown);
        ReplySweep {
            config,
            bot_user_id: bot_user_id.to_string(),
            gate,
            reader,
            writer,
            generator,
            memory,
            character,
        }
    }

    pub async fn run(&self) -> anyhow::Result<SweepReport> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();

        let cursor = self.memory.load_reply_cursor().await?;
        let mut mentions = self
            .reader
            .mentions_since(&self.bot_user_id, cursor.as_ref(), self.config.mentions_page_size)
            .await?;
        mentions.sort_by(|a, b| a.id.cmp(&b.id));
        report.fetched = mentions.len();
        info!(count = mentions.len(), cursor = ?cursor, "fetched mentions");

        let mut highest = cursor.clone();

        for mention in &mentions {
            // Guards against an API that ignores since_id
            if cursor.as_ref().is_some_and(|c| mention.id <= *c) {
                debug!(mention_id = %mention.id, "mention at or below cursor, ignoring");
                continue;
            }
            report.processed.push(mention.id.clone());
            if highest.as_ref().map_or(true, |h| mention.id > *h) {
                highest = Some(mention.id.clone());
            }

            let state = match self
                .memory
                .load_conversation(&mention.author_id, mention.thread_id())
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    warn!(mention_id = %mention.id, error = %e, "could not load conversation, skipping");
                    report.failed += 1;
                    continue;
                }
            };

            let stage = match self.gate.evaluate(mention, state.as_ref(), now) {
                GateDecision::Reply { stage, next_count } => {
                    debug!(mention_id = %mention.id, next_count, stage = stage.number(), "replying");
                    stage
                }
                GateDecision::Skip(reason) => {
                    info!(mention_id = %mention.id, ?reason, "not replying to mention");
                    report.skipped += 1;
                    continue;
                }
            };

            let prompt = self.character.reply_prompt(stage, &mention.text);
            let Some(reply) = generate_reply(self.generator.as_ref(), &prompt, &mention.text).await
            else {
                warn!(mention_id = %mention.id, "no reply generated");
                report.failed += 1;
                continue;
            };

            if !self.config.tweet_mode {
                info!(mention_id = %mention.id, %reply, "tweet mode disabled, not posting");
                report.skipped += 1;
                continue;
            }

            match self.writer.reply(&reply, &mention.id).await {
                Ok(reply_id) => {
                    info!(mention_id = %mention.id, %reply_id, stage = stage.number(), "replied to mention");
                    report.replied.push(mention.id.clone());
                    let next = state_after_reply(mention, state.as_ref(), now);
                    if let Err(e) = self.memory.save_conversation(&next).await {
                        error!(mention_id = %mention.id, error = %e, "reply posted but conversation not saved");
                    }
                }
                Err(e) => {
                    if is_rate_limited(&e) {
                        warn!(mention_id = %mention.id, "rate limited while replying");
                    } else {
                        error!(mention_id = %mention.id, error = %e, "failed to reply to mention");
                    }
                    report.failed += 1;
                }
            }
        }

        // Dry runs never move the cursor
        if !self.config.tweet_mode {
            debug!(highest = ?highest, "tweet mode disabled, cursor not advanced");
        } else if let Some(candidate) = &highest {
            if cursor.as_ref() != Some(candidate) {
                report.cursor_advanced = self.memory.advance_reply_cursor(candidate).await?;
            }
        }
        report.cursor = self.memory.load_reply_cursor().await?;

        info!(
            replied = report.replied.len(),
            skipped = report.skipped,
            failed = report.failed,
            cursor = ?report.cursor,
            "reply sweep finished"
        );
        Ok(report)
    }
}
