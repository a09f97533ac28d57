use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{
    character::CharacterConfig,
    config::Config,
    core::agent::Generator,
    core::proactive::{ProactivePipeline, ProactiveReport},
    core::sweep::{ReplySweep, SweepReport},
    error::is_rate_limited,
    memory::MemoryStore,
    models::{Mention, PostId},
    providers::{SocialReader, SocialWriter},
};

/// Outcome of the original-post job.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginalPost {
    Posted(PostId),
    NotGenerated,
    HeldBack(String),
    Failed,
}

/// Wires the collaborators together and exposes each schedulable job.
pub struct Runtime {
    config: Arc<Config>,
    bot_user_id: String,
    reader: Arc<dyn SocialReader>,
    writer: Arc<dyn SocialWriter>,
    generator: Arc<dyn Generator>,
    memory: MemoryStore,
    character: Arc<CharacterConfig>,
}

impl Runtime {
    pub fn new(
        config: Config,
        bot_user_id: String,
        reader: Arc<dyn SocialReader>,
        writer: Arc<dyn SocialWriter>,
        generator: Arc<dyn Generator>,
        memory: MemoryStore,
        character: CharacterConfig,
    ) -> Self {
        Runtime {
            config: Arc::new(config),
            bot_user_id,
            reader,
            writer,
            generator,
            memory,
            character: Arc::new(character),
        }
    }

    fn proactive_pipeline(&self) -> ProactivePipeline {
        ProactivePipeline::new(
            self.config.clone(),
            &self.bot_user_id,
            self.reader.clone(),
            self.writer.clone(),
            self.generator.clone(),
            self.memory.clone(),
            self.character.clone(),
        )
    }

    fn reply_sweep(&self) -> ReplySweep {
        ReplySweep::new(
            self.config.clone(),
            &self.bot_user_id,
            self.reader.clone(),
            self.writer.clone(),
            self.generator.clone(),
            self.memory.clone(),
            self.character.clone(),
        )
    }

    /// Generates and posts one original post on a randomly chosen theme.
    pub async fn post_original(&self) -> OriginalPost {
        let theme = {
            let mut rng = rand::thread_rng();
            self.character
                .project
                .themes
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| "learning new technologies".to_string())
        };
        info!(%theme, "generating original post");

        let prompt = self.character.original_post_prompt(&theme);
        let Some(content) = self.generator.generate(&prompt).await else {
            error!("failed to generate original post");
            return OriginalPost::NotGenerated;
        };

        if !self.config.tweet_mode {
            info!(%content, "tweet mode disabled, not posting");
            return OriginalPost::HeldBack(content);
        }

        match self.writer.post_tweet(&content).await {
            Ok(id) => {
                info!(post_id = %id, %content, "original post published");
                OriginalPost::Posted(id)
            }
            Err(e) => {
                if is_rate_limited(&e) {
                    warn!("rate limited while posting, will try again next run");
                } else {
                    error!(error = %e, "failed to post original post");
                }
                OriginalPost::Failed
            }
        }
    }

    pub async fn sweep_mentions(&self) -> anyhow::Result<SweepReport> {
        self.reply_sweep().run().await
    }

    pub async fn engage_proactively(&self) -> anyhow::Result<ProactiveReport> {
        self.proactive_pipeline().run().await
    }

    /// Recent mentions, newest first, without touching any stored state.
    pub async fn recent_mentions(&self, limit: u32) -> anyhow::Result<Vec<Mention>> {
        let mut mentions = self
            .reader
            .mentions_since(&self.bot_user_id, None, limit.clamp(5, 100))
            .await?;
        mentions.sort_by(|a, b| b.id.cmp(&a.id));
        mentions.truncate(limit as usize);
        Ok(mentions)
    }

    /// Runs every job on its own period until Ctrl-C. Jobs never overlap
    /// within this process; a failed run is logged and retried next period.
    pub async fn run_periodically(&self) -> anyhow::Result<()> {
        let schedule = &self.config.schedule;
        info!(
            bot_user_id = %self.bot_user_id,
            character = %self.character.name,
            tweet_mode = self.config.tweet_mode,
            "=== Starting scheduler ==="
        );

        let mut original_tick = interval(to_std(schedule.original_post_every));
        let mut sweep_tick = interval(to_std(schedule.reply_sweep_every));
        let mut proactive_tick = interval(to_std(schedule.proactive_every));
        for tick in [&mut original_tick, &mut sweep_tick, &mut proactive_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = original_tick.tick() => {
                    self.post_original().await;
                }
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.sweep_mentions().await {
                        error!(error = %e, "reply sweep failed");
                    }
                }
                _ = proactive_tick.tick() => {
                    if let Err(e) = self.engage_proactively().await {
                        error!(error = %e, "proactive engagement failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down");
                    return Ok(());
                }
            }
        }
    }
}

fn to_std(period: chrono::Duration) -> Duration {
    period
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(60))
}
