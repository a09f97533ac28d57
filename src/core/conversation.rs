use chrono::{DateTime, Duration, Utc};

use crate::models::{ConversationState, Mention, Stage};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    OwnMention,
    /// The thread has already seen this mention or a newer one.
    AlreadySeen,
    Cooldown { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Reply { next_count: u32, stage: Stage },
    Skip(SkipReason),
}

/// Decides whether a mention gets a reply, given what the bot remembers of its thread.
#[derive(Debug, Clone)]
pub struct ConversationGate {
    bot_user_id: String,
    cooldown: Duration,
}

impl ConversationGate {
    pub fn new(bot_user_id: impl Into<String>, cooldown: Duration) -> Self {
        ConversationGate {
            bot_user_id: bot_user_id.into(),
            cooldown,
        }
    }

    pub fn evaluate(
        &self,
        mention: &Mention,
        state: Option<&ConversationState>,
        now: DateTime<Utc>,
    ) -> GateDecision {
        if mention.author_id == self.bot_user_id {
            return GateDecision::Skip(SkipReason::OwnMention);
        }

        let Some(state) = state else {
            return GateDecision::Reply {
                next_count: 1,
                stage: Stage::for_reply_count(1),
            };
        };

        if mention.id <= *state.last_seen_id() {
            return GateDecision::Skip(SkipReason::AlreadySeen);
        }

        let elapsed = now.signed_duration_since(state.last_at());
        if elapsed < self.cooldown {
            return GateDecision::Skip(SkipReason::Cooldown {
                remaining: self.cooldown - elapsed,
            });
        }

        let next_count = state.count().saturating_add(1);
        GateDecision::Reply {
            next_count,
            stage: Stage::for_reply_count(next_count),
        }
    }
}

/// State to persist once a reply to `mention` has actually been posted.
pub fn state_after_reply(
    mention: &Mention,
    state: Option<&ConversationState>,
    at: DateTime<Utc>,
) -> ConversationState {
    match state {
        Some(state) => state.after_reply(mention.id.clone(), at),
        None => ConversationState::first_reply(
            mention.author_id.clone(),
            mention.thread_id(),
            mention.id.clone(),
            at,
        ),
    }
}
