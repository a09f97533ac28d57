use async_trait::async_trait;
use rig::agent::Agent as RigAgent;
use rig::completion::Prompt;
use rig::providers::anthropic::completion::CompletionModel;
use rig::providers::anthropic::{self, CLAUDE_3_HAIKU};
use similar::TextDiff;
use tracing::{debug, error, warn};

const MAX_POST_CHARS: usize = 280;
const PARROT_RATIO: f32 = 0.9;

/// Text generation backend: prompt in, text out.
///
/// Failures never escape: they are logged and reported as `None`, so callers
/// only have to decide what to do when nothing came back.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Option<String>;
}

pub struct Agent {
    agent: RigAgent<CompletionModel>,
}

impl Agent {
    pub fn new(anthropic_api_key: &str, preamble: &str) -> Self {
        let client = anthropic::ClientBuilder::new(anthropic_api_key).build();
        let agent = client
            .agent(CLAUDE_3_HAIKU)
            .preamble(preamble)
            .temperature(0.7)
            .max_tokens(300)
            .build();
        Agent { agent }
    }
}

#[async_trait]
impl Generator for Agent {
    async fn generate(&self, prompt: &str) -> Option<String> {
        match self.agent.prompt(prompt).await {
            Ok(response) => {
                let cleaned = clean_generated(&response);
                if cleaned.is_none() {
                    warn!("generation backend returned an empty response");
                }
                cleaned
            }
            Err(e) => {
                error!(error = %e, "generation backend request failed");
                None
            }
        }
    }
}

/// Normalises model output into postable text: trims, drops wrapping quotes
/// and clips to the post length limit. Empty output becomes `None`.
pub fn clean_generated(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')] {
        if text.len() > 1 && text.starts_with(open) && text.ends_with(close) {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
        }
    }
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(MAX_POST_CHARS).collect())
}

/// True when `generated` is little more than a copy of `source`.
pub fn is_parroting(generated: &str, source: &str) -> bool {
    let a = generated.trim().to_lowercase();
    let b = source.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let ratio = TextDiff::from_chars(a.as_str(), b.as_str()).ratio();
    debug!(ratio, "similarity to source text");
    ratio >= PARROT_RATIO
}

/// Generates a reply to `source` and rejects output that just echoes it.
pub async fn generate_reply(
    generator: &dyn Generator,
    prompt: &str,
    source: &str,
) -> Option<String> {
    let text = generator.generate(prompt).await?;
    if is_parroting(&text, source) {
        warn!("discarding generated reply that repeats its source text");
        return None;
    }
    Some(text)
}
