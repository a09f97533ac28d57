use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use social_agent::{
    character::load_character_config,
    config::{Config, Credentials},
    core::{agent::Agent, runtime::Runtime},
    memory::{JsonFileStore, MemoryStore},
    providers::twitter::Twitter,
};

#[derive(Parser)]
#[command(name = "social-agent", about = "Scheduled posting and reply bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every job on its schedule until interrupted (default)
    Run,
    /// Generate and post one original post
    Post,
    /// Reply to new mentions now
    Sweep,
    /// Search for questions and reply to a few of them now
    Engage,
    /// Check that the document store can be written and read back
    SelfTest,
    /// List recent mentions without replying or touching stored state
    Mentions {
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Wires the live API clients and generation backend into a runtime.
async fn build_runtime(config: Config, memory: MemoryStore) -> anyhow::Result<Runtime> {
    let credentials = Credentials::from_env()?;
    let character = load_character_config(Path::new("characters"), config.character_name.as_deref())?;
    let twitter = Arc::new(Twitter::new(&credentials));
    let agent = Arc::new(Agent::new(&credentials.anthropic_api_key, &character.prompt));

    let bot_user_id = match &config.bot_user_id {
        Some(id) => id.clone(),
        None => {
            warn!("BOT_USER_ID not set, resolving it from the API");
            twitter.get_user_id().await?
        }
    };
    info!(%bot_user_id, character = %character.name, "running character");

    Ok(Runtime::new(
        config,
        bot_user_id,
        twitter.clone(),
        twitter,
        agent,
        memory,
        character,
    ))
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("Error loading .env file: {}", e);
    }
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let memory = MemoryStore::new(Arc::new(JsonFileStore::new(config.storage_dir.clone())));

    match cli.command.unwrap_or(Command::Run) {
        // Only needs the store, not API credentials
        Command::SelfTest => {
            memory.self_test(chrono::Utc::now()).await?;
            info!(dir = %config.storage_dir.display(), "document store self-test passed");
        }
        Command::Run => build_runtime(config, memory).await?.run_periodically().await?,
        Command::Post => {
            let outcome = build_runtime(config, memory).await?.post_original().await;
            info!(?outcome, "original post job finished");
        }
        Command::Sweep => {
            let report = build_runtime(config, memory).await?.sweep_mentions().await?;
            info!(?report, "reply sweep finished");
        }
        Command::Engage => {
            let report = build_runtime(config, memory)
                .await?
                .engage_proactively()
                .await?;
            info!(?report, "proactive engagement finished");
        }
        Command::Mentions { limit } => {
            let runtime = build_runtime(config, memory).await?;
            for mention in runtime.recent_mentions(limit).await? {
                println!("{}\t{}\t{}", mention.id, mention.author_id, mention.text);
            }
        }
    }

    Ok(())
}
