use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cairn_core::CairnConfig;

mod app;
mod handlers;

use app::BotContext;

/// CLI surface is deliberately minimal: a config path override, no
/// subcommands, fatal on a bad path instead of falling back to defaults
/// (this system has no
/// sensible default for `MASTODON_ACCESS_TOKEN` or `CHARACTER_PROMPT`).
#[derive(Parser)]
struct Cli {
    /// Shared `.env` file, loaded first.
    #[arg(long, default_value = ".env")]
    shared_env: PathBuf,

    /// Per-instance `.env.<name>` override, loaded second (wins on conflict).
    #[arg(long, value_name = "FILE")]
    instance_env: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    cairn_core::init_logging("cairn_agent=info,cairn_conversation=info,cairn_facts=info,cairn_profile=info,cairn_cluster=info");

    let cli = Cli::parse();

    let config = match CairnConfig::load(&cli.shared_env, cli.instance_env.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let ctx = match BotContext::build(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("fatal: failed to initialize bot: {e:#}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown.cancel();
    });

    info!(bot = %ctx.config.bot_username, "cairn agent starting");
    ctx.run(cancel).await;
}
