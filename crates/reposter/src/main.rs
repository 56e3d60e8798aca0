//! Reposter: scheduled short-video reposting daemon.
//!
//! Once a day it samples unused references, downloads them into a dated
//! queue, and publishes the queue one entry per posting slot.

use std::path::PathBuf;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod daemon;

#[derive(Parser)]
#[command(name = "reposter")]
#[command(about = "Scheduled short-video reposting daemon", long_about = None)]
struct Cli {
    /// Directory holding references, used list, batches, ledger and media
    #[arg(long, env = "REPOSTER_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Publishing API base URL
    #[arg(long, env = "REPOSTER_API_URL")]
    api_url: String,

    /// Media resolver base URL
    #[arg(long, env = "REPOSTER_RESOLVER_URL")]
    resolver_url: String,

    /// Publishing account username
    #[arg(long, env = "REPOSTER_USERNAME")]
    username: Option<String>,

    /// Publishing account password
    #[arg(long, env = "REPOSTER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Number of references prepared per day
    #[arg(long, env = "REPOSTER_DAILY_LIMIT", default_value = "5")]
    daily_limit: usize,

    /// Poll interval in seconds
    #[arg(long, env = "REPOSTER_POLL_INTERVAL", default_value = "60")]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                "reposter=info,reposter_store=info,reposter_batch=info,\
                 reposter_scheduler=info,reposter_platform=info"
                    .to_string()
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    daemon::run_with_config(daemon::DaemonConfig {
        data_dir: cli.data_dir,
        api_url: cli.api_url,
        resolver_url: cli.resolver_url,
        username: cli.username,
        password: cli.password,
        daily_limit: cli.daily_limit,
        poll_interval: cli.poll_interval,
    })
    .await
}
