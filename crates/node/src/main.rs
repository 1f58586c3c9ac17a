//! GhostTalk service node binary.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ghosttalk_core::NodeConfig;

#[derive(Parser)]
#[command(name = "ghosttalkd", about = "GhostTalk service node", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "ghosttalk.yaml")]
    config: PathBuf,
}

fn init_logging(config: &NodeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},ghosttalk=debug", config.logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = NodeConfig::load(&args.config)?;
    init_logging(&config);

    tracing::info!(config = %args.config.display(), "starting ghosttalkd");
    ghosttalk_node::run(config).await
}
