use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wf_config::RelayConfig;

mod node_builder;

#[derive(Debug, Parser)]
#[command(version, about = "Whiteflag message relay node", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config/relay.json")]
    config_path: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RelayConfig::from_file(&opt.config_path).context("loading configuration")?;
    let node = node_builder::RelayNode::build(config).await?;
    node.run().await
}
