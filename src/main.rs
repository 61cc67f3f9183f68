mod cli;

use clap::Parser;
use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::init_tracing(cli.verbose);
    cli::load_env_file(&cli.env_file);

    tracing::info!("Starting keyharvest");
    cli::run(cli).await
}
