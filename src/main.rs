use anyhow::Result;
use clap::Parser;
use palestra::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    palestra::telemetry::init(cli.verbose, cli.log_json);
    cli.run().await
}
