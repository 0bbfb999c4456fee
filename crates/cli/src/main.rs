use clap::Parser;
use kube::Client;
use tracing::debug;

use anvil_cli::{
    cli::{Cli, Command},
    config::Config,
    output::Output,
    run::Runner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let namespace = cli.namespace.unwrap_or(config.namespace);

    let client = Client::try_default().await?;
    debug!("operating in namespace {}", namespace);

    match cli.command {
        Command::Run { name, follow } => {
            let runner = Runner::new(client, namespace, Output::stdout());
            runner.execute(&name, follow).await?;
        }
    }

    Ok(())
}
