use clap::{Parser, Subcommand};

/// Command-line surface of the anvil CLI.
#[derive(Debug, Parser)]
#[command(
    name = "anvil",
    version,
    about = "Run Tasks on a cluster and follow their logs"
)]
pub struct Cli {
    /// Namespace to operate in; falls back to ANVIL_NAMESPACE, then "default"
    #[arg(short = 'n', long, global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a run for the Task specified by 'name'
    Run {
        /// Name of the Task to run
        name: String,

        /// Start a run and watch its log until it completes or fails
        #[arg(short = 'F', long)]
        follow: bool,
    },
}
