use anyhow::Result;
use clap::Parser;

use deployctl::cli::{Cli, Commands};
use deployctl::commands;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,deployctl=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;
    let config = commands::manager_config(&cli)?;
    match cli.command {
        Commands::New(args) => commands::new_deploy(config, args),
        Commands::List(args) => commands::list(config, args),
        Commands::Run(args) => commands::run(config, args),
        Commands::Stop(args) => commands::stop(config, args),
        Commands::Label(args) => commands::label(config, args),
        Commands::Labels => commands::labels(config),
    }
}
