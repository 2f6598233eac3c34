use anyhow::Result;
use clap::Parser;
use huddle::{
    app,
    cli::{handle_analyze_command, handle_watch_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Huddle {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Watch(args)) => {
            handle_watch_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Analyze(args)) => {
            handle_analyze_command(args).await?;
            return Ok(());
        }
        None => {}
    }

    app::run_service().await
}
