use clap::{Args as ClapArgs, Parser, Subcommand};

pub mod analyze;
pub mod watch;

pub use analyze::handle_analyze_command;
pub use watch::handle_watch_command;

#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Timed group discussions with live key-point extraction", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Follow a session's countdown from a running server
    Watch(WatchCliArgs),
    /// Run one lease-guarded analysis pass for a group
    Analyze(AnalyzeCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct WatchCliArgs {
    /// Session to follow
    pub session_id: String,
    /// Server base URL (default: from config)
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct AnalyzeCliArgs {
    /// Session the group belongs to
    pub session_id: String,
    /// Group to analyse
    pub group_id: String,
    /// Classify ethical themes instead of extracting key points
    #[arg(long)]
    pub ethics: bool,
}
