use anyhow::Result;

use super::AnalyzeCliArgs;
use crate::app::Services;
use crate::config::Config;
use crate::error::CoreError;

pub async fn handle_analyze_command(args: AnalyzeCliArgs) -> Result<()> {
    let services = Services::open(Config::load()?)?;

    let result = if args.ethics {
        services
            .analysis
            .run_ethics(&args.session_id, &args.group_id)
            .await
            .map(|outcome| outcome.message())
    } else {
        services
            .analysis
            .run_transcript(&args.session_id, &args.group_id)
            .await
            .map(|outcome| outcome.message())
    };

    match result {
        Ok(message) => println!("{}", message),
        Err(CoreError::LeaseContention { current_status }) => println!(
            "Analysis already in progress: {}",
            current_status.as_deref().unwrap_or("unknown")
        ),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
