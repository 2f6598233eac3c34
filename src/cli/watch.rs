//! Terminal countdown client for a running server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::WatchCliArgs;
use crate::config::Config;
use crate::timer::{Countdown, CountdownDriver, TimerSnapshot, TimerSource};

/// Fetches authoritative snapshots from `GET /sessions/:id/timer`.
pub struct HttpTimerSource {
    client: reqwest::Client,
    url: String,
}

impl HttpTimerSource {
    pub fn new(base_url: &str, session_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!(
                "{}/sessions/{}/timer",
                base_url.trim_end_matches('/'),
                session_id
            ),
        }
    }
}

#[async_trait]
impl TimerSource for HttpTimerSource {
    async fn fetch(&self) -> Result<TimerSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to reach timer endpoint")?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Timer request failed ({}): {}",
                status,
                body
            ));
        }

        serde_json::from_str(&body).context("Failed to parse timer snapshot")
    }
}

fn render(countdown: &Countdown) -> String {
    let secs = countdown.remaining();
    let marker = if countdown.is_authoritative() { "" } else { " (not started)" };
    format!("{:02}:{:02}{}", secs / 60, secs % 60, marker)
}

pub async fn handle_watch_command(args: WatchCliArgs) -> Result<()> {
    let config = Config::load()?;
    let base_url = args
        .url
        .unwrap_or_else(|| format!("http://{}:{}", config.server.bind, config.server.port));

    let driver = CountdownDriver::new(
        HttpTimerSource::new(&base_url, &args.session_id),
        config.timer.tick_interval(),
        config.timer.resync_interval(),
        config.timer.drift_threshold_secs,
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!("Watching session {} via {}", args.session_id, base_url);
    let countdown = driver
        .run(cancel, |countdown| {
            print!("\r{}   ", render(countdown));
            let _ = std::io::stdout().flush();
        })
        .await?;
    println!();

    if countdown.is_time_up() {
        println!("Time up!");
    }
    Ok(())
}
