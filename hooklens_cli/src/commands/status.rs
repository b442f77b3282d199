//! Status command: query the backend session status

use crate::backend::ControlClient;
use crate::config::Config;
use anyhow::{Context, Result};
use console::style;

/// Handle the status command
pub async fn run(port: Option<u16>) -> Result<()> {
    let config = Config::load()?;
    let port = port.unwrap_or(config.port);

    let status = ControlClient::new(port)
        .status()
        .await
        .with_context(|| format!("No webhook backend reachable on port {}", port))?;

    let state = if status.is_running {
        style("running").green().bold()
    } else {
        style("stopped").red()
    };

    println!("{} {}", style("Session:").dim(), state);
    println!("{} {}", style("Port:").dim(), style(status.port).white());
    if !status.public_url.is_empty() {
        println!(
            "{} {}",
            style("Public URL:").dim(),
            style(&status.public_url).green()
        );
    }

    Ok(())
}
