//! Config command: persist default capture options

use crate::config::Config;
use anyhow::Result;
use console::style;

/// Handle the config command
pub fn run(port: Option<u16>, tunnel: Option<bool>) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(port) = port {
        config.port = port;
    }
    if let Some(tunnel) = tunnel {
        config.tunnel = tunnel;
    }
    config.save()?;

    println!(
        "{} port={} tunnel={}",
        style("Defaults saved:").green(),
        style(config.port).white(),
        style(config.tunnel).white(),
    );

    Ok(())
}
