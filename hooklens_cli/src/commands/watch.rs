//! Watch command: run a capture session with live inspection

use crate::config::Config;
use crate::log::{LogEvent, RequestLog};
use crate::session::{Session, SessionEvent};
use crate::tui;
use anyhow::Result;
use console::style;
use hooklens_common::RequestRecord;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Watch command options
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub port: Option<u16>,
    pub tunnel: bool,
    pub plain: bool,
}

/// Handle the watch command
pub async fn run(opts: WatchOptions) -> Result<()> {
    let config = Config::load()?;
    let port = opts.port.unwrap_or(config.port);
    let tunnel = opts.tunnel || config.tunnel;

    let log = Arc::new(RequestLog::new());
    let session = Session::new(port, tunnel, log);

    if opts.plain {
        run_plain(session).await
    } else {
        tui::run(session).await
    }
}

/// Plain mode: start immediately, print one line per request, stop on Ctrl-C
async fn run_plain(session: Session) -> Result<()> {
    let log = session.log();
    let mut session_events = session.subscribe();
    let mut log_events = log.subscribe();

    session.start().await?;

    let state = session.state().await;
    println!(
        "{} capturing on port {}",
        style("hooklens").cyan().bold(),
        style(state.port).white().bold(),
    );
    if !state.public_url.is_empty() {
        println!(
            "{} {}",
            style("Public URL:").dim(),
            style(&state.public_url).green()
        );
    }
    println!("{}", style("Waiting for requests... (Ctrl+C to stop)").dim());
    println!();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            event = log_events.recv() => match event {
                Ok(LogEvent::Added(record)) => print_request(&record),
                Ok(LogEvent::Cleared) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },

            event = session_events.recv() => match event {
                Ok(SessionEvent::FeedFailed(reason)) => {
                    eprintln!("{} {}", style("Live feed failed:").red().bold(), reason);
                    break;
                }
                Ok(SessionEvent::StateChanged(_)) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    session.stop().await;
    println!(
        "{}",
        style(format!(
            "Session stopped ({} requests captured)",
            log.len().await
        ))
        .dim()
    );
    Ok(())
}

/// Print one captured request as a console line
fn print_request(record: &RequestRecord) {
    let timestamp = record
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string();

    let method_styled = match record.method.as_str() {
        "GET" => style(format!("{:>7}", record.method)).green(),
        "POST" => style(format!("{:>7}", record.method)).yellow(),
        "PUT" => style(format!("{:>7}", record.method)).blue(),
        "PATCH" => style(format!("{:>7}", record.method)).magenta(),
        "DELETE" => style(format!("{:>7}", record.method)).red(),
        _ => style(format!("{:>7}", record.method)).white(),
    };

    let body_size = record.body.len();
    let size_str = if body_size >= 1_000_000 {
        format!("{:.1}MB", body_size as f64 / 1_000_000.0)
    } else if body_size >= 1_000 {
        format!("{:.1}KB", body_size as f64 / 1_000.0)
    } else {
        format!("{}B", body_size)
    };

    println!(
        "  {} {} {} {}",
        style(timestamp).dim(),
        method_styled,
        style(&record.url).white(),
        style(format!("{:>8}", size_str)).dim(),
    );
}
