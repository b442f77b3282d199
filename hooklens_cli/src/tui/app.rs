//! TUI application state and event loop

use crate::log::RequestLog;
use crate::session::{Session, SessionEvent, SessionPhase, SessionState};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use hooklens_common::RequestRecord;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// User intents produced by key handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Quit,
    ToggleSession,
    ToggleTunnel,
    Clear,
    OpenPublicUrl,
    PortUp,
    PortDown,
}

/// TUI application state
///
/// A read-only projection of the session state and the request log; every
/// mutation goes back through the session as an [`Intent`].
pub struct TuiApp {
    pub state: SessionState,
    pub records: Vec<RequestRecord>,
    pub selected_index: usize,
    /// Cursor selection resolved through the request log
    pub selected: Option<RequestRecord>,
    pub message: Option<String>,
    pub should_quit: bool,
}

impl TuiApp {
    fn new(state: SessionState) -> Self {
        Self {
            state,
            records: Vec::new(),
            selected_index: 0,
            selected: None,
            message: None,
            should_quit: false,
        }
    }

    /// Map a key press to an intent, or adjust local navigation
    fn handle_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Intent::Quit),
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => Some(Intent::Quit),
            (KeyCode::Char('s'), _) => Some(Intent::ToggleSession),
            (KeyCode::Char('t'), _) => Some(Intent::ToggleTunnel),
            (KeyCode::Char('c'), _) => Some(Intent::Clear),
            (KeyCode::Char('o'), _) => Some(Intent::OpenPublicUrl),
            (KeyCode::Char('+') | KeyCode::Char('='), _) => Some(Intent::PortUp),
            (KeyCode::Char('-'), _) => Some(Intent::PortDown),
            (KeyCode::Up | KeyCode::Char('k'), _) => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
                None
            }
            (KeyCode::Down | KeyCode::Char('j'), _) => {
                if self.selected_index + 1 < self.records.len() {
                    self.selected_index += 1;
                }
                None
            }
            (KeyCode::Home, _) => {
                self.selected_index = 0;
                None
            }
            (KeyCode::End, _) => {
                self.selected_index = self.records.len().saturating_sub(1);
                None
            }
            _ => None,
        }
    }

    /// Record id under the cursor
    pub fn selected_id(&self) -> Option<&str> {
        self.records.get(self.selected_index).map(|r| r.id.as_str())
    }
}

/// Run the interactive UI for a capture session
pub async fn run(session: Session) -> Result<()> {
    let log = session.log();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &session, &log).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    // Leave no running session behind, whatever ended the loop
    session.stop().await;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &Session,
    log: &Arc<RequestLog>,
) -> Result<()> {
    let mut session_events = session.subscribe();
    let mut log_events = log.subscribe();
    let mut app = TuiApp::new(session.state().await);
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        terminal.draw(|f| super::ui::draw(f, &app))?;

        tokio::select! {
            // Handle keyboard events (non-blocking)
            _ = tick_interval.tick() => {
                if event::poll(Duration::from_millis(0))? {
                    if let Event::Key(key) = event::read()? {
                        if let Some(intent) = app.handle_key(key) {
                            apply_intent(intent, &mut app, session).await;
                        }
                        sync_selection(&mut app, session, log).await;
                        if app.should_quit {
                            return Ok(());
                        }
                    }
                }
            }

            event = session_events.recv() => match event {
                Ok(SessionEvent::StateChanged(state)) => app.state = state,
                Ok(SessionEvent::FeedFailed(reason)) => {
                    // Feed faults are fatal to the session: force a stop and say so
                    session.stop().await;
                    app.message = Some(format!("live feed failed: {}", reason));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => app.state = session.state().await,
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },

            event = log_events.recv() => match event {
                Ok(_) => {
                    app.records = log.records().await;
                    if app.selected_index >= app.records.len() {
                        app.selected_index = app.records.len().saturating_sub(1);
                    }
                    sync_selection(&mut app, session, log).await;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => app.records = log.records().await,
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn apply_intent(intent: Intent, app: &mut TuiApp, session: &Session) {
    app.message = None;

    match intent {
        Intent::Quit => app.should_quit = true,

        Intent::ToggleSession => {
            if app.state.is_running() {
                session.stop().await;
            } else if let Err(e) = session.start().await {
                app.message = Some(format!("start failed: {}", e));
            }
        }

        Intent::ToggleTunnel => {
            let desired = !app.state.tunnel_enabled;
            if let Err(e) = session.set_tunnel_enabled(desired).await {
                app.message = Some(format!("tunnel toggle failed: {}", e));
            }
        }

        Intent::Clear => {
            session.clear().await;
        }

        Intent::OpenPublicUrl => {
            if app.state.public_url.is_empty() {
                app.message = Some("no public URL to open".to_string());
            } else if let Err(e) = open::that(&app.state.public_url) {
                app.message = Some(format!("failed to open browser: {}", e));
            }
        }

        Intent::PortUp | Intent::PortDown if app.state.phase != SessionPhase::Stopped => {
            app.message = Some("stop the session to change the port".to_string());
        }

        Intent::PortUp => {
            session.set_port(app.state.port.saturating_add(1)).await;
        }

        Intent::PortDown => {
            session.set_port(app.state.port.saturating_sub(1)).await;
        }
    }
}

/// Point the log's selection at the record under the cursor and resolve it
async fn sync_selection(app: &mut TuiApp, session: &Session, log: &Arc<RequestLog>) {
    if let Some(id) = app.selected_id() {
        session.select_request(id).await;
    }
    app.selected = log.selected().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn app_with_records(n: usize) -> TuiApp {
        let mut app = TuiApp::new(SessionState {
            port: 8080,
            phase: SessionPhase::Stopped,
            tunnel_enabled: false,
            public_url: String::new(),
        });
        app.records = (0..n)
            .map(|i| RequestRecord {
                id: format!("r{}", i),
                method: "GET".to_string(),
                url: "/".to_string(),
                headers: HashMap::new(),
                query_params: HashMap::new(),
                body: String::new(),
                timestamp: Utc::now(),
            })
            .collect();
        app
    }

    fn press(app: &mut TuiApp, code: KeyCode) -> Option<Intent> {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_navigation_stays_in_bounds() {
        let mut app = app_with_records(2);

        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected_index, 0);

        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_index, 1);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_index, 1);
    }

    #[test]
    fn test_keys_map_to_intents() {
        let mut app = app_with_records(0);

        assert_eq!(press(&mut app, KeyCode::Char('s')), Some(Intent::ToggleSession));
        assert_eq!(press(&mut app, KeyCode::Char('t')), Some(Intent::ToggleTunnel));
        assert_eq!(press(&mut app, KeyCode::Char('c')), Some(Intent::Clear));
        assert_eq!(press(&mut app, KeyCode::Char('q')), Some(Intent::Quit));
        assert_eq!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Intent::Quit)
        );
    }

    #[test]
    fn test_selected_id_follows_cursor() {
        let mut app = app_with_records(3);
        assert_eq!(app.selected_id(), Some("r0"));

        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_id(), Some("r1"));

        app.records.clear();
        assert_eq!(app.selected_id(), None);
    }
}
