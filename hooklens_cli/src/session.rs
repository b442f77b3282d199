//! Capture session lifecycle: the state machine driving the backend and feed

use crate::backend::{ControlApiError, ControlClient};
use crate::feed::{FeedConnection, FeedError};
use crate::log::RequestLog;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a capture session is already active")]
    AlreadyRunning,

    #[error(transparent)]
    Control(#[from] ControlApiError),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Lifecycle phase of the capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Stopped => "stopped",
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Stopping => "stopping",
        }
    }
}

/// Mutable state of the single capture session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Capture port; editable only while stopped
    pub port: u16,

    pub phase: SessionPhase,

    /// Desired tunnel state; may be toggled while stopped and takes effect
    /// on the next start
    pub tunnel_enabled: bool,

    /// Public URL of the active tunnel; empty unless one is live
    pub public_url: String,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }
}

/// Events broadcast to session subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session state changed
    StateChanged(SessionState),

    /// The live feed faulted after being open. Never emitted for a feed the
    /// controller closed itself; the subscriber decides what to do (the
    /// shipped presentation layers force a stop).
    FeedFailed(String),
}

/// Handle to the single capture session
///
/// Cheap to clone; all clones share one state machine. Constructed once at
/// process start and handed to every consumer, so there is no global state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: RwLock<SessionState>,

    /// Serializes start/stop/toggle so transitions never interleave. A stop
    /// issued while a start is in flight waits here and runs right after
    /// the start resolves.
    op_lock: Mutex<()>,

    feed: Mutex<Option<FeedConnection>>,
    log: Arc<RequestLog>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(port: u16, tunnel_enabled: bool, log: Arc<RequestLog>) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState {
                    port,
                    phase: SessionPhase::Stopped,
                    tunnel_enabled,
                    public_url: String::new(),
                }),
                op_lock: Mutex::new(()),
                feed: Mutex::new(None),
                log,
                events_tx,
            }),
        }
    }

    /// Snapshot of the current session state
    pub async fn state(&self) -> SessionState {
        self.inner.state.read().await.clone()
    }

    /// The request log backing this session
    pub fn log(&self) -> Arc<RequestLog> {
        self.inner.log.clone()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Start a capture session on the configured port
    ///
    /// On success the live feed is open and the session is `Running`. On
    /// any failure the session is back in `Stopped` with an empty public
    /// URL and the error is returned to the caller.
    pub async fn start(&self) -> Result<(), SessionError> {
        let _op = self.inner.op_lock.lock().await;

        let (port, tunnel_enabled) = {
            let mut state = self.inner.state.write().await;
            if state.phase != SessionPhase::Stopped {
                return Err(SessionError::AlreadyRunning);
            }
            state.phase = SessionPhase::Starting;
            (state.port, state.tunnel_enabled)
        };
        self.publish_state().await;

        let control = ControlClient::new(port);
        let response = match control.start(port, tunnel_enabled).await {
            Ok(response) => response,
            Err(e) => {
                self.reset_stopped().await;
                return Err(e.into());
            }
        };

        let feed = match FeedConnection::open(
            port,
            self.inner.log.clone(),
            self.inner.events_tx.clone(),
        )
        .await
        {
            Ok(feed) => feed,
            Err(e) => {
                // The backend started but we cannot observe it; roll back.
                if let Err(stop_err) = control.stop().await {
                    tracing::warn!("Backend stop after feed failure also failed: {}", stop_err);
                }
                self.reset_stopped().await;
                return Err(e.into());
            }
        };

        *self.inner.feed.lock().await = Some(feed);
        {
            let mut state = self.inner.state.write().await;
            state.phase = SessionPhase::Running;
            // publicUrl is only meaningful while a tunnel is active
            state.public_url = if tunnel_enabled {
                response.public_url
            } else {
                String::new()
            };
        }
        self.publish_state().await;
        Ok(())
    }

    /// Stop the running session
    ///
    /// Best-effort: the feed is closed first, and a failing backend call is
    /// logged and swallowed so the local state always lands in `Stopped`.
    /// A no-op unless the session is `Running`.
    pub async fn stop(&self) {
        let _op = self.inner.op_lock.lock().await;

        {
            let mut state = self.inner.state.write().await;
            if state.phase != SessionPhase::Running {
                return;
            }
            state.phase = SessionPhase::Stopping;
        }
        self.publish_state().await;

        if let Some(mut feed) = self.inner.feed.lock().await.take() {
            feed.close().await;
        }

        let port = self.inner.state.read().await.port;
        if let Err(e) = ControlClient::new(port).stop().await {
            tracing::warn!("Backend stop failed, forcing local stop: {}", e);
        }

        self.reset_stopped().await;
    }

    /// Change the desired tunnel state
    ///
    /// While stopped this only records the flag, which takes effect on the
    /// next start. While running it is a two-phase intent: applied
    /// tentatively, committed on backend success, reverted on failure with
    /// the public URL untouched so subscribers see the toggle snap back.
    pub async fn set_tunnel_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        let _op = self.inner.op_lock.lock().await;

        let (phase, previous) = {
            let state = self.inner.state.read().await;
            (state.phase, state.tunnel_enabled)
        };
        if previous == enabled {
            return Ok(());
        }

        if phase != SessionPhase::Running {
            self.inner.state.write().await.tunnel_enabled = enabled;
            self.publish_state().await;
            return Ok(());
        }

        // Tentative apply so subscribers see the toggle immediately
        self.inner.state.write().await.tunnel_enabled = enabled;
        self.publish_state().await;

        let port = self.inner.state.read().await.port;
        let control = ControlClient::new(port);
        let result = if enabled {
            control.enable_tunnel().await
        } else {
            control.disable_tunnel().await
        };

        match result {
            Ok(response) => {
                {
                    let mut state = self.inner.state.write().await;
                    state.public_url = if enabled {
                        response.public_url
                    } else {
                        String::new()
                    };
                }
                self.publish_state().await;
                Ok(())
            }
            Err(e) => {
                self.inner.state.write().await.tunnel_enabled = previous;
                self.publish_state().await;
                Err(e.into())
            }
        }
    }

    /// Change the capture port; only honored while stopped
    pub async fn set_port(&self, port: u16) {
        {
            let mut state = self.inner.state.write().await;
            if state.phase != SessionPhase::Stopped {
                tracing::debug!("Ignoring port change while session is active");
                return;
            }
            state.port = port;
        }
        self.publish_state().await;
    }

    /// Empty the request log; received records otherwise survive
    /// stop/start cycles
    pub async fn clear(&self) {
        self.inner.log.clear().await;
    }

    /// Select a request by id for inspection
    pub async fn select_request(&self, id: impl Into<String>) {
        self.inner.log.select(id).await;
    }

    async fn reset_stopped(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.phase = SessionPhase::Stopped;
            state.public_url.clear();
        }
        self.publish_state().await;
    }

    async fn publish_state(&self) {
        let state = self.inner.state.read().await.clone();
        let _ = self.inner.events_tx.send(SessionEvent::StateChanged(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use hooklens_common::{endpoints, SessionResponse, StartSessionRequest};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PUBLIC_URL: &str = "https://abc.tunnel.example";

    #[derive(Default)]
    struct MockBackend {
        fail_start: bool,
        fail_stop: bool,
        fail_tunnel: bool,
        /// Close the feed socket as soon as all events are sent
        close_feed: bool,
        start_delay_ms: u64,
        events: Vec<String>,
        stop_calls: AtomicUsize,
        tunnel_calls: AtomicUsize,
    }

    async fn start_handler(
        State(mock): State<Arc<MockBackend>>,
        Json(req): Json<StartSessionRequest>,
    ) -> Response {
        if mock.start_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(mock.start_delay_ms)).await;
        }
        if mock.fail_start {
            return (StatusCode::INTERNAL_SERVER_ERROR, "listener refused").into_response();
        }
        let public_url = if req.enable_tunnel {
            PUBLIC_URL.to_string()
        } else {
            format!("http://localhost:{}", req.port)
        };
        Json(SessionResponse {
            public_url,
            port: req.port,
        })
        .into_response()
    }

    async fn stop_handler(State(mock): State<Arc<MockBackend>>) -> Response {
        mock.stop_calls.fetch_add(1, Ordering::SeqCst);
        if mock.fail_stop {
            return (StatusCode::INTERNAL_SERVER_ERROR, "backend gone").into_response();
        }
        StatusCode::OK.into_response()
    }

    async fn enable_handler(State(mock): State<Arc<MockBackend>>) -> Response {
        mock.tunnel_calls.fetch_add(1, Ordering::SeqCst);
        if mock.fail_tunnel {
            return (StatusCode::INTERNAL_SERVER_ERROR, "tunnel provisioning failed")
                .into_response();
        }
        Json(SessionResponse {
            public_url: PUBLIC_URL.to_string(),
            port: 0,
        })
        .into_response()
    }

    async fn disable_handler(State(mock): State<Arc<MockBackend>>) -> Response {
        mock.tunnel_calls.fetch_add(1, Ordering::SeqCst);
        if mock.fail_tunnel {
            return (StatusCode::INTERNAL_SERVER_ERROR, "tunnel teardown failed").into_response();
        }
        Json(SessionResponse {
            public_url: String::new(),
            port: 0,
        })
        .into_response()
    }

    async fn events_handler(State(mock): State<Arc<MockBackend>>, ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(move |socket| stream_events(socket, mock))
    }

    async fn stream_events(mut socket: WebSocket, mock: Arc<MockBackend>) {
        for event in &mock.events {
            if socket.send(WsMessage::Text(event.clone().into())).await.is_err() {
                return;
            }
        }
        if mock.close_feed {
            return;
        }
        // Keep the feed open until the client goes away
        while socket.recv().await.is_some() {}
    }

    async fn spawn_backend(mock: MockBackend) -> (u16, Arc<MockBackend>) {
        let mock = Arc::new(mock);
        let app = Router::new()
            .route(endpoints::START, post(start_handler))
            .route(endpoints::STOP, post(stop_handler))
            .route(endpoints::TUNNEL_ENABLE, post(enable_handler))
            .route(endpoints::TUNNEL_DISABLE, post(disable_handler))
            .route(endpoints::EVENTS, get(events_handler))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (port, mock)
    }

    fn event_json(id: &str, method: &str, url: &str) -> String {
        format!(
            r#"{{"id":"{}","method":"{}","url":"{}","headers":{{}},"queryParams":{{}},"body":"","timestamp":"2026-08-05T12:00:00Z"}}"#,
            id, method, url
        )
    }

    async fn wait_for<F, Fut>(mut condition: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..200 {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_receives_events_and_stops_clean() {
        let (port, _mock) = spawn_backend(MockBackend {
            events: vec![
                event_json("r1", "GET", "/healthz"),
                event_json("r2", "POST", "/api/orders"),
            ],
            ..Default::default()
        })
        .await;

        let log = Arc::new(RequestLog::new());
        let session = Session::new(port, true, log.clone());

        session.start().await.unwrap();
        let state = session.state().await;
        assert!(state.is_running());
        assert_eq!(state.public_url, PUBLIC_URL);

        let log_ref = log.clone();
        assert!(
            wait_for(|| {
                let log = log_ref.clone();
                async move { log.len().await == 2 }
            })
            .await
        );
        let records = log.records().await;
        assert_eq!(records[0].id, "r2");
        assert_eq!(records[0].method, "POST");
        assert_eq!(records[0].url, "/api/orders");
        assert_eq!(records[1].id, "r1");

        session.clear().await;
        assert_eq!(log.len().await, 0);
        assert!(log.selected().await.is_none());

        session.stop().await;
        let state = session.state().await;
        assert!(!state.is_running());
        assert_eq!(state.phase, SessionPhase::Stopped);
        assert_eq!(state.public_url, "");
    }

    #[tokio::test]
    async fn test_malformed_events_are_dropped() {
        let (port, _mock) = spawn_backend(MockBackend {
            events: vec![
                event_json("r1", "GET", "/a"),
                "not json at all".to_string(),
                r#"{"method":"GET","url":"/no-id","timestamp":"2026-08-05T12:00:00Z"}"#.to_string(),
                event_json("r2", "DELETE", "/b"),
            ],
            ..Default::default()
        })
        .await;

        let log = Arc::new(RequestLog::new());
        let session = Session::new(port, false, log.clone());
        session.start().await.unwrap();

        let log_ref = log.clone();
        assert!(
            wait_for(|| {
                let log = log_ref.clone();
                async move { log.len().await == 2 }
            })
            .await
        );
        // Nothing else shows up later
        tokio::time::sleep(Duration::from_millis(50)).await;
        let records = log.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "r2");
        assert_eq!(records[1].id, "r1");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_failed_start_leaves_session_stopped() {
        let (port, _mock) = spawn_backend(MockBackend {
            fail_start: true,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, true, Arc::new(RequestLog::new()));
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::Control(_)));

        let state = session.state().await;
        assert_eq!(state.phase, SessionPhase::Stopped);
        assert!(!state.is_running());
        assert_eq!(state.public_url, "");
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (port, _mock) = spawn_backend(MockBackend::default()).await;
        let session = Session::new(port, false, Arc::new(RequestLog::new()));

        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRunning));
        assert!(session.state().await.is_running());

        session.stop().await;
    }

    #[tokio::test]
    async fn test_stop_swallows_backend_failure() {
        let (port, mock) = spawn_backend(MockBackend {
            fail_stop: true,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, true, Arc::new(RequestLog::new()));
        session.start().await.unwrap();

        session.stop().await;
        let state = session.state().await;
        assert_eq!(state.phase, SessionPhase::Stopped);
        assert_eq!(state.public_url, "");
        assert_eq!(mock.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_while_stopped_is_a_noop() {
        let (port, mock) = spawn_backend(MockBackend::default()).await;
        let session = Session::new(port, false, Arc::new(RequestLog::new()));

        session.stop().await;
        assert_eq!(session.state().await.phase, SessionPhase::Stopped);
        assert_eq!(mock.stop_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_start_is_honored_after_start_resolves() {
        let (port, _mock) = spawn_backend(MockBackend {
            start_delay_ms: 100,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, false, Arc::new(RequestLog::new()));
        let starter = session.clone();
        let start_task = tokio::spawn(async move { starter.start().await });

        let session_ref = session.clone();
        assert!(
            wait_for(|| {
                let session = session_ref.clone();
                async move { session.state().await.phase == SessionPhase::Starting }
            })
            .await
        );

        // Queued behind the in-flight start; runs once it resolves
        session.stop().await;

        assert!(start_task.await.unwrap().is_ok());
        let state = session.state().await;
        assert_eq!(state.phase, SessionPhase::Stopped);
        assert_eq!(state.public_url, "");
    }

    #[tokio::test]
    async fn test_tunnel_toggle_commits_on_success() {
        let (port, _mock) = spawn_backend(MockBackend::default()).await;
        let session = Session::new(port, false, Arc::new(RequestLog::new()));

        session.start().await.unwrap();
        assert_eq!(session.state().await.public_url, "");

        session.set_tunnel_enabled(true).await.unwrap();
        let state = session.state().await;
        assert!(state.tunnel_enabled);
        assert_eq!(state.public_url, PUBLIC_URL);

        session.set_tunnel_enabled(false).await.unwrap();
        let state = session.state().await;
        assert!(!state.tunnel_enabled);
        assert_eq!(state.public_url, "");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_tunnel_disable_failure_snaps_back() {
        let (port, _mock) = spawn_backend(MockBackend {
            fail_tunnel: true,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, true, Arc::new(RequestLog::new()));
        session.start().await.unwrap();
        assert_eq!(session.state().await.public_url, PUBLIC_URL);

        let err = session.set_tunnel_enabled(false).await.unwrap_err();
        assert!(matches!(err, SessionError::Control(_)));

        let state = session.state().await;
        assert!(state.tunnel_enabled);
        assert_eq!(state.public_url, PUBLIC_URL);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_tunnel_enable_failure_snaps_back() {
        let (port, _mock) = spawn_backend(MockBackend {
            fail_tunnel: true,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, false, Arc::new(RequestLog::new()));
        session.start().await.unwrap();

        let err = session.set_tunnel_enabled(true).await.unwrap_err();
        assert!(matches!(err, SessionError::Control(_)));

        let state = session.state().await;
        assert!(!state.tunnel_enabled);
        assert_eq!(state.public_url, "");

        session.stop().await;
    }

    #[tokio::test]
    async fn test_tunnel_toggle_while_stopped_is_local_only() {
        let (port, mock) = spawn_backend(MockBackend::default()).await;
        let session = Session::new(port, false, Arc::new(RequestLog::new()));

        session.set_tunnel_enabled(true).await.unwrap();
        let state = session.state().await;
        assert!(state.tunnel_enabled);
        assert_eq!(state.public_url, "");
        assert_eq!(mock.tunnel_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_port_only_while_stopped() {
        let (port, _mock) = spawn_backend(MockBackend::default()).await;
        let session = Session::new(port, false, Arc::new(RequestLog::new()));

        session.start().await.unwrap();
        session.set_port(9999).await;
        assert_eq!(session.state().await.port, port);

        session.stop().await;
        session.set_port(9999).await;
        assert_eq!(session.state().await.port, 9999);
    }

    #[tokio::test]
    async fn test_feed_close_surfaces_failure() {
        let (port, _mock) = spawn_backend(MockBackend {
            events: vec![event_json("r1", "GET", "/a")],
            close_feed: true,
            ..Default::default()
        })
        .await;

        let session = Session::new(port, false, Arc::new(RequestLog::new()));
        let mut events = session.subscribe();
        session.start().await.unwrap();

        let failed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::FeedFailed(_)) => break true,
                    Ok(_) => continue,
                    Err(_) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);
        assert!(failed);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_log_survives_stop_start_cycle() {
        let (port, _mock) = spawn_backend(MockBackend {
            events: vec![event_json("r1", "GET", "/a")],
            ..Default::default()
        })
        .await;

        let log = Arc::new(RequestLog::new());
        let session = Session::new(port, false, log.clone());

        session.start().await.unwrap();
        let log_ref = log.clone();
        assert!(
            wait_for(|| {
                let log = log_ref.clone();
                async move { log.len().await == 1 }
            })
            .await
        );
        session.stop().await;

        // Stopping does not discard already-received records
        assert_eq!(log.len().await, 1);
    }
}
