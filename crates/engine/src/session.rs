use crate::error::SessionError;
use crate::event::{FailureReport, SessionEvent};
use analytics::{SeriesAccumulator, SeriesError};
use api_client::{ChannelEvent, SessionApi, StreamChannel};
use chrono::NaiveDate;
use configuration::{Config, ServerConfig, SessionConfig};
use core_types::{RunMode, SeriesPoint, SessionId, SessionState};
use protocol::{Dialect, Frame, SeriesInit, WireCodec};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// A cloneable remote control for a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Closes the session from anywhere. Whatever the session is awaiting is
    /// abandoned, its channel is closed and no further events are delivered.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One backtest run, from session creation to the end of its stream.
///
/// The session is an explicit value owned by whoever drives it. Frames are
/// processed one at a time in arrival order and every state change is
/// broadcast to subscribers.
pub struct BacktestSession {
    api: Arc<dyn SessionApi>,
    server: ServerConfig,
    config: SessionConfig,

    state: SessionState,
    session_id: Option<SessionId>,
    channel: Option<StreamChannel>,
    series: SeriesAccumulator,

    ready_sent: bool,
    finished_sent: bool,
    malformed_streak: u32,

    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl BacktestSession {
    pub fn new(api: Arc<dyn SessionApi>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.session.event_buffer.max(1));
        Self {
            api,
            server: config.server.clone(),
            config: config.session.clone(),
            state: SessionState::Idle,
            session_id: None,
            channel: None,
            series: SeriesAccumulator::new(),
            ready_sent: false,
            finished_sent: false,
            malformed_streak: 0,
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Read-only view of the points accumulated so far.
    pub fn series(&self) -> &[SeriesPoint] {
        self.series.snapshot()
    }

    pub fn accumulator(&self) -> &SeriesAccumulator {
        &self.series
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Asks the server for a session id. Only valid from `Idle`; on failure
    /// the session stays `Idle` and may be retried.
    pub async fn create_session(&mut self) -> Result<SessionId, SessionError> {
        self.ensure_state("create_session", SessionState::Idle)?;

        let api = self.api.clone();
        let created = race(&self.cancel, async {
            api.create_session().await.map_err(SessionError::from)
        })
        .await;
        match created {
            Ok(session_id) => {
                tracing::info!(session_id = %session_id, "Session created.");
                self.session_id = Some(session_id.clone());
                self.transition(SessionState::SessionCreated);
                Ok(session_id)
            }
            Err(SessionError::Cancelled) => Err(self.enter_closed()),
            Err(e) => {
                tracing::warn!(error = %e, "Session creation failed.");
                Err(e)
            }
        }
    }

    /// Submits `source` for a run, opens the run's channel and waits for it
    /// to open. Leaves the session `Streaming` on success.
    pub async fn start_run(&mut self, source: &str, mode: RunMode) -> Result<(), SessionError> {
        self.ensure_state("start_run", SessionState::SessionCreated)?;
        self.transition(SessionState::Running);

        match self.open_stream(source, mode).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Consumes frames until the run ends. Returns the number of points on a
    /// clean finish.
    pub async fn stream(&mut self) -> Result<usize, SessionError> {
        self.ensure_state("stream", SessionState::Streaming)?;
        let idle = self.config.idle_timeout();

        loop {
            let Some(channel) = self.channel.as_mut() else {
                let e = SessionError::Protocol("streaming without a channel".to_string());
                return Err(self.fail(e));
            };
            let next = race(&self.cancel, async {
                timeout(idle, channel.next_event())
                    .await
                    .map_err(|_| SessionError::IdleTimeout(idle))
            })
            .await;

            let outcome = match next {
                Ok(event) => self.handle_channel_event(event),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(Some(points)) => return Ok(points),
                Ok(None) => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// `create_session`, `start_run` and `stream` in one call.
    pub async fn run(&mut self, source: &str, mode: RunMode) -> Result<usize, SessionError> {
        self.create_session().await?;
        self.start_run(source, mode).await?;
        self.stream().await
    }

    /// Closes the session from its owner. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.enter_closed();
    }

    // --- Internals ---

    async fn open_stream(&mut self, source: &str, mode: RunMode) -> Result<(), SessionError> {
        let session_id = self.session_id.clone().ok_or(SessionError::Precondition {
            operation: "start_run",
            state: self.state,
        })?;

        let api = self.api.clone();
        let endpoint = race(&self.cancel, async {
            api.start_run(source, mode, &session_id)
                .await
                .map_err(SessionError::from)
        })
        .await?;

        let channel = self
            .channel
            .insert(StreamChannel::open(&endpoint, &self.server.page_host)?);
        tracing::info!(session_id = %session_id, uri = %channel.uri(), "Connecting to run stream.");

        let connect_timeout = self.server.connect_timeout();
        let first = race(&self.cancel, async {
            timeout(connect_timeout, channel.next_event())
                .await
                .map_err(|_| SessionError::ConnectTimeout(connect_timeout))
        })
        .await?;

        match first {
            Some(ChannelEvent::Open) => {}
            Some(ChannelEvent::Error(message)) => return Err(SessionError::Transport(message)),
            Some(ChannelEvent::Closed { code, reason }) => {
                return Err(SessionError::ChannelClosed { code, reason });
            }
            Some(ChannelEvent::Message(raw)) => {
                return Err(SessionError::Protocol(format!("message before open: {}", raw)));
            }
            None => return Err(channel_ended()),
        }

        let origin = day_before(self.config.start_date);
        self.series.reset(origin, None, None);
        self.ready_sent = false;
        self.finished_sent = false;
        self.malformed_streak = 0;
        self.broadcast(SessionEvent::SeriesStarted {
            title: None,
            axis_label: None,
            origin,
        });

        if self.config.protocol.sends_ready_on_open() {
            self.send_ready()?;
        }
        self.transition(SessionState::Streaming);
        Ok(())
    }

    /// `Ok(Some(points))` once the run has finished.
    fn handle_channel_event(&mut self, event: Option<ChannelEvent>) -> Result<Option<usize>, SessionError> {
        match event {
            Some(ChannelEvent::Message(raw)) => self.handle_frame(&raw),
            Some(ChannelEvent::Open) => {
                tracing::warn!("Ignoring a repeated open event.");
                Ok(None)
            }
            Some(ChannelEvent::Error(message)) => Err(SessionError::Transport(message)),
            Some(ChannelEvent::Closed { code, reason }) => Err(SessionError::ChannelClosed { code, reason }),
            None => Err(channel_ended()),
        }
    }

    fn handle_frame(&mut self, raw: &str) -> Result<Option<usize>, SessionError> {
        match WireCodec::decode(raw) {
            Frame::Malformed(reason) => {
                self.record_malformed(raw, &reason)?;
                Ok(None)
            }
            Frame::Init(_) if !self.series.is_empty() => {
                self.record_malformed(raw, "series header after data points")?;
                Ok(None)
            }
            Frame::Init(init) => {
                self.malformed_streak = 0;
                self.apply_init(init);
                Ok(None)
            }
            Frame::Handshake => {
                self.malformed_streak = 0;
                if !self.ready_sent {
                    self.send_ready()?;
                }
                Ok(None)
            }
            Frame::DataPoint(point) => match self.series.append(point) {
                Ok(point) => {
                    self.malformed_streak = 0;
                    tracing::debug!(date = %point.date, "Point appended.");
                    self.broadcast(SessionEvent::PointAppended(point));
                    Ok(None)
                }
                // Dropped; the series keeps its last good point.
                Err(e @ SeriesError::OutOfOrder { .. }) => {
                    self.record_malformed(raw, &e.to_string())?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            },
            Frame::Terminal(dialect) => {
                self.malformed_streak = 0;
                Ok(Some(self.finish(dialect)))
            }
        }
    }

    fn record_malformed(&mut self, raw: &str, reason: &str) -> Result<(), SessionError> {
        self.malformed_streak += 1;
        tracing::warn!(raw, reason, streak = self.malformed_streak, "Malformed frame.");
        if self.malformed_streak > self.config.max_consecutive_malformed {
            return Err(SessionError::Protocol(format!(
                "{} consecutive malformed frames, last: {}",
                self.malformed_streak, reason
            )));
        }
        Ok(())
    }

    fn apply_init(&mut self, init: SeriesInit) {
        let origin = init
            .start_date
            .map(day_before)
            .or(self.series.origin())
            .unwrap_or_else(|| day_before(self.config.start_date));
        tracing::info!(%origin, title = ?init.title, "Series header received.");
        self.series.reset(origin, init.title.clone(), init.axis_label.clone());
        self.broadcast(SessionEvent::SeriesStarted {
            title: init.title,
            axis_label: init.axis_label,
            origin,
        });
    }

    fn finish(&mut self, dialect: Dialect) -> usize {
        if dialect == Dialect::BareText && !self.finished_sent {
            if let Some(channel) = self.channel.as_ref() {
                match channel.send(WireCodec::encode_finished()) {
                    Ok(()) => self.finished_sent = true,
                    Err(e) => tracing::warn!(error = %e, "Could not acknowledge the end of the run."),
                }
            }
        }
        self.close_channel();

        let points = self.series.len();
        tracing::info!(session_id = ?self.session_id, points, "Run finished.");
        self.transition(SessionState::Finished);
        self.broadcast(SessionEvent::Finished { points });
        points
    }

    fn send_ready(&mut self) -> Result<(), SessionError> {
        let channel = self.channel.as_ref().ok_or(api_client::ChannelError::NotOpen)?;
        channel.send(WireCodec::encode_ready())?;
        self.ready_sent = true;
        tracing::debug!("READY sent.");
        Ok(())
    }

    /// Moves to `Failed` (or `Closed` when cancelled) and hands the error back.
    fn fail(&mut self, error: SessionError) -> SessionError {
        if matches!(error, SessionError::Cancelled) {
            return self.enter_closed();
        }

        tracing::error!(session_id = ?self.session_id, code = %error.code(), error = %error, "Session failed.");
        self.close_channel();
        self.transition(SessionState::Failed);
        self.broadcast(SessionEvent::Failed(FailureReport::from(&error)));
        error
    }

    fn enter_closed(&mut self) -> SessionError {
        self.close_channel();
        if !self.state.is_terminal() {
            tracing::info!(session_id = ?self.session_id, state = %self.state, "Session closed by owner.");
            self.state = SessionState::Closed;
        }
        SessionError::Cancelled
    }

    /// Closes the channel and reports anything still buffered in it.
    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            while let Some(event) = channel.try_next_event() {
                if let ChannelEvent::Message(raw) = event {
                    tracing::warn!(raw = %raw, "Frame arrived after the run ended; ignored.");
                }
            }
        }
    }

    fn ensure_state(&mut self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            return Err(self.enter_closed());
        }
        if self.state != expected {
            return Err(SessionError::Precondition {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "Session state change.");
        self.state = next;
        self.broadcast(SessionEvent::StateChanged(next));
    }

    fn broadcast(&self, event: SessionEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn race<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        result = fut => result,
    }
}

fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

fn channel_ended() -> SessionError {
    SessionError::ChannelClosed {
        code: None,
        reason: "channel ended".to_string(),
    }
}
