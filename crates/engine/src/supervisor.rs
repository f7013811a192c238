use crate::event::{FailureReport, SessionEvent};
use crate::session::{BacktestSession, SessionHandle};
use api_client::SessionApi;
use configuration::Config;
use core_types::{RunMode, SeriesPoint, SessionId, SessionState};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// What a supervised run ended with.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub points: Vec<SeriesPoint>,
    pub failure: Option<FailureReport>,
}

/// What the caller gets back from `launch`.
pub struct LaunchedRun {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
}

struct ActiveRun {
    handle: SessionHandle,
    task: JoinHandle<RunOutcome>,
}

/// Owns the "current" run. Launching a new run closes the previous one and
/// waits for it to wind down first, so two runs never stream at once.
pub struct RunSupervisor {
    api: Arc<dyn SessionApi>,
    config: Config,
    current: Option<ActiveRun>,
}

impl RunSupervisor {
    pub fn new(api: Arc<dyn SessionApi>, config: Config) -> Self {
        Self {
            api,
            config,
            current: None,
        }
    }

    /// Starts `source` as the new current run on the Tokio runtime.
    pub async fn launch(&mut self, source: String, mode: RunMode) -> LaunchedRun {
        if let Some(previous) = self.current.take() {
            tracing::info!("Closing the previous run before launching a new one.");
            previous.handle.close();
            Self::wait(previous.task).await;
        }

        let mut session = BacktestSession::new(self.api.clone(), &self.config);
        let handle = session.handle();
        let events = session.subscribe();

        let task = tokio::spawn(async move {
            let failure = session
                .run(&source, mode)
                .await
                .err()
                .map(|e| FailureReport::from(&e));
            RunOutcome {
                state: session.state(),
                session_id: session.session_id().cloned(),
                points: session.series().to_vec(),
                failure,
            }
        });

        self.current = Some(ActiveRun {
            handle: handle.clone(),
            task,
        });
        LaunchedRun { handle, events }
    }

    /// Waits for the current run to end. `None` if there is none.
    pub async fn join(&mut self) -> Option<RunOutcome> {
        let run = self.current.take()?;
        Self::wait(run.task).await
    }

    /// Closes the current run without waiting for it.
    pub fn close_current(&self) {
        if let Some(run) = &self.current {
            run.handle.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|run| !run.task.is_finished())
    }

    async fn wait(task: JoinHandle<RunOutcome>) -> Option<RunOutcome> {
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(error = %e, "Run task did not complete.");
                None
            }
        }
    }
}
