//! Remux session state
//!
//! One session per viewing request. The candidate list is fixed at creation;
//! the cursor and state move forward only, under a short lock that is never
//! held across an await.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::watch;

use super::args::VideoPlan;
use crate::resolver::CandidateList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Live,
    Vod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Running,
    Retrying,
    Stopped,
}

/// What to do after the subprocess exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Respawn with the candidate at this index
    Retry(usize),
    /// Qualifying failure but nothing left to try
    Exhausted,
    /// Any other exit
    Finished,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    cursor: usize,
}

#[derive(Debug)]
pub struct RemuxSession {
    pub id: String,
    pub dir: PathBuf,
    pub candidates: CandidateList,
    pub kind: StreamKind,
    pub plan: VideoPlan,
    pub created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
    stop_tx: watch::Sender<bool>,
}

/// Serializable view for the debug endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub kind: StreamKind,
    pub state: SessionState,
    pub candidate: String,
    pub attempt: usize,
    pub candidates: usize,
    pub deinterlace: bool,
    pub transcode: bool,
    pub created_at: DateTime<Utc>,
}

impl RemuxSession {
    pub fn new(
        id: String,
        dir: PathBuf,
        candidates: CandidateList,
        cursor: usize,
        kind: StreamKind,
        plan: VideoPlan,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            id,
            dir,
            candidates,
            kind,
            plan,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Starting,
                cursor,
            }),
            stop_tx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }

    pub fn current_url(&self) -> &str {
        let cursor = self.cursor();
        self.candidates
            .get(cursor)
            .map(|s| s.as_str())
            .unwrap_or_else(|| self.candidates.first())
    }

    /// Subprocess is up. No-op once stopped.
    pub fn mark_running(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Stopped {
            inner.state = SessionState::Running;
        }
    }

    /// Move to Stopped; true only for the caller that made the transition
    pub fn mark_stopped(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Stopped {
            return false;
        }
        inner.state = SessionState::Stopped;
        true
    }

    /// Decide the next step after an exit and advance the cursor on retry
    pub fn on_exit(&self, code: Option<i32>, retry_code: i32) -> ExitDecision {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Stopped {
            return ExitDecision::Finished;
        }
        let decision = decide_exit(
            code,
            retry_code,
            self.kind,
            inner.cursor,
            self.candidates.len(),
        );
        if let ExitDecision::Retry(next) = decision {
            inner.cursor = next;
            inner.state = SessionState::Retrying;
        }
        decision
    }

    /// Ask the supervisor to kill the subprocess
    pub fn signal_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            state: inner.state,
            candidate: self
                .candidates
                .get(inner.cursor)
                .cloned()
                .unwrap_or_default(),
            attempt: inner.cursor + 1,
            candidates: self.candidates.len(),
            deinterlace: self.plan.deinterlace,
            transcode: self.plan.transcode,
            created_at: self.created_at,
        }
    }
}

/// Resolves once a stop has been signalled
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Retry only a live session that exited with the designated status and
/// still has untried candidates.
pub fn decide_exit(
    code: Option<i32>,
    retry_code: i32,
    kind: StreamKind,
    cursor: usize,
    total: usize,
) -> ExitDecision {
    if code != Some(retry_code) || kind == StreamKind::Vod {
        return ExitDecision::Finished;
    }
    if cursor + 1 < total {
        ExitDecision::Retry(cursor + 1)
    } else {
        ExitDecision::Exhausted
    }
}
