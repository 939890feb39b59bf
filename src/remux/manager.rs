//! Remux session manager
//!
//! Owns the session registry. Each session gets a supervisor task that owns
//! the ffmpeg child, walks the candidate list on qualifying failures and
//! cleans up the session directory when the session ends.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use uuid::Uuid;

use super::args::{remux_args, HlsOutput, VideoPlan};
use super::session::{stopped, ExitDecision, RemuxSession, SessionSnapshot, StreamKind};
use crate::config::RemuxConfig;
use crate::error::{GatewayError, Result};
use crate::hls::manifest::EMPTY_MANIFEST;
use crate::resolver::CandidateList;

/// Everything needed to start a session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub candidates: CandidateList,
    /// Index of the candidate to start with
    pub cursor: usize,
    pub kind: StreamKind,
    pub plan: VideoPlan,
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<RemuxSession>>,
    config: RemuxConfig,
    identity: Vec<String>,
}

impl SessionManager {
    pub fn new(config: RemuxConfig, identity: Vec<String>) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            identity,
        }
    }

    pub fn hls_root(&self) -> &Path {
        &self.config.hls_root
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.config.ffmpeg_path
    }

    pub fn get(&self, id: &str) -> Option<Arc<RemuxSession>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<_> = self.sessions.iter().map(|s| s.snapshot()).collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Create the session directory, spawn ffmpeg and register the session.
    /// Returns once the subprocess is started.
    pub async fn start(self: &Arc<Self>, request: SessionRequest) -> Result<Arc<RemuxSession>> {
        let id = Uuid::new_v4().to_string();
        let dir = self.config.hls_root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join("out.m3u8.tmp"), EMPTY_MANIFEST).await?;

        let session = Arc::new(RemuxSession::new(
            id.clone(),
            dir,
            request.candidates,
            request.cursor,
            request.kind,
            request.plan,
        ));

        let child = match self.spawn(&session) {
            Ok(child) => child,
            Err(e) => {
                session.mark_stopped();
                remove_dir_later(session.dir.clone(), Duration::ZERO);
                return Err(e);
            }
        };

        tracing::info!(
            "Session {} started ({:?}, candidate {}/{}): {}",
            id,
            session.kind,
            session.cursor() + 1,
            session.candidates.len(),
            session.current_url()
        );
        self.sessions.insert(id, session.clone());
        tokio::spawn(Arc::clone(self).supervise(session.clone(), child));

        Ok(session)
    }

    fn spawn(&self, session: &RemuxSession) -> Result<Child> {
        let output = HlsOutput {
            segment_secs: self.config.segment_secs,
            list_size: self.config.list_size,
        };
        let args = remux_args(
            &self.identity,
            session.current_url(),
            session.plan,
            output,
            &session.dir,
        );
        tracing::debug!("Spawning {} {}", self.config.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GatewayError::ToolMissing(self.config.ffmpeg_path.clone())
                } else {
                    GatewayError::Io(e)
                }
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(session.id.clone(), stderr));
        }
        Ok(child)
    }

    async fn supervise(self: Arc<Self>, session: Arc<RemuxSession>, mut child: Child) {
        let mut stop = session.stop_signal();
        session.mark_running();

        loop {
            let status = tokio::select! {
                () = stopped(&mut stop) => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Session {}: failed to kill ffmpeg: {}", session.id, e);
                    }
                    tracing::info!("Session {} stopped", session.id);
                    return;
                }
                status = child.wait() => status,
            };

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Session {}: wait failed: {}", session.id, e);
                    None
                }
            };

            match session.on_exit(code, self.config.retry_exit_code) {
                ExitDecision::Retry(next) => {
                    tracing::info!(
                        "Session {}: ffmpeg exited with {:?}, trying candidate {}/{}: {}",
                        session.id,
                        code,
                        next + 1,
                        session.candidates.len(),
                        session.current_url()
                    );
                    match self.spawn(&session) {
                        Ok(respawned) => {
                            child = respawned;
                            session.mark_running();
                        }
                        Err(e) => {
                            tracing::warn!("Session {}: respawn failed: {}", session.id, e);
                            self.finish(&session, Duration::ZERO);
                            return;
                        }
                    }
                }
                ExitDecision::Exhausted => {
                    let err = GatewayError::ProcessFailure(format!(
                        "all {} candidates failed",
                        session.candidates.len()
                    ));
                    tracing::warn!("Session {}: {}", session.id, err);
                    self.finish(&session, Duration::ZERO);
                    return;
                }
                ExitDecision::Finished => {
                    match code {
                        Some(0) => tracing::info!("Session {}: ffmpeg finished", session.id),
                        _ => {
                            let err = GatewayError::ProcessFailure(format!(
                                "ffmpeg exited with {:?}",
                                code
                            ));
                            tracing::warn!("Session {}: {}", session.id, err);
                        }
                    }
                    self.finish(&session, self.config.cleanup_grace());
                    return;
                }
            }
        }
    }

    /// Deregister a session that ended on its own
    fn finish(&self, session: &RemuxSession, delay: Duration) {
        self.sessions.remove(&session.id);
        if session.mark_stopped() {
            remove_dir_later(session.dir.clone(), delay);
        }
    }

    /// Stop a session. Unknown or already stopped ids are not an error.
    pub fn stop(&self, id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            tracing::debug!("Stop requested for unknown session {}", id);
            return false;
        };
        if session.mark_stopped() {
            session.signal_stop();
            remove_dir_later(session.dir.clone(), Duration::ZERO);
        }
        true
    }

    /// Stop every session and wipe the HLS root. Returns the number of
    /// sessions stopped.
    pub async fn reset(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        let mut stopped = 0;

        for id in ids {
            let Some((_, session)) = self.sessions.remove(&id) else {
                continue;
            };
            session.mark_stopped();
            session.signal_stop();
            remove_dir_logged(&session.dir).await;
            stopped += 1;
        }

        self.wipe_root().await;
        tracing::info!("Reset: stopped {} sessions", stopped);
        stopped
    }

    async fn wipe_root(&self) {
        let mut entries = match tokio::fs::read_dir(&self.config.hls_root).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Cannot list {}: {}", self.config.hls_root.display(), e);
                }
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                remove_dir_logged(&path).await;
            } else if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

async fn remove_dir_logged(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

/// Fire-and-forget directory removal
pub fn remove_dir_later(dir: PathBuf, delay: Duration) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        remove_dir_logged(&dir).await;
        tracing::debug!("Removed {}", dir.display());
    });
}

async fn drain_stderr(id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.contains("403") || line.contains("Forbidden") {
                    tracing::warn!("Session {}: upstream refused: {}", id, line);
                } else {
                    tracing::trace!("ffmpeg[{}]: {}", id, line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Session {}: stderr read failed: {}", id, e);
                break;
            }
        }
    }
}
