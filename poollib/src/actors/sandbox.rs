mod actor;
mod messages;
mod process;
mod scratch;

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::types::{ExecutionId, Job, TaskOutput};
use actor::Actor;
use messages::SandboxMessage;
use scratch::ScratchDir;

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// A `Sandbox` which runs job scripts in throwaway scratch directories.
///
/// This struct is an actor handle. The actor only owns the set of running executions, so every
/// execution itself runs in the caller's task and any number of them can proceed at once. Clone
/// it freely; `shutdown` on any clone kills every execution still running.
#[derive(Clone)]
pub struct SandboxHandle {
    sender: mpsc::UnboundedSender<SandboxMessage>,
    config: Arc<SandboxConfig>,
}

impl SandboxHandle {
    pub fn spawn(config: SandboxConfig) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        Actor::spawn(inbox);
        Self {
            sender,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `job.script` to completion in a fresh scratch directory.
    ///
    /// The scratch directory is gone by the time this returns, whatever the outcome, and also if
    /// the returned future is dropped early.
    pub async fn execute(&self, job: &Job) -> Result<TaskOutput, SandboxError> {
        let execution_id = Uuid::new_v4();
        let (kill_tx, kill_rx) = oneshot::channel();
        let _tracked = self.track(execution_id, kill_tx).await?;

        let scratch = ScratchDir::create(&self.config.scratch_root, execution_id)
            .await
            .map_err(SandboxError::ScratchDir)?;
        tracing::debug!(job_id = %job.id, %execution_id, dir = ?scratch.path(), "created scratch directory");

        let child = process::spawn(&self.config.shell, &job.script, scratch.path())
            .map_err(SandboxError::Spawn)?;
        let output = process::run_to_completion(child, kill_rx).await;

        if let Err(err) = scratch.remove().await {
            tracing::warn!(%execution_id, error = %err, "failed to remove scratch directory");
        }
        output.map_err(SandboxError::Output)
    }

    /// Number of executions currently running.
    pub async fn running(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(SandboxMessage::Running { response: tx }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Kill every running execution and refuse new ones. Returns how many were killed.
    pub async fn shutdown(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(SandboxMessage::Shutdown { response: tx }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    async fn track(
        &self,
        execution_id: ExecutionId,
        kill_tx: oneshot::Sender<()>,
    ) -> Result<Tracked, SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SandboxMessage::Track {
                execution_id,
                kill_tx,
                response: tx,
            })
            .map_err(|_| SandboxError::Closed)?;
        match rx.await {
            Ok(true) => Ok(Tracked {
                execution_id,
                sender: self.sender.clone(),
            }),
            _ => Err(SandboxError::Closed),
        }
    }
}

/// Untracks its execution when dropped, whichever way the execution ended.
struct Tracked {
    execution_id: ExecutionId,
    sender: mpsc::UnboundedSender<SandboxMessage>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let _ = self.sender.send(SandboxMessage::Untrack {
            execution_id: self.execution_id,
        });
    }
}
