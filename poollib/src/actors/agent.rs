mod actor;
mod messages;

use crate::actors::sandbox::SandboxHandle;
use crate::error::{SandboxError, TransportError};
use crate::transport::Registrar;
use crate::types::{Job, TaskOutput, WorkerRef};
use actor::Actor;
use messages::AgentMessage;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const INBOX_CAPACITY: usize = 64;

/// A `WorkerAgent` which accepts jobs on behalf of one worker process.
///
/// This struct is an actor handle. Each agent gets a fresh identity when spawned, so two worker
/// processes are always tracked (and removed) separately by the pool.
#[derive(Clone)]
pub struct WorkerAgentHandle {
    sender: mpsc::Sender<AgentMessage>,
    identity: WorkerRef,
    exited: CancellationToken,
}

impl WorkerAgentHandle {
    /// Spawn an agent reachable at `location` that runs jobs in `sandbox`.
    pub fn spawn(location: impl Into<String>, sandbox: SandboxHandle) -> Self {
        let identity = WorkerRef::new(Uuid::new_v4(), location);
        let exited = CancellationToken::new();
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        Actor::spawn(inbox, identity.clone(), sandbox, exited.clone());
        Self {
            sender,
            identity,
            exited,
        }
    }

    pub fn identity(&self) -> &WorkerRef {
        &self.identity
    }

    /// Announce this agent through `registrar`.
    pub async fn register(&self, registrar: &dyn Registrar) -> Result<(), TransportError> {
        registrar.register(&self.identity).await?;
        tracing::info!(worker = %self.identity, "worker registered");
        Ok(())
    }

    /// Run `job` in the sandbox. Calls may overlap; each gets its own scratch directory.
    pub async fn work(&self, job: Job) -> Result<TaskOutput, SandboxError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AgentMessage::Work { job, response: tx })
            .await
            .map_err(|_| SandboxError::Closed)?;
        rx.await.map_err(|_| SandboxError::Closed)?
    }

    /// Ask the agent to shut down. Safe to call any number of times.
    pub async fn exit(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(AgentMessage::Exit { response: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Cancelled once the agent has exited; hosting servers stop on it.
    pub fn exit_token(&self) -> CancellationToken {
        self.exited.clone()
    }
}
