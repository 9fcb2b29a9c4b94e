use super::messages::AgentMessage;
use crate::actors::sandbox::SandboxHandle;
use crate::error::SandboxError;
use crate::types::{Job, TaskOutput, WorkerRef};

use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub struct Actor {
    inbox: mpsc::Receiver<AgentMessage>,
    identity: WorkerRef,
    sandbox: SandboxHandle,
    exited: CancellationToken,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::Receiver<AgentMessage>,
        identity: WorkerRef,
        sandbox: SandboxHandle,
        exited: CancellationToken,
    ) {
        let actor = Self {
            inbox,
            identity,
            sandbox,
            exited,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use AgentMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Work { job, response } => self.work(job, response),
                Exit { response } => {
                    self.exit().await;
                    let _ = response.send(());
                }
            }
        }
        // agent handle dropped, make sure running jobs go down with it
        self.exit().await;
    }

    /// Run the job in its own task so a slow script never holds up the inbox.
    fn work(&self, job: Job, response: oneshot::Sender<Result<TaskOutput, SandboxError>>) {
        if self.exited.is_cancelled() {
            let _ = response.send(Err(SandboxError::Closed));
            return;
        }
        let sandbox = self.sandbox.clone();
        let worker = self.identity.id;
        tokio::spawn(async move {
            let started = Instant::now();
            tracing::info!(%worker, job = %job, "executing job");
            let result = sandbox.execute(&job).await;
            match &result {
                Ok(output) => tracing::info!(
                    %worker,
                    job_id = %job.id,
                    exit_code = output.exit_code,
                    elapsed = ?started.elapsed(),
                    "finished executing job"
                ),
                Err(err) => tracing::error!(
                    %worker,
                    job_id = %job.id,
                    error = %err,
                    elapsed = ?started.elapsed(),
                    "job execution failed"
                ),
            }
            let _ = response.send(result);
        });
    }

    async fn exit(&mut self) {
        if self.exited.is_cancelled() {
            return;
        }
        tracing::info!(worker = %self.identity, "terminating worker");
        let killed = self.sandbox.shutdown().await;
        if killed > 0 {
            tracing::warn!(killed, "killed jobs still running at exit");
        }
        self.exited.cancel();
    }
}
