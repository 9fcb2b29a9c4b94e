use crate::error::SandboxError;
use crate::types::{Job, TaskOutput};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum AgentMessage {
    Work {
        job: Job,
        response: oneshot::Sender<Result<TaskOutput, SandboxError>>,
    },
    Exit {
        response: oneshot::Sender<()>,
    },
}
