use crate::types::ExecutionId;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum SandboxMessage {
    /// Start tracking an execution. Answers `false` once the sandbox is shut down.
    Track {
        execution_id: ExecutionId,
        kill_tx: oneshot::Sender<()>,
        response: oneshot::Sender<bool>,
    },
    Untrack {
        execution_id: ExecutionId,
    },
    Running {
        response: oneshot::Sender<usize>,
    },
    Shutdown {
        response: oneshot::Sender<usize>,
    },
}
