use crate::types::WorkerRef;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum MembershipMessage {
    Snapshot {
        response: oneshot::Sender<Vec<WorkerRef>>,
    },
    Stop {
        response: oneshot::Sender<()>,
    },
}
