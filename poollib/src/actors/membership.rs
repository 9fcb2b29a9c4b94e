mod actor;
mod messages;

use crate::error::{self, PoolError};
use crate::transport::ClusterTransport;
use crate::types::WorkerRef;
use actor::Actor;
use messages::MembershipMessage::{self, Snapshot, Stop};

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A `Membership` tracker which keeps the set of live workers announced by a transport.
///
/// This struct is an actor handle; the set itself lives in the actor spawned by `spawn`, which
/// consumes the transport's discovery stream and termination watches until `stop` is called.
#[derive(Clone)]
pub struct MembershipHandle {
    sender: mpsc::Sender<MembershipMessage>,
}

impl MembershipHandle {
    /// Start tracking the workers `transport` announces.
    ///
    /// `message_capacity` bounds the build-up of inbound requests.
    pub fn spawn(transport: Arc<dyn ClusterTransport>, message_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(message_capacity);
        Actor::spawn(receiver, transport);
        Self { sender }
    }

    /// A point-in-time copy of the tracked workers, in no particular order.
    pub async fn snapshot(&self) -> error::Result<Vec<WorkerRef>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Snapshot { response: tx })
            .await
            .map_err(|_| PoolError::MembershipClosed)?;
        rx.await.map_err(|_| PoolError::MembershipClosed)
    }

    /// Stop applying announcements and terminations. The set stays readable, frozen as it was.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Stop { response: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}
