use super::{ClusterTransport, Registrar, WorkerReply, WorkerRequest};
use crate::error::TransportError;
use crate::types::{WorkerId, WorkerRef};
use crate::WorkerAgent;

use async_trait::async_trait;
use futures::{future::BoxFuture, stream, stream::BoxStream, FutureExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// An in-process cluster: workers are bound to a location string and reached by calling their
/// agent handle directly.
///
/// The one `list()` stream first replays the workers registered so far, then follows new
/// registrations; later calls get an empty stream. `terminate` plays the part of a peer
/// becoming unreachable.
#[derive(Clone, Default)]
pub struct LocalCluster {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    subscriber: Option<mpsc::UnboundedSender<WorkerRef>>,
    listed: bool,
    members: HashMap<WorkerId, Member>,
    endpoints: HashMap<String, WorkerAgent>,
    closed: bool,
}

struct Member {
    worker: WorkerRef,
    // dropping the sender is the termination notice
    _alive_tx: watch::Sender<()>,
    alive_rx: watch::Receiver<()>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `agent` at its own location.
    pub fn bind(&self, agent: WorkerAgent) {
        let location = agent.identity().location.clone();
        self.state().endpoints.insert(location, agent);
    }

    /// Publish an announcement for `worker`, even if it is already registered.
    pub fn announce(&self, worker: WorkerRef) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.members.entry(worker.id).or_insert_with(|| {
            let (alive_tx, alive_rx) = watch::channel(());
            Member {
                worker: worker.clone(),
                _alive_tx: alive_tx,
                alive_rx,
            }
        });
        let delivered = match &state.subscriber {
            Some(subscriber) => subscriber.send(worker.clone()).is_ok(),
            None => true,
        };
        if !delivered {
            state.subscriber = None;
        }
    }

    /// Report `worker_id` as unreachable to every watcher.
    pub fn terminate(&self, worker_id: WorkerId) {
        if self.state().members.remove(&worker_id).is_some() {
            tracing::debug!(worker = %worker_id, "local worker terminated");
        }
    }

    pub fn members(&self) -> Vec<WorkerRef> {
        self.state()
            .members
            .values()
            .map(|member| member.worker.clone())
            .collect()
    }
}

#[async_trait]
impl ClusterTransport for LocalCluster {
    fn list(&self) -> BoxStream<'static, WorkerRef> {
        let mut state = self.state();
        if state.closed {
            return stream::empty().boxed();
        }
        if state.listed {
            tracing::warn!("worker announcements were already taken");
            return stream::empty().boxed();
        }
        state.listed = true;

        let (tx, rx) = mpsc::unbounded_channel();
        for member in state.members.values() {
            let _ = tx.send(member.worker.clone());
        }
        state.subscriber = Some(tx);
        UnboundedReceiverStream::new(rx).boxed()
    }

    fn watch(&self, worker: &WorkerRef) -> BoxFuture<'static, ()> {
        let alive_rx = self
            .state()
            .members
            .get(&worker.id)
            .map(|member| member.alive_rx.clone());
        async move {
            if let Some(mut alive_rx) = alive_rx {
                while alive_rx.changed().await.is_ok() {}
            }
        }
        .boxed()
    }

    async fn send(
        &self,
        worker: &WorkerRef,
        request: WorkerRequest,
    ) -> Result<WorkerReply, TransportError> {
        let agent = {
            let state = self.state();
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.endpoints.get(&worker.location).cloned()
        };
        let agent = agent.ok_or_else(|| TransportError::Unreachable {
            peer: worker.location.clone(),
            reason: "nothing bound at this location".into(),
        })?;

        match request {
            WorkerRequest::Work(job) => agent
                .work(job)
                .await
                .map(WorkerReply::Output)
                .map_err(|err| TransportError::Remote {
                    peer: worker.location.clone(),
                    message: err.to_string(),
                }),
            WorkerRequest::Exit => {
                agent.exit().await;
                // an exited worker process is gone from the cluster
                let mut state = self.state();
                state.endpoints.remove(&worker.location);
                state.members.remove(&worker.id);
                Ok(WorkerReply::Exited)
            }
        }
    }

    async fn shutdown(&self) {
        let mut state = self.state();
        state.closed = true;
        state.subscriber = None;
    }
}

#[async_trait]
impl Registrar for LocalCluster {
    async fn join(&self, _target: &str) -> Result<(), TransportError> {
        if self.state().closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn register(&self, worker: &WorkerRef) -> Result<(), TransportError> {
        if self.state().closed {
            return Err(TransportError::Closed);
        }
        self.announce(worker.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn worker(location: &str) -> WorkerRef {
        WorkerRef::new(Uuid::new_v4(), location)
    }

    #[tokio::test]
    async fn list_replays_then_follows() {
        let cluster = LocalCluster::new();
        let first = worker("local://first");
        let second = worker("local://second");
        cluster.announce(first.clone());

        let mut stream = cluster.list();
        assert_eq!(stream.next().await, Some(first));
        cluster.announce(second.clone());
        assert_eq!(stream.next().await, Some(second));
    }

    #[tokio::test]
    async fn second_list_is_empty() {
        let cluster = LocalCluster::new();
        let first = worker("local://first");
        cluster.announce(first.clone());

        let mut taken = cluster.list();
        let again: Vec<_> = cluster.list().collect().await;
        assert!(again.is_empty());

        // the first stream still sees everything
        let second = worker("local://second");
        cluster.announce(second.clone());
        assert_eq!(taken.next().await, Some(first));
        assert_eq!(taken.next().await, Some(second));
    }

    #[tokio::test]
    async fn watch_fires_on_terminate() {
        let cluster = LocalCluster::new();
        let worker = worker("local://w");
        cluster.announce(worker.clone());
        let watch = cluster.watch(&worker);
        cluster.terminate(worker.id);
        tokio::time::timeout(Duration::from_secs(1), watch)
            .await
            .expect("watch should fire");
    }

    #[tokio::test]
    async fn watch_on_unknown_worker_fires_immediately() {
        let cluster = LocalCluster::new();
        tokio::time::timeout(Duration::from_secs(1), cluster.watch(&worker("local://gone")))
            .await
            .expect("watch should fire");
    }

    #[tokio::test]
    async fn send_to_unbound_location_is_unreachable() {
        let cluster = LocalCluster::new();
        let err = cluster
            .send(&worker("local://nobody"), WorkerRequest::Exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn shutdown_ends_streams_and_refuses_sends() {
        let cluster = LocalCluster::new();
        let mut stream = cluster.list();
        cluster.shutdown().await;
        assert_eq!(stream.next().await, None);
        let err = cluster
            .send(&worker("local://w"), WorkerRequest::Exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
