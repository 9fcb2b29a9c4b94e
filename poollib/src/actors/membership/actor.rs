use super::messages::MembershipMessage;
use crate::transport::ClusterTransport;
use crate::types::{WorkerId, WorkerRef};

use futures::{
    future::{self, BoxFuture},
    stream::{BoxStream, FuturesUnordered},
    FutureExt, StreamExt,
};
use std::{collections::HashMap, sync::Arc};
use tokio::{select, sync::mpsc};

/// Sole owner of the live-worker set.
///
/// Inbox messages, discovery announcements and termination notices are all handled by this one
/// task, so every insert and remove is applied in a single order.
pub struct Actor {
    inbox: mpsc::Receiver<MembershipMessage>,
    transport: Arc<dyn ClusterTransport>,
    discovery: Option<BoxStream<'static, WorkerRef>>,
    terminations: FuturesUnordered<BoxFuture<'static, (WorkerId, u64)>>,
    workers: HashMap<WorkerId, Tracked>,
    next_generation: u64,
}

/// A tracked worker and the announcement that last armed its termination watch.
struct Tracked {
    worker: WorkerRef,
    generation: u64,
}

impl Actor {
    pub fn spawn(inbox: mpsc::Receiver<MembershipMessage>, transport: Arc<dyn ClusterTransport>) {
        let discovery = Some(transport.list());
        let actor = Self {
            inbox,
            transport,
            discovery,
            terminations: FuturesUnordered::new(),
            workers: HashMap::new(),
            next_generation: 0,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use MembershipMessage::*;
        loop {
            select! {
                maybe_msg = self.inbox.recv() => {
                    match maybe_msg {
                        Some(Snapshot { response }) => {
                            let _ = response.send(
                                self.workers.values().map(|tracked| tracked.worker.clone()).collect(),
                            );
                        }
                        Some(Stop { response }) => {
                            self.stop();
                            let _ = response.send(());
                        }
                        // every handle dropped
                        None => return,
                    }
                }
                announcement = next_announcement(&mut self.discovery), if self.discovery.is_some() => {
                    match announcement {
                        Some(worker) => self.admit(worker),
                        None => {
                            tracing::warn!("discovery stream ended, no further workers will be tracked");
                            self.discovery = None;
                        }
                    }
                }
                Some((worker_id, generation)) = self.terminations.next(), if !self.terminations.is_empty() => {
                    self.remove(worker_id, generation);
                }
            }
        }
    }

    /// Every announcement re-arms the watch, so a worker that re-registers after its old
    /// connection died is watched through the new one.
    fn admit(&mut self, worker: WorkerRef) {
        let worker_id = worker.id;
        let generation = self.next_generation;
        self.next_generation += 1;
        let termination = self
            .transport
            .watch(&worker)
            .map(move |_| (worker_id, generation));
        self.terminations.push(termination.boxed());

        match self.workers.get_mut(&worker_id) {
            Some(tracked) => {
                tracing::debug!(worker = %worker, "re-armed watch for announced worker");
                tracked.worker = worker;
                tracked.generation = generation;
            }
            None => {
                tracing::info!(worker = %worker, "worker became available");
                self.workers.insert(worker_id, Tracked { worker, generation });
                tracing::info!(tracked = self.workers.len(), "now tracking workers");
            }
        }
    }

    /// Drop `worker_id` if `generation` is still its current watch; older notices are stale.
    fn remove(&mut self, worker_id: WorkerId, generation: u64) {
        match self.workers.get(&worker_id) {
            Some(tracked) if tracked.generation == generation => {
                let worker = tracked.worker.clone();
                self.workers.remove(&worker_id);
                tracing::info!(worker = %worker, tracked = self.workers.len(), "removing terminated worker");
            }
            Some(_) => {
                tracing::debug!(worker = %worker_id, "ignoring termination of a superseded registration");
            }
            None => {
                tracing::debug!(worker = %worker_id, "termination notice for untracked worker");
            }
        }
    }

    fn stop(&mut self) {
        if self.discovery.take().is_some() {
            tracing::info!(tracked = self.workers.len(), "membership tracking stopped");
        }
        self.terminations = FuturesUnordered::new();
    }
}

async fn next_announcement(discovery: &mut Option<BoxStream<'static, WorkerRef>>) -> Option<WorkerRef> {
    match discovery {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}
