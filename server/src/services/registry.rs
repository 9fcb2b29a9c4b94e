use crate::interceptors::cert::peer_name;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream};
use poollib::types::{self as pool, WorkerId};
use protobuf::registry_event::{Event, Registered};
use protobuf::registry_server;
use protobuf::{RegisterRequest, RegistryEvent, WireError};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

struct Member {
    generation: u64,
    // closes when the registration stream behind this member ends
    alive: watch::Receiver<()>,
}

/// The manager's record of registered workers.
///
/// A worker stays registered for as long as its `Register` stream is open. When the stream ends
/// (the worker exits, crashes or loses its connection) the member is dropped and every watcher
/// of it fires.
pub struct Registry {
    members: Mutex<HashMap<WorkerId, Member>>,
    announcements: mpsc::UnboundedSender<pool::WorkerRef>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl Registry {
    /// The receiver yields every worker admitted from now on.
    pub fn new(shutdown: CancellationToken) -> (Arc<Self>, mpsc::UnboundedReceiver<pool::WorkerRef>) {
        let (announcements, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            members: Mutex::new(HashMap::new()),
            announcements,
            next_generation: AtomicU64::new(0),
            shutdown,
        });
        (registry, rx)
    }

    fn members(&self) -> MutexGuard<'_, HashMap<WorkerId, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn contains(&self, worker: &WorkerId) -> bool {
        self.members().contains_key(worker)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.members().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves when `worker` leaves the registry; right away if it is not in it.
    pub fn watch(&self, worker: &WorkerId) -> BoxFuture<'static, ()> {
        let alive = self.members().get(worker).map(|member| member.alive.clone());
        match alive {
            Some(mut alive) => async move {
                // the sender never sends, so this only returns once it is dropped
                while alive.changed().await.is_ok() {}
            }
            .boxed(),
            None => futures::future::ready(()).boxed(),
        }
    }

    /// Record `worker` and keep it until `events` is closed by the other end.
    fn admit(
        self: &Arc<Self>,
        worker: pool::WorkerRef,
        events: mpsc::Sender<Result<RegistryEvent, Status>>,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (alive_tx, alive) = watch::channel(());
        self.members()
            .insert(worker.id, Member { generation, alive });
        if self.announcements.send(worker.clone()).is_err() {
            tracing::debug!(worker = %worker, "nobody is listing workers");
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = events.closed() => tracing::info!(worker = %worker, "worker left the pool"),
                _ = registry.shutdown.cancelled() => tracing::debug!(worker = %worker, "closing registration"),
            }
            registry.release(&worker.id, generation);
            drop(alive_tx);
        });
    }

    fn release(&self, worker: &WorkerId, generation: u64) {
        let mut members = self.members();
        // a re-registration under the same id owns the entry now
        if members.get(worker).map(|m| m.generation) == Some(generation) {
            members.remove(worker);
        }
    }
}

pub struct RegistryService {
    registry: Arc<Registry>,
}

impl RegistryService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl registry_server::Registry for RegistryService {
    type RegisterStream = Pin<Box<dyn Stream<Item = Result<RegistryEvent, Status>> + Send>>;

    async fn register(
        &self,
        req: Request<RegisterRequest>,
    ) -> Result<Response<Self::RegisterStream>, Status> {
        let peer = peer_name(&req);
        let worker = req
            .into_inner()
            .worker
            .ok_or(WireError::Missing("worker"))
            .and_then(pool::WorkerRef::try_from)
            .map_err(|err| Status::invalid_argument(err.to_string()))?;

        let (tx, rx) = mpsc::channel(1);
        let ack = RegistryEvent {
            event: Some(Event::Registered(Registered {})),
        };
        tx.send(Ok(ack))
            .await
            .map_err(|_| Status::internal("registration stream closed"))?;

        tracing::info!(worker = %worker, %peer, "worker registered");
        self.registry.admit(worker, tx);
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
