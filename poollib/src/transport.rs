//! The slice of the cluster transport the pool consumes.
//!
//! The manager side needs discovery, termination watches and request/response delivery
//! ([`ClusterTransport`]); the worker side only needs to reach the manager and announce itself
//! ([`Registrar`]). `server` implements both over gRPC; [`local::LocalCluster`] implements both in
//! process.

pub mod local;

use crate::error::TransportError;
use crate::types::{Job, TaskOutput, WorkerRef};

use async_trait::async_trait;
use futures::{future::BoxFuture, stream::BoxStream};

/// What a manager can ask of a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerRequest {
    Work(Job),
    Exit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerReply {
    Output(TaskOutput),
    Exited,
}

#[async_trait]
pub trait ClusterTransport: Send + Sync + 'static {
    /// Announcements of workers joining the registry.
    ///
    /// The stream is infinite and can be taken once; later calls yield an empty stream.
    fn list(&self) -> BoxStream<'static, WorkerRef>;

    /// Resolves once `worker` becomes unreachable, or right away if it already is.
    fn watch(&self, worker: &WorkerRef) -> BoxFuture<'static, ()>;

    async fn send(
        &self,
        worker: &WorkerRef,
        request: WorkerRequest,
    ) -> Result<WorkerReply, TransportError>;

    /// Release the transport's own resources. No-op when called again.
    async fn shutdown(&self);
}

#[async_trait]
pub trait Registrar: Send + Sync {
    /// Establish connectivity to the node hosting the registry.
    async fn join(&self, target: &str) -> Result<(), TransportError>;

    /// Make `worker` visible to every manager listing workers.
    async fn register(&self, worker: &WorkerRef) -> Result<(), TransportError>;
}
