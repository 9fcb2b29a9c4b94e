use super::{connect, status_error};
use crate::config::ManagerConfig;
use crate::error::NodeError;
use crate::interceptors::cert;
use crate::services::registry::{Registry, RegistryService};
use crate::tls::TlsIdentity;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use poollib::transport::{ClusterTransport, WorkerReply, WorkerRequest};
use poollib::{TransportError, WorkerRef};
use protobuf::registry_server::RegistryServer;
use protobuf::worker_client::WorkerClient;
use protobuf::ExitRequest;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{TcpListenerStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::Code;
use tonic::transport::{Channel, Server};

type Channels = Arc<Mutex<HashMap<String, Channel>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The manager's side of the cluster over gRPC.
///
/// Hosts the `Registry` service workers register with, and dials workers at the location they
/// registered to deliver jobs. Channels are cached per location and dropped when the worker
/// leaves.
pub struct GrpcClusterTransport {
    registry: Arc<Registry>,
    announcements: Mutex<Option<mpsc::UnboundedReceiver<WorkerRef>>>,
    channels: Channels,
    tls: Option<TlsIdentity>,
    request_timeout: Duration,
    connect_timeout: Duration,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: Mutex<Option<JoinHandle<Result<(), tonic::transport::Error>>>>,
}

impl GrpcClusterTransport {
    /// Start serving the registry at `config.listen_addr`.
    pub async fn bind(config: &ManagerConfig) -> Result<Arc<Self>, NodeError> {
        let tls = TlsIdentity::from_config(&config.tls).await?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let (registry, announcements) = Registry::new(shutdown.clone());

        let mut builder = Server::builder();
        if let Some(tls) = &tls {
            builder = builder.tls_config(tls.server_tls_config())?;
        }
        let service = RegistryServer::with_interceptor(
            RegistryService::new(registry.clone()),
            cert::extract_peer_identity,
        );
        let signal = shutdown.clone();
        let server = tokio::spawn(builder.add_service(service).serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            async move { signal.cancelled().await },
        ));
        tracing::info!(addr = %local_addr, tls = tls.is_some(), "registry listening");

        Ok(Arc::new(Self {
            registry,
            announcements: Mutex::new(Some(announcements)),
            channels: Arc::new(Mutex::new(HashMap::new())),
            tls,
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            local_addr,
            shutdown,
            server: Mutex::new(Some(server)),
        }))
    }

    /// The address the registry actually listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn client(&self, worker: &WorkerRef) -> Result<WorkerClient<Channel>, TransportError> {
        let cached = lock(&self.channels).get(&worker.location).cloned();
        let channel = match cached {
            Some(channel) => channel,
            None => {
                let channel =
                    connect(&worker.location, self.tls.as_ref(), self.connect_timeout).await?;
                lock(&self.channels).insert(worker.location.clone(), channel.clone());
                channel
            }
        };
        Ok(WorkerClient::new(channel))
    }
}

#[tonic::async_trait]
impl ClusterTransport for GrpcClusterTransport {
    fn list(&self) -> BoxStream<'static, WorkerRef> {
        match lock(&self.announcements).take() {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => {
                tracing::warn!("worker announcements were already taken");
                futures::stream::empty().boxed()
            }
        }
    }

    fn watch(&self, worker: &WorkerRef) -> BoxFuture<'static, ()> {
        let gone = self.registry.watch(&worker.id);
        let channels = self.channels.clone();
        let location = worker.location.clone();
        async move {
            gone.await;
            lock(&channels).remove(&location);
        }
        .boxed()
    }

    async fn send(
        &self,
        worker: &WorkerRef,
        request: WorkerRequest,
    ) -> Result<WorkerReply, TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let mut client = self.client(worker).await?;
        let call = async {
            match request {
                WorkerRequest::Work(job) => client
                    .work(protobuf::Job::from(job))
                    .await
                    .map(|response| WorkerReply::Output(response.into_inner().into())),
                WorkerRequest::Exit => client
                    .exit(ExitRequest {})
                    .await
                    .map(|_| WorkerReply::Exited),
            }
        };

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(status)) => {
                if status.code() == Code::Unavailable {
                    lock(&self.channels).remove(&worker.location);
                }
                Err(status_error(&worker.location, status))
            }
            Err(_) => Err(TransportError::Timeout {
                peer: worker.location.clone(),
            }),
        }
    }

    async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        lock(&self.channels).clear();

        let server = lock(&self.server).take();
        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => tracing::info!("registry stopped"),
                Ok(Err(err)) => tracing::error!(error = %err, "registry server failed"),
                Err(err) => tracing::error!(error = %err, "registry server task failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn transport() -> Arc<GrpcClusterTransport> {
        let config = ManagerConfig::new("127.0.0.1:0".parse().unwrap());
        GrpcClusterTransport::bind(&config).await.unwrap()
    }

    #[tokio::test]
    async fn binds_an_ephemeral_port() {
        let transport = transport().await;
        assert_ne!(transport.local_addr().port(), 0);
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn announcements_can_be_taken_once() {
        let transport = transport().await;
        let _first = transport.list();
        let second: Vec<_> = transport.list().collect().await;
        assert!(second.is_empty());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn sending_to_a_dead_location_is_unreachable() {
        let transport = transport().await;
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let worker = WorkerRef::new(Uuid::new_v4(), format!("http://127.0.0.1:{}", port));
        let err = transport
            .send(&worker, WorkerRequest::Exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_refuses_sends() {
        let transport = transport().await;
        transport.shutdown().await;
        transport.shutdown().await;
        let worker = WorkerRef::new(Uuid::new_v4(), "http://127.0.0.1:1");
        let err = transport
            .send(&worker, WorkerRequest::Exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
