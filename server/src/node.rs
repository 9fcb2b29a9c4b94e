//! Bringing up the two kinds of node: a manager hosting the pool and a worker serving it.

use crate::config::{ManagerConfig, WorkerConfig};
use crate::error::NodeError;
use crate::interceptors::cert;
use crate::services::worker::WorkerService;
use crate::tls::TlsIdentity;
use crate::transport::{GrpcClusterTransport, GrpcRegistrar};

use poollib::transport::Registrar;
use poollib::{Sandbox, WorkerAgent, WorkerPool};
use protobuf::worker_server::WorkerServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

pub struct ManagerNode {
    pool: WorkerPool,
    transport: Arc<GrpcClusterTransport>,
}

impl ManagerNode {
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }
}

/// Host a registry and a worker pool on top of it.
pub async fn start_manager(config: &ManagerConfig) -> Result<ManagerNode, NodeError> {
    let transport = GrpcClusterTransport::bind(config).await?;
    let pool = WorkerPool::new(transport.clone());
    Ok(ManagerNode { pool, transport })
}

pub struct WorkerNode {
    agent: WorkerAgent,
    local_addr: SocketAddr,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl WorkerNode {
    pub fn agent(&self) -> &WorkerAgent {
        &self.agent
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves once the worker has exited and its server has drained.
    pub async fn wait(self) -> Result<(), NodeError> {
        self.server.await??;
        tracing::info!(worker = %self.agent.identity(), "worker stopped");
        Ok(())
    }
}

/// Serve a worker agent and register it with the manager at `config.manager_addr`.
///
/// The server runs until the agent exits, either because the manager asked it to or because
/// the caller called `exit` on [`WorkerNode::agent`].
pub async fn start_worker(config: &WorkerConfig) -> Result<WorkerNode, NodeError> {
    let tls = TlsIdentity::from_config(&config.tls).await?;
    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    let location = config
        .tls
        .url_for(&config.advertise_addr.clone().unwrap_or_else(|| local_addr.to_string()));

    let sandbox = Sandbox::spawn(config.sandbox.clone());
    let agent = WorkerAgent::spawn(location, sandbox);

    let mut builder = Server::builder();
    if let Some(tls) = &tls {
        builder = builder.tls_config(tls.server_tls_config())?;
    }
    let service = WorkerServer::with_interceptor(
        WorkerService::new(agent.clone()),
        cert::extract_peer_identity,
    );
    let exited = agent.exit_token();
    let server = tokio::spawn(builder.add_service(service).serve_with_incoming_shutdown(
        TcpListenerStream::new(listener),
        async move { exited.cancelled().await },
    ));
    tracing::info!(worker = %agent.identity(), addr = %local_addr, "worker listening");

    let registrar = GrpcRegistrar::new(tls, config.connect_timeout, agent.exit_token());
    let joined = async {
        registrar.join(&config.tls.url_for(&config.manager_addr)).await?;
        agent.register(&registrar).await
    };
    if let Err(err) = joined.await {
        tracing::error!(error = %err, "could not join the pool");
        agent.exit().await;
        return Err(err.into());
    }

    Ok(WorkerNode {
        agent,
        local_addr,
        server,
    })
}
