use crate::tls::TlsError;
use poollib::TransportError;

/// Failures while bringing a manager or worker node up or down.
#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
    #[error("gRPC server error: {0}")]
    Server(#[from] tonic::transport::Error),
    #[error("could not join the pool: {0}")]
    Join(#[from] TransportError),
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
