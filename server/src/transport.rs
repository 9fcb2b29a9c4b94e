//! gRPC implementations of the pool's cluster transport.

mod manager;
mod registrar;

pub use manager::GrpcClusterTransport;
pub use registrar::GrpcRegistrar;

use crate::tls::TlsIdentity;

use poollib::TransportError;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

/// Open a channel to `url`, giving up after `timeout`.
pub(crate) async fn connect(
    url: &str,
    tls: Option<&TlsIdentity>,
    timeout: Duration,
) -> Result<Channel, TransportError> {
    let invalid = |_| TransportError::InvalidAddress(url.to_string());
    let mut endpoint = Endpoint::from_shared(url.to_string())
        .map_err(invalid)?
        .connect_timeout(timeout);
    if let Some(tls) = tls {
        endpoint = endpoint
            .tls_config(tls.client_tls_config())
            .map_err(|_| TransportError::InvalidAddress(url.to_string()))?;
    }

    match tokio::time::timeout(timeout, endpoint.connect()).await {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(err)) => Err(TransportError::Unreachable {
            peer: url.to_string(),
            reason: err.to_string(),
        }),
        Err(_) => Err(TransportError::Timeout {
            peer: url.to_string(),
        }),
    }
}

pub(crate) fn status_error(peer: &str, status: Status) -> TransportError {
    let peer = peer.to_string();
    match status.code() {
        Code::Unavailable => TransportError::Unreachable {
            peer,
            reason: status.message().to_string(),
        },
        Code::DeadlineExceeded => TransportError::Timeout { peer },
        _ => TransportError::Remote {
            peer,
            message: status.message().to_string(),
        },
    }
}
