use super::{connect, status_error};
use crate::tls::TlsIdentity;

use poollib::transport::Registrar;
use poollib::{TransportError, WorkerRef};
use protobuf::registry_client::RegistryClient;
use protobuf::registry_event::Event;
use protobuf::{RegisterRequest, RegistryEvent};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

/// The worker's side of the cluster over gRPC: reaches the manager's registry and keeps a
/// registration open for as long as the worker lives.
pub struct GrpcRegistrar {
    tls: Option<TlsIdentity>,
    connect_timeout: Duration,
    joined: Mutex<Option<(String, Channel)>>,
    // ends every registration this registrar opened
    shutdown: CancellationToken,
}

impl GrpcRegistrar {
    pub fn new(
        tls: Option<TlsIdentity>,
        connect_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tls,
            connect_timeout,
            joined: Mutex::new(None),
            shutdown,
        }
    }

    fn joined(&self) -> Option<(String, Channel)> {
        self.joined
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[tonic::async_trait]
impl Registrar for GrpcRegistrar {
    async fn join(&self, target: &str) -> Result<(), TransportError> {
        let channel = connect(target, self.tls.as_ref(), self.connect_timeout).await?;
        tracing::info!(manager = target, "joined pool");
        *self.joined.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((target.to_string(), channel));
        Ok(())
    }

    async fn register(&self, worker: &WorkerRef) -> Result<(), TransportError> {
        let (manager, channel) = self.joined().ok_or(TransportError::NotJoined)?;
        let mut client = RegistryClient::new(channel);
        let request = RegisterRequest {
            worker: Some(worker.clone().into()),
        };
        let mut events = client
            .register(request)
            .await
            .map_err(|status| status_error(&manager, status))?
            .into_inner();

        match events.message().await {
            Ok(Some(RegistryEvent {
                event: Some(Event::Registered(_)),
            })) => {}
            Ok(_) => {
                return Err(TransportError::Remote {
                    peer: manager,
                    message: "registration was not acknowledged".to_string(),
                })
            }
            Err(status) => return Err(status_error(&manager, status)),
        }

        // Holding the stream open is what keeps us registered.
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.message() => match event {
                        Ok(Some(_)) => continue,
                        Ok(None) => {
                            tracing::warn!(%manager, "manager closed the registration");
                            break;
                        }
                        Err(status) => {
                            tracing::warn!(%manager, error = %status, "lost the manager");
                            break;
                        }
                    },
                }
            }
        });
        Ok(())
    }
}
