//! gRPC plumbing for the worker pool: the services, the cluster transport built on them, TLS,
//! and node bootstrap for managers and workers.

pub mod config;
pub mod error;
pub mod interceptors;
pub mod node;
pub mod services;
pub mod tls;
pub mod transport;

pub use config::{ManagerConfig, TlsConfig, WorkerConfig};
pub use error::NodeError;
pub use interceptors::cert::PeerIdentity;
pub use node::{start_manager, start_worker, ManagerNode, WorkerNode};
