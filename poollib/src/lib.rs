//! Core of a pool of remote shell-script workers.
//!
//! A manager tracks live workers ([`Membership`]) and dispatches each job to one of them
//! ([`WorkerPool`]); a worker accepts jobs ([`WorkerAgent`]) and runs them in a throwaway scratch
//! directory ([`Sandbox`]). Everything crossing process boundaries goes through the traits in
//! [`transport`].

mod actors;
pub mod config;
pub mod error;
mod pool;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

// re-export the actor handles as if they were the actors themselves.
pub use actors::agent::WorkerAgentHandle as WorkerAgent;
pub use actors::membership::MembershipHandle as Membership;
pub use actors::sandbox::SandboxHandle as Sandbox;
pub use config::SandboxConfig;
pub use error::{PoolError, SandboxError, TransportError};
pub use pool::{RandomSelector, Selector, WorkerPool};
pub use types::{Job, TaskOutput, WorkerRef};
