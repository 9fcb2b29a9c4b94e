use crate::actors::membership::MembershipHandle;
use crate::error::{self, PoolError};
use crate::transport::{ClusterTransport, WorkerReply, WorkerRequest};
use crate::types::{Job, TaskOutput, WorkerRef};

use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Instant;

const MEMBERSHIP_CAPACITY: usize = 256;

/// Picks the worker a job is sent to.
pub trait Selector: Send + Sync {
    /// `None` only when `workers` is empty.
    fn select<'a>(&self, workers: &'a [WorkerRef]) -> Option<&'a WorkerRef>;
}

/// Uniformly random choice over the snapshot. No load signal, no affinity.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn select<'a>(&self, workers: &'a [WorkerRef]) -> Option<&'a WorkerRef> {
        workers.choose(&mut rand::thread_rng())
    }
}

/// The manager-side view of the pool: tracks workers and dispatches jobs to them.
pub struct WorkerPool {
    transport: Arc<dyn ClusterTransport>,
    membership: MembershipHandle,
    selector: Box<dyn Selector>,
}

impl WorkerPool {
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self::with_selector(transport, RandomSelector)
    }

    pub fn with_selector(transport: Arc<dyn ClusterTransport>, selector: impl Selector + 'static) -> Self {
        let membership = MembershipHandle::spawn(transport.clone(), MEMBERSHIP_CAPACITY);
        Self {
            transport,
            membership,
            selector: Box::new(selector),
        }
    }

    pub fn membership(&self) -> &MembershipHandle {
        &self.membership
    }

    pub async fn workers(&self) -> error::Result<Vec<WorkerRef>> {
        self.membership.snapshot().await
    }

    /// Run `job` on one tracked worker.
    ///
    /// Fails fast with `NoWorkersAvailable` when nothing is tracked. A transport failure is
    /// returned as is; the job is never retried or sent to a second worker.
    pub async fn submit(&self, job: Job) -> error::Result<TaskOutput> {
        let workers = self.membership.snapshot().await?;
        let worker = match self.selector.select(&workers) {
            Some(worker) => worker.clone(),
            None => {
                tracing::error!(job = %job, "no workers to submit job to");
                return Err(PoolError::NoWorkersAvailable);
            }
        };

        let job_id = job.id;
        let submitted = Instant::now();
        tracing::debug!(%job_id, worker = %worker, "dispatching job");
        let reply = self.transport.send(&worker, WorkerRequest::Work(job)).await;
        tracing::info!(%job_id, worker = %worker, elapsed = ?submitted.elapsed(), "job came back");

        match reply? {
            WorkerReply::Output(output) => Ok(output),
            WorkerReply::Exited => Err(PoolError::UnexpectedReply(worker.to_string())),
        }
    }

    /// Ask every tracked worker to exit, then stop tracking and close the transport.
    ///
    /// A worker that cannot be reached is logged and skipped.
    pub async fn shutdown(&self) {
        let workers = match self.membership.snapshot().await {
            Ok(workers) => workers,
            Err(err) => {
                tracing::error!(error = %err, "could not read membership during shutdown");
                Vec::new()
            }
        };
        for worker in &workers {
            match self.transport.send(worker, WorkerRequest::Exit).await {
                Ok(_) => tracing::info!(worker = %worker, "worker asked to exit"),
                Err(err) => {
                    tracing::error!(worker = %worker, error = %err, "error asking worker to exit")
                }
            }
        }
        self.membership.stop().await;
        self.transport.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::testing::eventually;
    use crate::transport::local::LocalCluster;
    use crate::{Sandbox, WorkerAgent};
    use std::collections::HashSet;
    use uuid::Uuid;

    struct Fixture {
        cluster: LocalCluster,
        pool: WorkerPool,
        root: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let cluster = LocalCluster::new();
            let pool = WorkerPool::new(Arc::new(cluster.clone()));
            Self {
                cluster,
                pool,
                root: tempfile::tempdir().unwrap(),
            }
        }

        async fn add_worker(&self, name: &str) -> WorkerAgent {
            let sandbox = Sandbox::spawn(SandboxConfig::new(self.root.path()));
            let agent = WorkerAgent::spawn(format!("local://{}", name), sandbox);
            self.cluster.bind(agent.clone());
            agent.register(&self.cluster).await.unwrap();
            agent
        }

        async fn wait_for_workers(&self, n: usize) {
            eventually(|| async { self.pool.workers().await.unwrap().len() == n }).await;
        }
    }

    #[tokio::test]
    async fn empty_pool_fails_fast() {
        let fixture = Fixture::new();
        let err = fixture.pool.submit(Job::new("echo hello")).await.unwrap_err();
        assert!(matches!(err, PoolError::NoWorkersAvailable));
        assert!(fixture.pool.workers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_worker_gets_the_job() {
        let fixture = Fixture::new();
        fixture.add_worker("only").await;
        fixture.wait_for_workers(1).await;

        let output = fixture.pool.submit(Job::new("echo hello")).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(&output.standard_out[..], b"hello\n");

        let output = fixture.pool.submit(Job::new("exit 7")).await.unwrap();
        assert_eq!(output.exit_code, 7);
    }

    #[tokio::test]
    async fn terminated_worker_is_never_selected_again() {
        let fixture = Fixture::new();
        let doomed = fixture.add_worker("doomed").await;
        let survivor = fixture.add_worker("survivor").await;
        fixture.wait_for_workers(2).await;

        fixture.cluster.terminate(doomed.identity().id);
        fixture.wait_for_workers(1).await;

        let workers = fixture.pool.workers().await.unwrap();
        assert_eq!(workers, vec![survivor.identity().clone()]);
        for _ in 0..10 {
            let output = fixture.pool.submit(Job::new("true")).await.unwrap();
            assert_eq!(output.exit_code, 0);
        }
        assert!(!doomed.is_exited());
    }

    #[tokio::test]
    async fn unreachable_worker_surfaces_transport_error() {
        let fixture = Fixture::new();
        fixture
            .cluster
            .announce(WorkerRef::new(Uuid::new_v4(), "local://unbound"));
        fixture.wait_for_workers(1).await;

        let err = fixture.pool.submit(Job::new("true")).await.unwrap_err();
        assert!(matches!(
            err,
            PoolError::Transport(crate::TransportError::Unreachable { .. })
        ));
        // no reselection, no removal
        assert_eq!(fixture.pool.workers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_best_effort() {
        let fixture = Fixture::new();
        let a = fixture.add_worker("a").await;
        let b = fixture.add_worker("b").await;
        fixture
            .cluster
            .announce(WorkerRef::new(Uuid::new_v4(), "local://unbound"));
        fixture.wait_for_workers(3).await;

        fixture.pool.shutdown().await;
        assert!(a.is_exited());
        assert!(b.is_exited());
        let err = fixture.pool.submit(Job::new("true")).await;
        assert!(err.is_err());
    }

    #[test]
    fn random_selector_covers_every_worker() {
        let workers: Vec<_> = (0..3)
            .map(|n| WorkerRef::new(Uuid::new_v4(), format!("local://{}", n)))
            .collect();
        let chosen: HashSet<_> = (0..300)
            .filter_map(|_| RandomSelector.select(&workers))
            .map(|w| w.id)
            .collect();
        assert_eq!(chosen.len(), 3);
        assert!(RandomSelector.select(&[]).is_none());
    }

    #[tokio::test]
    async fn custom_selector_drops_in() {
        struct Last;
        impl Selector for Last {
            fn select<'a>(&self, workers: &'a [WorkerRef]) -> Option<&'a WorkerRef> {
                workers.iter().max_by_key(|w| w.location.clone())
            }
        }
        let cluster = LocalCluster::new();
        let root = tempfile::tempdir().unwrap();
        let pool = WorkerPool::with_selector(Arc::new(cluster.clone()), Last);
        // "a" is announced but nothing serves it, so picking it would fail
        cluster.announce(WorkerRef::new(Uuid::new_v4(), "local://a"));
        let sandbox = Sandbox::spawn(SandboxConfig::new(root.path()));
        let agent = WorkerAgent::spawn("local://z", sandbox);
        cluster.bind(agent.clone());
        agent.register(&cluster).await.unwrap();
        eventually(|| async { pool.workers().await.unwrap().len() == 2 }).await;
        let output = pool.submit(Job::new("echo picked")).await.unwrap();
        assert_eq!(&output.standard_out[..], b"picked\n");
    }
}
