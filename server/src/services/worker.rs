use crate::interceptors::cert::peer_name;

use poollib::types as pool;
use poollib::{SandboxError, WorkerAgent};
use protobuf::worker_server::Worker;
use protobuf::{ExitRequest, ExitResponse, Job, TaskOutput};
use std::convert::TryFrom;
use tonic::{Request, Response, Status};

/// Serves a worker agent to the pool manager.
pub struct WorkerService {
    agent: WorkerAgent,
}

impl WorkerService {
    pub fn new(agent: WorkerAgent) -> Self {
        Self { agent }
    }
}

fn sandbox_status(err: SandboxError) -> Status {
    match err {
        // the worker is on its way out; the caller should treat it as gone
        SandboxError::Closed => Status::unavailable(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

#[tonic::async_trait]
impl Worker for WorkerService {
    async fn work(&self, req: Request<Job>) -> Result<Response<TaskOutput>, Status> {
        let peer = peer_name(&req);
        let job = pool::Job::try_from(req.into_inner())
            .map_err(|err| Status::invalid_argument(err.to_string()))?;
        tracing::debug!(job_id = %job.id, %peer, "work requested");

        let output = self.agent.work(job).await.map_err(sandbox_status)?;
        Ok(Response::new(output.into()))
    }

    async fn exit(&self, req: Request<ExitRequest>) -> Result<Response<ExitResponse>, Status> {
        tracing::info!(peer = %peer_name(&req), "exit requested");
        self.agent.exit().await;
        Ok(Response::new(ExitResponse {}))
    }
}
