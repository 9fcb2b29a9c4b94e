//! Conversions between the wire messages and the pool's own types.

use poollib::types as pool;
use std::convert::TryFrom;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("invalid {field}: {source}")]
    InvalidId {
        field: &'static str,
        #[source]
        source: uuid::Error,
    },
    #[error("missing {0}")]
    Missing(&'static str),
}

fn parse_id(field: &'static str, id: &str) -> Result<Uuid, WireError> {
    Uuid::parse_str(id).map_err(|source| WireError::InvalidId { field, source })
}

impl From<pool::Job> for crate::Job {
    fn from(job: pool::Job) -> Self {
        Self {
            id: job.id.to_string(),
            script: job.script,
        }
    }
}

impl TryFrom<crate::Job> for pool::Job {
    type Error = WireError;

    fn try_from(job: crate::Job) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id("job id", &job.id)?,
            script: job.script,
        })
    }
}

impl From<pool::TaskOutput> for crate::TaskOutput {
    fn from(output: pool::TaskOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            standard_out: output.standard_out.to_vec(),
            standard_error: output.standard_error.to_vec(),
            output: output
                .output
                .into_iter()
                .map(|(name, blob)| (name, blob.to_vec()))
                .collect(),
        }
    }
}

impl From<crate::TaskOutput> for pool::TaskOutput {
    fn from(output: crate::TaskOutput) -> Self {
        Self {
            exit_code: output.exit_code,
            standard_out: output.standard_out.into(),
            standard_error: output.standard_error.into(),
            output: output
                .output
                .into_iter()
                .map(|(name, blob)| (name, blob.into()))
                .collect(),
        }
    }
}

impl From<pool::WorkerRef> for crate::WorkerRef {
    fn from(worker: pool::WorkerRef) -> Self {
        Self {
            id: worker.id.to_string(),
            location: worker.location,
        }
    }
}

impl TryFrom<crate::WorkerRef> for pool::WorkerRef {
    type Error = WireError;

    fn try_from(worker: crate::WorkerRef) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id("worker id", &worker.id)?,
            location: worker.location,
        })
    }
}
