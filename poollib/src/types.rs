use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type JobId = Uuid;
pub type WorkerId = Uuid;
pub type ExecutionId = Uuid;
pub type Script = String;
pub type OutputBlob = bytes::Bytes;

/// A shell script to run on exactly one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub script: Script,
}

impl Job {
    /// Create a job with a fresh id.
    pub fn new(script: impl Into<Script>) -> Self {
        Self {
            id: Uuid::new_v4(),
            script: script.into(),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.id, self.script)
    }
}

/// Everything a finished job produced.
///
/// `output` is reserved for named artifacts and is empty for shell jobs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub exit_code: i32,
    pub standard_out: OutputBlob,
    pub standard_error: OutputBlob,
    pub output: HashMap<String, OutputBlob>,
}

/// Opaque handle to one live worker instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkerRef {
    pub id: WorkerId,
    /// transport-specific address, e.g. `https://10.0.0.7:7100`
    pub location: String,
}

impl WorkerRef {
    pub fn new(id: WorkerId, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
        }
    }
}

impl fmt::Display for WorkerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.location)
    }
}
