use super::messages::SandboxMessage;
use crate::types::ExecutionId;

use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

/// Owns the set of running executions and their kill switches.
pub struct Actor {
    inbox: mpsc::UnboundedReceiver<SandboxMessage>,
    running: HashMap<ExecutionId, oneshot::Sender<()>>,
    closed: bool,
}

impl Actor {
    pub fn spawn(inbox: mpsc::UnboundedReceiver<SandboxMessage>) {
        let actor = Self {
            inbox,
            running: HashMap::new(),
            closed: false,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use SandboxMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Track {
                    execution_id,
                    kill_tx,
                    response,
                } => {
                    let accepted = !self.closed;
                    if accepted {
                        self.running.insert(execution_id, kill_tx);
                    }
                    let _ = response.send(accepted);
                }
                Untrack { execution_id } => {
                    self.running.remove(&execution_id);
                }
                Running { response } => {
                    let _ = response.send(self.running.len());
                }
                Shutdown { response } => {
                    self.closed = true;
                    let _ = response.send(self.kill_all());
                }
            }
        }
        // every handle dropped, make sure no child outlives the sandbox
        self.kill_all();
    }

    fn kill_all(&mut self) -> usize {
        let killed = self.running.len();
        for (execution_id, kill_tx) in self.running.drain() {
            tracing::warn!(%execution_id, "force-terminating job process");
            let _ = kill_tx.send(());
        }
        killed
    }
}
