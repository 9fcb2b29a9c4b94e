use crate::types::TaskOutput;

use bytes::BytesMut;
use std::collections::HashMap;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    select,
    sync::oneshot,
    time,
};

/// How long output may stay open once the job's process group is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Spawn `<shell> -c <script>` inside `dir` with piped stdout and stderr.
///
/// The script is handed to the shell verbatim. The shell leads a new process group, so
/// everything the script starts can be killed together.
pub fn spawn(shell: &Path, script: &str, dir: &Path) -> io::Result<Child> {
    let mut command = Command::new(shell);
    command
        .arg("-c")
        .arg(script)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // SAFETY: the hook only calls setpgid, which is async-signal-safe
    unsafe {
        command.pre_exec(lead_new_group);
    }
    command.spawn()
}

fn lead_new_group() -> io::Result<()> {
    // SAFETY: plain syscall on the calling process
    if unsafe { libc::setpgid(0, 0) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Drive a child to exit while collecting both output streams.
///
/// Resolving `kill_rx` (or dropping its sender) kills the child's whole process group. Once the
/// shell has exited, anything the script left behind is killed too; output still open after
/// that is cut off after a short grace period.
pub async fn run_to_completion(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
) -> io::Result<TaskOutput> {
    let mut group = ProcessGroup::of(&child);
    // grab stdout and stderr before the child is borrowed for waiting
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut standard_out = BytesMut::with_capacity(4096);
    let mut standard_error = BytesMut::with_capacity(4096);

    let status = {
        let collect = async {
            tokio::try_join!(
                drain(stdout, &mut standard_out),
                drain(stderr, &mut standard_error)
            )
        };
        tokio::pin!(collect);
        let mut drained = false;

        let status = {
            let reap = wait_or_kill(&mut child, kill_rx, &mut group);
            tokio::pin!(reap);
            // keep reading while waiting, a child blocked on a full pipe never exits
            loop {
                select! {
                    status = &mut reap => break status?,
                    result = &mut collect, if !drained => {
                        result?;
                        drained = true;
                    }
                }
            }
        };

        group.kill();
        if !drained {
            match time::timeout(DRAIN_GRACE, &mut collect).await {
                Ok(result) => {
                    result?;
                }
                Err(_) => tracing::warn!("job output still open after its process group was killed"),
            }
        }
        status
    };

    Ok(TaskOutput {
        exit_code: exit_code(status),
        standard_out: standard_out.freeze(),
        standard_error: standard_error.freeze(),
        output: HashMap::new(),
    })
}

async fn wait_or_kill(
    child: &mut Child,
    kill_rx: oneshot::Receiver<()>,
    group: &mut ProcessGroup,
) -> io::Result<ExitStatus> {
    select! {
        status = child.wait() => status,
        _ = kill_rx => {
            group.kill();
            // the shell is in the group already; this covers a group that could not be signalled
            let _ = child.start_kill();
            child.wait().await
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, buf: &mut BytesMut) -> io::Result<()> {
    if let Some(mut reader) = reader {
        while reader.read_buf(buf).await? > 0 {}
    }
    Ok(())
}

/// The process group a spawned shell leads. Killed at most once, at the latest when dropped.
struct ProcessGroup(Option<libc::pid_t>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        // a group leader's pgid is its pid
        Self(child.id().map(|pid| pid as libc::pid_t))
    }

    fn kill(&mut self) {
        let pgid = match self.0.take() {
            Some(pgid) => pgid,
            None => return,
        };
        // SAFETY: killpg only takes integers
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = io::Error::last_os_error();
            // ESRCH: every member has exited already
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pgid, error = %err, "failed to kill process group");
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// The exit code, or the negated signal number for a killed process.
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}
