use poollib::{Job, TaskOutput, WorkerPool};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, PartialEq, Eq)]
pub enum DriverExit {
    /// `exit` was read and the pool has been shut down.
    Shutdown,
    /// Input ran out; the pool is still up.
    InputClosed,
}

/// Submit every line of `input` as a job and print what comes back.
///
/// The line `exit` asks every worker to exit and tears the pool down.
pub async fn run<R, O, E>(
    pool: &WorkerPool,
    input: R,
    out: &mut O,
    err: &mut E,
) -> io::Result<DriverExit>
where
    R: AsyncBufRead + Unpin,
    O: Write,
    E: Write,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let script = line.trim();
        if script.is_empty() {
            continue;
        }
        if script.eq_ignore_ascii_case("exit") {
            tracing::info!("shutting down the pool");
            pool.shutdown().await;
            return Ok(DriverExit::Shutdown);
        }

        match pool.submit(Job::new(script)).await {
            Ok(output) => print_output(&output, out, err)?,
            Err(e) => writeln!(err, "{}", e)?,
        }
    }
    Ok(DriverExit::InputClosed)
}

fn print_output<O: Write, E: Write>(output: &TaskOutput, out: &mut O, err: &mut E) -> io::Result<()> {
    writeln!(out, "Exit code: {}", output.exit_code)?;
    out.write_all(&output.standard_out)?;
    out.flush()?;
    err.write_all(&output.standard_error)?;
    err.flush()
}
