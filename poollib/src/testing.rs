use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Whether `pid` names a process that has not exited yet. Zombies count as exited.
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .map_or(false, |rest| rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

/// Parse the first line of `output` as a pid.
pub fn first_pid(output: &[u8]) -> i32 {
    String::from_utf8_lossy(output)
        .lines()
        .next()
        .and_then(|line| line.trim().parse().ok())
        .expect("script should print a pid first")
}
