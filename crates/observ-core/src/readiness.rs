//! Polling until a queried condition holds or a deadline passes.
//!
//! The poller repeats a query command at a fixed interval and applies a
//! predicate to each successful result. A failed query is treated the same
//! as an unready result: wait and try again. The return value is a plain
//! bool so callers decide whether an unready timeout aborts their pipeline.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::exec::{self, CommandSpec, ExecutionResult};

/// A query to repeat plus the cadence and overall deadline.
#[derive(Debug, Clone)]
pub struct ReadinessQuery {
    pub command: CommandSpec,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl ReadinessQuery {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Poll until `predicate` holds on a successful query, or the deadline
/// passes. A final attempt is only made if it can start before the
/// deadline, so a 30s timeout with a 10s interval yields exactly three
/// attempts.
pub async fn wait_until_ready(
    query: &ReadinessQuery,
    predicate: impl Fn(&ExecutionResult) -> bool,
) -> bool {
    let deadline = Instant::now() + query.timeout;
    loop {
        let result = exec::run(&query.command).await;
        if result.success() && predicate(&result) {
            return true;
        }
        debug!(
            command = %query.command.display(),
            exit_code = result.exit_code,
            "not ready yet"
        );
        if Instant::now() + query.poll_interval >= deadline {
            return false;
        }
        tokio::time::sleep(query.poll_interval).await;
    }
}

/// Predicate over `kubectl get pods -o jsonpath=...` output listing one
/// Ready condition status per pod. True only when at least one pod exists
/// and every status token is "True".
pub fn all_pods_ready(result: &ExecutionResult) -> bool {
    let tokens: Vec<&str> = result.stdout.split_whitespace().collect();
    !tokens.is_empty() && tokens.iter().all(|t| *t == "True")
}
