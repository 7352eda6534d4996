// src/exec/executor_loop.rs

//! Bounded worker pool used by tasks that fan out internally.
//!
//! Jobs run on Tokio tasks, at most `max_parallel` at a time. The pool only
//! returns once every job has finished, so the caller sees a single
//! all-or-nothing completion.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Run `job` over every input with bounded parallelism.
///
/// Results are returned in input order. If any job fails (or panics), every
/// other job is still awaited and the failures are reported together as one
/// error.
pub async fn run_bounded<I, T, F, Fut>(inputs: Vec<I>, max_parallel: usize, job: F) -> Result<Vec<T>>
where
    I: Debug + Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let total = inputs.len();
    let limit = Arc::new(Semaphore::new(max_parallel.max(1)));
    let job = Arc::new(job);
    let mut labels = Vec::with_capacity(total);
    let mut set = JoinSet::new();

    info!(jobs = total, max_parallel, "starting worker pool");

    for (idx, input) in inputs.into_iter().enumerate() {
        labels.push(format!("{input:?}"));
        let limit = Arc::clone(&limit);
        let job = Arc::clone(&job);

        set.spawn(async move {
            let result = match limit.acquire_owned().await {
                Ok(_permit) => job(input).await,
                Err(e) => Err(anyhow!("worker pool closed: {e}")),
            };
            (idx, result)
        });
    }

    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut failures = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(value))) => {
                debug!(job = %labels[idx], "worker finished");
                results[idx] = Some(value);
            }
            Ok((idx, Err(err))) => {
                error!(job = %labels[idx], error = %err, "worker failed");
                failures.push(format!("{}: {err:#}", labels[idx]));
            }
            Err(join_err) => {
                error!(error = %join_err, "worker panicked or was cancelled");
                failures.push(join_err.to_string());
            }
        }
    }

    if !failures.is_empty() {
        bail!(
            "{} of {} jobs failed:\n  {}",
            failures.len(),
            total,
            failures.join("\n  ")
        );
    }

    info!(jobs = total, "worker pool finished");
    Ok(results.into_iter().flatten().collect())
}
