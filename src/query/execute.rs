//! Execution coordinator: runs the driver's execute step off the caller's
//! task and reconciles completion against the stop signal.
//!
//! The driver call is launched on a blocking task and never forcibly
//! terminated. The coordinator selects between task completion and a
//! bounded-interval poll of the stop signal, so cancellation latency is
//! bounded by the poll interval rather than by driver cooperation. On
//! cancellation the statement is handed to a fire-and-forget cleanup task
//! that closes it once the driver call eventually returns.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::driver::DriverStatement;
use crate::error::{QuarryError, Result};
use crate::session::StopSignal;

/// Statement handle shared between the query and the execution task.
pub(crate) type SharedStatement = Arc<Mutex<Box<dyn DriverStatement>>>;

/// What one execute call produced. A failure is reported through the
/// `Result` instead; cancellation is not an error.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ExecutionOutcome {
    /// The driver call finished without error.
    Completed,
    /// The stop signal fired first. The statement has been detached and
    /// will be closed by the cleanup task.
    Cancelled,
}

/// Runs the statement's execute step, polling `stop` every
/// `poll_interval`.
///
/// If the driver call finishes before the next poll observes the stop
/// flag, completion wins.
pub(crate) async fn run(
    statement: SharedStatement,
    stop: &StopSignal,
    poll_interval: Duration,
) -> Result<ExecutionOutcome> {
    let task_statement = Arc::clone(&statement);
    let mut handle = tokio::task::spawn_blocking(move || task_statement.lock().execute());
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        let stop_observed = tokio::select! {
            joined = &mut handle => {
                return match joined {
                    Ok(Ok(())) => Ok(ExecutionOutcome::Completed),
                    Ok(Err(err)) => Err(err),
                    Err(err) => Err(QuarryError::driver(format!(
                        "execution task failed: {err}"
                    ))),
                };
            }
            _ = ticker.tick() => stop.is_stopped(),
        };
        if stop_observed {
            if handle.is_finished() {
                // Completion beat the poll; let the join branch report it.
                continue;
            }
            debug!("stop signal observed, detaching in-flight execution");
            tokio::spawn(async move {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "driver call failed after cancellation")
                    }
                    Err(err) => {
                        debug!(error = %err, "execution task failed after cancellation")
                    }
                }
                if let Err(err) = statement.lock().close() {
                    warn!(error = %err, "deferred statement close failed");
                }
            });
            return Ok(ExecutionOutcome::Cancelled);
        }
    }
}

/// Row cap the caching policy imposes for this execution, if any: a
/// non-zero design limit below the cache cap wins, otherwise a positive
/// cache cap applies.
pub(crate) fn cache_row_cap(design_limit: u32, cache_cap: u32) -> Option<u32> {
    if design_limit != 0 && design_limit < cache_cap {
        Some(design_limit)
    } else if cache_cap > 0 {
        Some(cache_cap)
    } else {
        None
    }
}
