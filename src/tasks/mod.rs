//! # Background Tasks
//!
//! The engine runs two background tasks next to the writer and readers: the
//! [`preloader::Preloader`], which maps pages ahead of the writer so the
//! append path never blocks on a cold page fault, and the
//! [`unmapper::Unmapper`], which reclaims mappings for pages no longer
//! referenced and behind every reader.
//!
//! ## Task Model
//!
//! Tasks are independently cancellable units of work rather than bare
//! threads: [`BackgroundTask::spawn`] hands the loop body a
//! [`CancellationToken`] that the body must check once per iteration, and
//! `stop()` (or drop) flips the token and joins. The wait policy between
//! iterations is injected as an [`idle::IdleStrategy`], keeping the loop
//! logic deterministic under test.
//!
//! Neither task communicates with the writer or readers directly;
//! coordination happens entirely through the page index, per-page cursors
//! and reference counts.

pub mod idle;
pub mod preloader;
pub mod unmapper;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use eyre::{Result, WrapErr};

/// Cooperative cancellation signal checked once per task iteration.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A named background loop with explicit start/stop.
pub struct BackgroundTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!(task = name, "background task started");
                body(task_token);
                tracing::debug!(task = name, "background task stopped");
            })
            .wrap_err_with(|| format!("failed to spawn background task '{}'", name))?;

        Ok(Self {
            name,
            token,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals cancellation and joins the task.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn task_loops_until_stopped() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&iterations);

        let task = BackgroundTask::spawn("test-loop", move |token| {
            while !token.is_cancelled() {
                counted.fetch_add(1, Ordering::Relaxed);
                std::thread::yield_now();
            }
        })
        .unwrap();

        while iterations.load(Ordering::Relaxed) == 0 {
            std::thread::yield_now();
        }

        task.stop();
        let after_stop = iterations.load(Ordering::Relaxed);
        assert!(after_stop > 0);
    }

    #[test]
    fn drop_cancels_and_joins() {
        let stopped = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&stopped);

        let task = BackgroundTask::spawn("test-drop", move |token| {
            while !token.is_cancelled() {
                std::thread::yield_now();
            }
            observed.store(true, Ordering::Release);
        })
        .unwrap();

        drop(task);
        assert!(stopped.load(Ordering::Acquire));
    }
}
