// SPDX-License-Identifier: GPL-3.0-only

//! Worker thread lifecycle with a bounded stop
//!
//! Both real-time pumps in this crate (the audio duplex worker and the V4L2
//! frame pump) run one closure per iteration on a dedicated thread until a
//! shared stop flag flips. Stopping never blocks longer than the caller's
//! timeout: a worker stuck inside a driver call is abandoned and logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::constants::timing::JOIN_POLL_INTERVAL;

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Exit the loop
    Stop,
}

/// How a bounded stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No worker was running
    NotRunning,
    /// Worker exited and was joined
    Joined,
    /// Worker exited by panicking
    Panicked,
    /// Worker did not exit before the deadline and was left behind
    Abandoned,
}

/// Handle to one worker thread
pub struct WorkerLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl WorkerLoop {
    /// Spawn a worker that owns `state` and runs `loop_fn` until stopped
    pub fn spawn<S, F>(name: &str, state: S, loop_fn: F) -> std::io::Result<Self>
    where
        S: Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(name, move || Ok(state), loop_fn)
    }

    /// Spawn a worker whose state is built on the worker thread itself.
    ///
    /// If `init_fn` fails the thread exits without running the loop.
    pub fn spawn_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> std::io::Result<Self>
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop_signal);
        let worker_name = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %worker_name, error = %e, "Worker initialization failed");
                        return;
                    }
                };

                debug!(name = %worker_name, "Worker loop running");
                while !worker_stop.load(Ordering::Acquire) {
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %worker_name, "Worker loop requested stop");
                        break;
                    }
                }
                debug!(name = %worker_name, "Worker loop exiting");
            })?;

        info!(name = %name, "Worker started");

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Clone of the stop flag, for bodies that block in long calls
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Flip the stop flag without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::Release);
    }

    /// Flip the stop flag and join, giving up after `timeout`.
    ///
    /// Idempotent: later calls return [`StopOutcome::NotRunning`].
    pub fn stop(&mut self, timeout: Duration) -> StopOutcome {
        self.request_stop();

        let Some(handle) = self.thread_handle.take() else {
            return StopOutcome::NotRunning;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    name = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker did not stop in time, abandoning join"
                );
                return StopOutcome::Abandoned;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        match handle.join() {
            Ok(()) => {
                debug!(name = %self.name, "Worker joined");
                StopOutcome::Joined
            }
            Err(e) => {
                warn!(name = %self.name, "Worker panicked: {:?}", e);
                StopOutcome::Panicked
            }
        }
    }
}

impl Drop for WorkerLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "WorkerLoop dropped, stopping worker");
            self.stop(Duration::from_millis(500));
        }
    }
}
