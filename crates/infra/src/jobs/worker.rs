//! Background worker that drains pending jobs.

use std::io;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use dlpkit_core::JobId;
use dlpkit_inspect::JobState;

use super::store::JobStoreError;

/// Something that can execute the next pending job.
pub trait JobRunner: Send + Sync {
    /// Run one pending job to a terminal state. `Ok(None)` when nothing is pending.
    fn run_next(&self) -> Result<Option<(JobId, JobState)>, JobStoreError>;
}

impl<R: JobRunner + ?Sized> JobRunner for Arc<R> {
    fn run_next(&self) -> Result<Option<(JobId, JobState)>, JobStoreError> {
        (**self).run_next()
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle sleep between polls when no job is pending.
    pub poll_interval: Duration,
    /// Thread name, also used in logs.
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            name: "dlp-job-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_done: u64,
    pub jobs_failed: u64,
    pub uptime_secs: u64,
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Stop the worker after its current job and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn a thread that repeatedly calls `runner.run_next()` until shut down.
pub fn spawn_worker<R>(runner: R, config: WorkerConfig) -> io::Result<WorkerHandle>
where
    R: JobRunner + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let stats = Arc::new(Mutex::new(WorkerStats::default()));
    let thread_stats = stats.clone();

    let join = thread::Builder::new()
        .name(config.name.clone())
        .spawn(move || worker_loop(runner, config, shutdown_rx, thread_stats))?;

    Ok(WorkerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
        stats,
    })
}

fn worker_loop<R: JobRunner>(
    runner: R,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "job worker started");
    let started = Instant::now();

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let outcome = runner.run_next();

        {
            let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
            s.uptime_secs = started.elapsed().as_secs();
            if let Ok(Some((_, state))) = &outcome {
                s.jobs_processed += 1;
                match state {
                    JobState::Done => s.jobs_done += 1,
                    JobState::Failed => s.jobs_failed += 1,
                    JobState::Pending | JobState::Running => {}
                }
            }
        }

        let idle = match outcome {
            Ok(Some((job_id, state))) => {
                debug!(worker = %config.name, job_id = %job_id, ?state, "job finished");
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(worker = %config.name, error = %e, "failed to run job");
                true
            }
        };

        if idle {
            match shutdown_rx.recv_timeout(config.poll_interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }
        }
    }

    info!(worker = %config.name, "job worker stopped");
}
