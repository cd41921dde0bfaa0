// src/utils/tasks.rs
//! Best-effort background jobs.
//!
//! One worker thread drains queued jobs in order. A job's outcome is logged and
//! published on the outcome channel; it never reaches whoever queued the job.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{self as chan, Receiver, Sender};

type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

const OUTCOME_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub name: String,
    /// `Err` holds the rendered error chain.
    pub result: Result<(), String>,
}

pub struct TaskQueue {
    jobs: Option<Sender<(String, Job)>>,
    outcomes: Receiver<TaskOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    pub fn start(span: tracing::Span) -> Self {
        let (job_tx, job_rx) = chan::unbounded::<(String, Job)>();
        let (out_tx, out_rx) = chan::bounded(OUTCOME_BUFFER);
        let worker = thread::Builder::new()
            .name("dsvc-tasks".to_string())
            .spawn(move || worker_loop(span, job_rx, out_tx))
            .ok();
        if worker.is_none() {
            tracing::error!("failed to spawn background task worker; jobs will be dropped");
        }
        Self {
            jobs: Some(job_tx),
            outcomes: out_rx,
            worker,
        }
    }

    /// Queue `job`. Silently dropped if the worker is gone.
    pub fn spawn<F>(&self, name: impl Into<String>, job: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        let sent = self
            .jobs
            .as_ref()
            .map(|tx| tx.send((name.clone(), Box::new(job))).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::warn!(task = %name, "task queue closed, dropping job");
        }
    }

    /// Outcomes of finished jobs. New outcomes are discarded while the buffer is full.
    pub fn outcomes(&self) -> Receiver<TaskOutcome> {
        self.outcomes.clone()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
    }
}

fn worker_loop(span: tracing::Span, rx: Receiver<(String, Job)>, tx: Sender<TaskOutcome>) {
    while let Ok((name, job)) = rx.recv() {
        let result = job().map_err(|e| format!("{e:#}"));
        match &result {
            Ok(()) => tracing::debug!(parent: &span, task = %name, "background task finished"),
            Err(e) => tracing::error!(parent: &span, task = %name, error = %e, "background task failed"),
        }
        let outcome = TaskOutcome { name, result };
        // Dropped when the buffer is full.
        let _ = tx.try_send(outcome);
    }
}
