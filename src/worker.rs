//! Dedicated worker threads for CPU-bound inference.
//!
//! Transcription and synthesis engines are synchronous and can take
//! hundreds of milliseconds per call; running them on a worker thread
//! keeps the scheduler free for audio and network progress. Jobs travel
//! over a crossbeam queue and answers come back on a oneshot; a timeout
//! or cancellation abandons the reply and the in-flight result is
//! discarded when it eventually lands.

use crate::error::{PipelineError, Result};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Job<Req, Resp> {
    input: Req,
    reply: oneshot::Sender<Resp>,
}

/// Handle to a worker thread running one inference engine.
///
/// Dropping the handle closes the job queue and lets the thread exit
/// after its current job.
pub struct InferenceWorker<Req, Resp> {
    jobs: crossbeam_channel::Sender<Job<Req, Resp>>,
}

impl<Req: Send + 'static, Resp: Send + 'static> InferenceWorker<Req, Resp> {
    /// Spawn a named worker thread that services jobs with `handler`.
    ///
    /// The handler (and any engine state it closes over) lives on the
    /// worker thread for the worker's whole lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS thread cannot be spawned.
    pub fn spawn<F>(name: &str, mut handler: F) -> Result<Self>
    where
        F: FnMut(Req) -> Resp + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded::<Job<Req, Resp>>();
        std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let out = handler(job.input);
                    // The submitter may have timed out; a dead reply
                    // channel just discards the result.
                    if job.reply.send(out).is_err() {
                        debug!("worker result discarded (submitter gone)");
                    }
                }
            })?;
        Ok(Self { jobs: tx })
    }

    /// Run one job, waiting at most `timeout`.
    ///
    /// Timeout and cancellation behave identically: the call returns
    /// [`PipelineError::Cancelled`] and the worker's eventual result is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` on timeout/cancellation or `Channel` when the
    /// worker thread has exited.
    pub async fn submit(
        &self,
        input: Req,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Resp> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(Job {
                input,
                reply: reply_tx,
            })
            .map_err(|_| PipelineError::Channel("inference worker has exited".into()))?;

        tokio::select! {
            out = reply_rx => {
                out.map_err(|_| PipelineError::Channel("inference worker dropped the job".into()))
            }
            _ = tokio::time::sleep(timeout) => Err(PipelineError::Cancelled),
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_jobs_in_submission_order() {
        let worker = InferenceWorker::spawn("test-double", |n: u32| n * 2).expect("spawn");
        let cancel = CancellationToken::new();
        for n in 1..=5u32 {
            let out = worker
                .submit(n, Duration::from_secs(1), &cancel)
                .await
                .expect("submit");
            assert_eq!(out, n * 2);
        }
    }

    #[tokio::test]
    async fn timeout_behaves_like_cancellation() {
        let worker = InferenceWorker::spawn("test-slow", |n: u32| {
            std::thread::sleep(Duration::from_millis(200));
            n
        })
        .expect("spawn");
        let cancel = CancellationToken::new();
        let result = worker
            .submit(1, Duration::from_millis(10), &cancel)
            .await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let worker = InferenceWorker::spawn("test-hang", |n: u32| {
            std::thread::sleep(Duration::from_millis(200));
            n
        })
        .expect("spawn");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = worker.submit(1, Duration::from_secs(5), &cancel).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn worker_survives_abandoned_jobs() {
        let worker = InferenceWorker::spawn("test-abandon", |n: u32| {
            std::thread::sleep(Duration::from_millis(50));
            n + 1
        })
        .expect("spawn");
        let cancel = CancellationToken::new();

        let abandoned = worker.submit(1, Duration::from_millis(5), &cancel).await;
        assert!(matches!(abandoned, Err(PipelineError::Cancelled)));

        // The next job still runs to completion.
        let out = worker
            .submit(10, Duration::from_secs(1), &cancel)
            .await
            .expect("second submit");
        assert_eq!(out, 11);
    }
}
