use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::resume_unwind;
use std::thread::available_parallelism;

use compio::runtime::{JoinHandle, spawn};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, error, warn};

type Outcome<R, E> = (usize, Result<R, E>);
type Running<R, E> = FuturesUnordered<JoinHandle<Outcome<R, E>>>;

/// Runs asynchronous jobs with a fixed ceiling on how many are in flight.
///
/// Each job is given as a producer closure that is only called when the job
/// starts, so an unbounded or lazily built input is fine. Results come back in
/// input order. The first failure is returned as soon as it is reported; jobs
/// that are still running keep going in the background and their outcomes are
/// discarded. A job that panics brings the panic back to the caller of `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimiter {
    concurrency: NonZeroUsize,
}

impl Default for ConcurrencyLimiter {
    /// One job per available core.
    fn default() -> Self {
        Self::new(available_parallelism().unwrap_or(NonZeroUsize::MIN))
    }
}

impl ConcurrencyLimiter {
    pub fn new(concurrency: NonZeroUsize) -> Self {
        Self { concurrency }
    }

    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    pub async fn run<I, P, F, R, E>(&self, producers: I) -> Result<Vec<R>, E>
    where
        I: IntoIterator<Item = P>,
        P: FnOnce() -> F,
        F: Future<Output = Result<R, E>> + 'static,
        R: 'static,
        E: 'static,
    {
        let mut producers = producers.into_iter().enumerate();
        let mut running: Running<R, E> = FuturesUnordered::new();
        let mut results: Vec<Option<R>> = Vec::new();

        while running.len() < self.concurrency.get()
            && start_next(&mut producers, &running, &mut results)
        {}
        debug!("Started {} jobs with a limit of {}", running.len(), self.concurrency);

        while let Some(joined) = running.next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(payload) => {
                    error!("A job panicked, abandoning {} running jobs", running.len());
                    running.into_iter().for_each(JoinHandle::detach);
                    resume_unwind(payload);
                }
            };

            match result {
                Ok(value) => {
                    debug!("Job {} completed", index);
                    results[index] = Some(value);
                }
                Err(error) => {
                    warn!("Job {} failed, abandoning {} running jobs", index, running.len());
                    running.into_iter().for_each(JoinHandle::detach);
                    return Err(error);
                }
            }

            start_next(&mut producers, &running, &mut results);
        }

        debug!("All {} jobs completed", results.len());
        Ok(results.into_iter().flatten().collect())
    }
}

/// Starts the next job, if any. Returns whether one was started.
fn start_next<P, F, R, E>(
    producers: &mut impl Iterator<Item = (usize, P)>,
    running: &Running<R, E>,
    results: &mut Vec<Option<R>>,
) -> bool
where
    P: FnOnce() -> F,
    F: Future<Output = Result<R, E>> + 'static,
    R: 'static,
    E: 'static,
{
    let Some((index, producer)) = producers.next() else {
        return false;
    };
    results.push(None);

    let job = producer();
    running.push(spawn(async move { (index, job.await) }));

    true
}
