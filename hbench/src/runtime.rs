//! Run coordination.
//!
//! Wires the request source, the worker pool and the progress reporter
//! together. They only interact through the work queue, the cancellation
//! token and the shared statistics.

use core::{future::Future, time::Duration};
use std::sync::Arc;

use anyhow::Error;
use rand::{rngs::SmallRng, SeedableRng};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    cfg::{Config, Target},
    descriptor::Method,
    executor::Executor,
    report::Report,
    source::{self, Source},
    stat::{ProgressStat, Stat},
    transport::{HyperTransport, Transport},
    worker::{Worker, WorkerPool},
    OneProduce,
};

/// Progress reporting interval.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Runtime<T> {
    cfg: Config,
    transport: T,
}

impl Runtime<HyperTransport> {
    pub fn new(cfg: Config) -> Self {
        let transport = HyperTransport::new(&cfg.transport);

        Self { cfg, transport }
    }
}

impl<T> Runtime<T>
where
    T: Transport,
{
    pub fn with_transport(cfg: Config, transport: T) -> Self {
        Self { cfg, transport }
    }

    /// Runs the benchmark until the configured limit is reached or the given
    /// `stop` future resolves, whichever comes first.
    ///
    /// Stopping does not abort in-flight calls: dispatch stops and workers
    /// drain the queue before the report is built.
    pub async fn run<F>(self, stop: F) -> Result<Report, Error>
    where
        F: Future<Output = ()>,
    {
        let Self { cfg, transport } = self;
        let Config {
            concurrency,
            limit,
            target,
            executor,
            json,
            ..
        } = cfg;
        let concurrency = concurrency.get();

        let stat = Arc::new(Stat::new(concurrency));
        let executor = Arc::new(Executor::new(transport, executor));
        let cancel = CancellationToken::new();
        let (tx, rx) = source::queue(concurrency);

        log::info!("benchmarking with {concurrency} workers, {limit:?} ...");
        stat.on_start();

        let workers = WorkerPool::spawn(concurrency, |idx| {
            Worker::new(idx, rx.clone(), executor.clone(), stat.clone(), SmallRng::from_entropy()).run()
        });
        drop(rx);

        let source = match target {
            Target::One(desc) => {
                let source = Source::new(OneProduce::new(desc), limit, tx, cancel.clone());
                tokio::spawn(source.run())
            }
            Target::List(list) => {
                let source = Source::new(list, limit, tx, cancel.clone());
                tokio::spawn(source.run())
            }
        };

        let done = CancellationToken::new();
        let progress = tokio::spawn(progress(stat.clone(), done.clone(), json));

        let join = workers.join();
        tokio::pin!(join);
        let interrupted = tokio::select! {
            _ = &mut join => false,
            _ = stop => {
                log::info!("interrupted, waiting for in-flight requests ...");
                cancel.cancel();
                join.await;
                true
            }
        };

        source.await?;
        stat.on_end();
        done.cancel();
        progress.await?;

        log::debug!(
            "dispatched {} requests in {:.3} seconds",
            stat.num_dispatched(),
            stat.elapsed().as_secs_f64()
        );

        let m = Report {
            interrupted,
            summary: stat.summary(),
            methods: Method::ALL.into_iter().filter_map(|m| stat.method_report(m)).collect(),
        };

        Ok(m)
    }
}

/// Prints the number of finished calls once per interval until `done` is
/// cancelled.
///
/// Lines go to stderr when stdout is reserved for the JSON report.
async fn progress<S>(stat: Arc<S>, done: CancellationToken, json: bool)
where
    S: ProgressStat,
{
    let mut interval = time::interval(PROGRESS_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = interval.tick() => {
                let n = stat.num_calls();
                if json {
                    eprintln!("Completed {n} requests");
                } else {
                    println!("Completed {n} requests");
                }
            }
        }
    }
}
