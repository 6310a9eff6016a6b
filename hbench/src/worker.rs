use core::future::Future;
use std::{sync::Arc, time::Instant};

use flume::Receiver;
use rand::rngs::SmallRng;
use tokio::task::JoinHandle;

use crate::{
    descriptor::Descriptor,
    executor::Executor,
    stat::{CallOutcome, Stat, StatusClass},
    transport::Transport,
};

/// Single worker pulling descriptors from the work queue.
#[derive(Debug)]
pub struct Worker<T> {
    /// Worker index, used to address its own statistics slot.
    idx: usize,
    rx: Receiver<Descriptor>,
    executor: Arc<Executor<T>>,
    stat: Arc<Stat>,
    /// Per-worker random source for body sizes and contents.
    rng: SmallRng,
}

impl<T> Worker<T>
where
    T: Transport,
{
    pub fn new(idx: usize, rx: Receiver<Descriptor>, executor: Arc<Executor<T>>, stat: Arc<Stat>, rng: SmallRng) -> Self {
        Self { idx, rx, executor, stat, rng }
    }

    /// Runs until the queue is closed and drained.
    pub async fn run(mut self) {
        while let Ok(desc) = self.rx.recv_async().await {
            self.stat.on_dispatch();
            self.execute(&desc).await;
        }

        log::trace!("worker {} finished", self.idx);
    }

    async fn execute(&mut self, desc: &Descriptor) {
        let start = Instant::now();
        let result = self.executor.execute(desc, &mut self.rng).await;
        let end = Instant::now();

        let (class, bytes_tx, bytes_rx) = match result {
            Ok(v) => (StatusClass::from(v.status), v.bytes_tx, v.bytes_rx),
            Err(err) => {
                log::debug!("{} {}: {err}", desc.method, desc.target);
                (StatusClass::Transport, 0, 0)
            }
        };

        let outcome = CallOutcome {
            method: desc.method,
            class,
            bytes_tx,
            bytes_rx,
            start,
            end,
        };
        self.stat.on_outcome(self.idx, &outcome);
    }
}

/// Fixed-size set of concurrently running workers.
#[derive(Debug)]
pub struct WorkerPool {
    jobs: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `num_workers` tasks, each constructed by the given factory from
    /// its index.
    pub fn spawn<F, W>(num_workers: usize, mut factory: F) -> Self
    where
        F: FnMut(usize) -> W,
        W: Future<Output = ()> + Send + 'static,
    {
        let mut jobs = Vec::with_capacity(num_workers);
        for idx in 0..num_workers {
            jobs.push(tokio::spawn(factory(idx)));
        }

        Self { jobs }
    }

    /// Waits for all workers to finish.
    pub async fn join(self) {
        for job in self.jobs {
            if let Err(err) = job.await {
                log::error!("worker failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use http::StatusCode;
    use rand::SeedableRng;

    use super::*;
    use crate::{
        descriptor::Method,
        executor::{Config, Payload, Retry},
        source,
        transport::mock::ScriptedTransport,
    };

    fn executor(transport: ScriptedTransport) -> Arc<Executor<ScriptedTransport>> {
        let cfg = Config {
            headers: Default::default(),
            payload: Payload::Synthetic { min: 10, max: 20 },
            content_type: None,
            retry: Retry::default(),
        };

        Arc::new(Executor::new(transport, cfg))
    }

    fn desc(method: Method) -> Descriptor {
        Descriptor::new(method, "http://h/a".parse().unwrap())
    }

    async fn run_pool(transport: ScriptedTransport, descs: Vec<Descriptor>, num_workers: usize) -> Arc<Stat> {
        let stat = Arc::new(Stat::new(num_workers));
        let executor = executor(transport);
        let (tx, rx) = source::queue(num_workers);

        let pool = WorkerPool::spawn(num_workers, |idx| {
            let rng = SmallRng::seed_from_u64(idx as u64);
            Worker::new(idx, rx.clone(), executor.clone(), stat.clone(), rng).run()
        });
        drop(rx);

        for desc in descs {
            tx.send_async(desc).await.unwrap();
        }
        drop(tx);
        pool.join().await;

        stat
    }

    #[tokio::test]
    async fn every_descriptor_recorded_once() {
        let descs = (0..100).map(|idx| desc(Method::ALL[idx % 5])).collect();
        let stat = run_pool(ScriptedTransport::ok(), descs, 4).await;

        for method in Method::ALL {
            let c = stat.counters(method);
            assert_eq!(20, c.completed);
            assert_eq!(0, c.failed);
            assert_eq!(20, stat.num_samples(method));
        }
        assert_eq!(100, stat.total().completed);
        assert_eq!(100, stat.num_dispatched());
    }

    #[tokio::test]
    async fn classifies_outcomes() {
        let descs = (0..10).map(|_| desc(Method::Get)).collect();
        let transport = ScriptedTransport::with_status(StatusCode::INTERNAL_SERVER_ERROR).fail_first(3);
        let stat = run_pool(transport, descs, 1).await;

        let c = stat.counters(Method::Get);
        assert_eq!(0, c.completed);
        assert_eq!(10, c.failed);
        assert_eq!(7, c.non_2xx);
        // Transport failures carry no bytes.
        assert_eq!(700, c.bytes_rx);
        assert_eq!(10, stat.num_samples(Method::Get));
    }

    #[tokio::test(start_paused = true)]
    async fn uploads_account_request_bytes() {
        let descs = (0..5).map(|_| desc(Method::Put)).collect();
        let stat = run_pool(ScriptedTransport::ok().fail_first(1), descs, 2).await;

        let c = stat.counters(Method::Put);
        assert_eq!(5, c.completed);
        assert!((50..100).contains(&c.bytes_tx), "bytes_tx: {}", c.bytes_tx);
    }
}
