use core::{
    iter::Sum,
    ops::AddAssign,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::{sync::OnceLock, time::Instant};

use http::StatusCode;
use parking_lot::Mutex;

use crate::{
    descriptor::Method,
    histogram::{self, LinearHistogram},
    report::{Latency, MethodReport, Summary, Totals},
};

/// Samples slower than this are considered clock anomalies and discarded.
const MAX_SAMPLE: Duration = Duration::from_secs(3600);

/// Statistics required to report the run progress.
pub trait ProgressStat {
    /// Returns the number of calls finished so far, regardless of outcome.
    fn num_calls(&self) -> u64;
}

/// How a single call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx response.
    Success,
    /// 3xx response.
    Redirect,
    /// 4xx or 5xx response.
    Error,
    /// No response at all: connection failure, timeout or malformed response.
    Transport,
}

impl From<StatusCode> for StatusClass {
    fn from(code: StatusCode) -> Self {
        match code.as_u16() {
            200..300 => Self::Success,
            300..400 => Self::Redirect,
            _ => Self::Error,
        }
    }
}

/// Result of a single call, as seen by the statistics engine.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub method: Method,
    pub class: StatusClass,
    /// Number of request body bytes sent.
    pub bytes_tx: u64,
    /// Number of response body bytes received.
    pub bytes_rx: u64,
    pub start: Instant,
    pub end: Instant,
}

/// Aggregated counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Number of calls finished with a 2xx response.
    pub completed: u64,
    /// Number of calls finished with either non-2xx response or transport
    /// error.
    pub failed: u64,
    /// Number of calls finished with non-2xx response.
    pub non_2xx: u64,
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

impl Counters {
    /// Total number of bytes transferred in both directions.
    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes_tx + self.bytes_rx
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        self.completed += rhs.completed;
        self.failed += rhs.failed;
        self.non_2xx += rhs.non_2xx;
        self.bytes_tx += rhs.bytes_tx;
        self.bytes_rx += rhs.bytes_rx;
    }
}

impl Sum for Counters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut out = Self::default();
        for v in iter {
            out += v;
        }

        out
    }
}

/// Per-worker, per-method statistics.
///
/// Each instance is mutated by its owning worker only, so the counters are
/// never contended. Readers other than the owner get a best-effort view.
#[derive(Debug, Default)]
pub struct WorkerStat {
    num_completed: AtomicU64,
    num_failed: AtomicU64,
    num_non_2xx: AtomicU64,
    bytes_tx: AtomicU64,
    bytes_rx: AtomicU64,
}

impl WorkerStat {
    #[inline]
    fn on_outcome(&self, class: StatusClass, bytes_tx: u64, bytes_rx: u64) {
        match class {
            StatusClass::Success => {
                self.num_completed.fetch_add(1, Ordering::Relaxed);
            }
            StatusClass::Redirect | StatusClass::Error => {
                self.num_failed.fetch_add(1, Ordering::Relaxed);
                self.num_non_2xx.fetch_add(1, Ordering::Relaxed);
            }
            StatusClass::Transport => {
                self.num_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.bytes_tx.fetch_add(bytes_tx, Ordering::Relaxed);
        self.bytes_rx.fetch_add(bytes_rx, Ordering::Relaxed);
    }

    #[inline]
    fn counters(&self) -> Counters {
        Counters {
            completed: self.num_completed.load(Ordering::Relaxed),
            failed: self.num_failed.load(Ordering::Relaxed),
            non_2xx: self.num_non_2xx.load(Ordering::Relaxed),
            bytes_tx: self.bytes_tx.load(Ordering::Relaxed),
            bytes_rx: self.bytes_rx.load(Ordering::Relaxed),
        }
    }
}

/// Run-wide statistics.
#[derive(Debug)]
pub struct Stat {
    concurrency: usize,
    start: OnceLock<Instant>,
    end: OnceLock<Instant>,
    /// Number of descriptors received by workers.
    num_dispatched: AtomicU64,
    /// Per-method per-worker counters, indexed by [`Method::idx`] and then by
    /// the worker index.
    workers: [Box<[WorkerStat]>; Method::ALL.len()],
    /// Per-method latency histograms, all guarded by a single lock.
    hist: Mutex<[LinearHistogram; Method::ALL.len()]>,
}

impl Stat {
    pub fn new(concurrency: usize) -> Self {
        let workers = Method::ALL.map(|_| (0..concurrency).map(|_| WorkerStat::default()).collect());

        Self {
            concurrency,
            start: OnceLock::new(),
            end: OnceLock::new(),
            num_dispatched: AtomicU64::new(0),
            workers,
            hist: Mutex::new(Default::default()),
        }
    }

    /// Marks the beginning of the measurement window.
    ///
    /// Only the first call has an effect.
    #[inline]
    pub fn on_start(&self) {
        let _ = self.start.set(Instant::now());
    }

    /// Marks the end of the measurement window.
    ///
    /// Must be called after all workers have joined. Only the first call has
    /// an effect.
    #[inline]
    pub fn on_end(&self) {
        let _ = self.end.set(Instant::now());
    }

    /// Accounts a descriptor received by a worker.
    #[inline]
    pub fn on_dispatch(&self) {
        self.num_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn num_dispatched(&self) -> u64 {
        self.num_dispatched.load(Ordering::Relaxed)
    }

    /// Accounts the outcome of a single call made by the worker with the
    /// given index.
    pub fn on_outcome(&self, worker: usize, outcome: &CallOutcome) {
        self.workers[outcome.method.idx()][worker].on_outcome(outcome.class, outcome.bytes_tx, outcome.bytes_rx);
        self.on_sample(outcome.method, outcome.start, outcome.end);
    }

    /// Records a latency sample for the given method.
    ///
    /// Samples with the end before the start, or longer than an hour are
    /// considered clock anomalies and are discarded.
    pub fn on_sample(&self, method: Method, start: Instant, end: Instant) {
        let elapsed = match end.checked_duration_since(start) {
            Some(d) if d <= MAX_SAMPLE => d,
            Some(d) => {
                log::warn!("{method} request took {:.1} seconds, skipping", d.as_secs_f64());
                return;
            }
            None => {
                log::warn!("{method} request finished before it started, skipping");
                return;
            }
        };

        self.record(method, elapsed);
    }

    #[inline]
    fn record(&self, method: Method, elapsed: Duration) {
        let idx = histogram::bucket_of(elapsed);
        self.hist.lock()[method.idx()].record(idx);
    }

    /// Returns the number of latency samples recorded for the given method.
    pub fn num_samples(&self, method: Method) -> u64 {
        self.hist.lock()[method.idx()].num_samples()
    }

    /// Sums counters of all workers for the given method.
    pub fn counters(&self, method: Method) -> Counters {
        self.workers[method.idx()].iter().map(WorkerStat::counters).sum()
    }

    /// Sums counters of all workers across all methods.
    pub fn total(&self) -> Counters {
        Method::ALL.into_iter().map(|m| self.counters(m)).sum()
    }

    /// Returns the measurement window length.
    ///
    /// Until the run ends this is the time elapsed since the start.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.start.get() else {
            return Duration::ZERO;
        };

        match self.end.get() {
            Some(end) => end.saturating_duration_since(*start),
            None => start.elapsed(),
        }
    }

    fn totals(&self, counters: Counters) -> Totals {
        Totals::new(self.concurrency, self.elapsed(), counters)
    }

    /// Builds the final report for the given method.
    ///
    /// Returns `None` if no calls were recorded for this method.
    pub fn method_report(&self, method: Method) -> Option<MethodReport> {
        let counters = self.counters(method);
        let dist = self.hist.lock()[method.idx()].distribution()?;

        let m = MethodReport {
            method,
            totals: self.totals(counters),
            latency: Latency::from(dist),
        };

        Some(m)
    }

    /// Builds the final summary across all methods.
    pub fn summary(&self) -> Summary {
        Summary {
            totals: self.totals(self.total()),
            dispatched: self.num_dispatched(),
        }
    }
}

impl ProgressStat for Stat {
    fn num_calls(&self) -> u64 {
        let c = self.total();
        c.completed + c.failed
    }
}
