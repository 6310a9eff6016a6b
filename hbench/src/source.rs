//! Request source.
//!
//! Feeds descriptors into a bounded queue until either the configured limit
//! is reached or the run is cancelled, then closes the queue.

use core::{future, time::Duration};
use flume::{Receiver, Sender};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{descriptor::Descriptor, Produce};

/// When to stop dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Dispatch exactly this many descriptors.
    Count(u64),
    /// Dispatch until the time runs out.
    Time(Duration),
    /// Whichever of both is reached first.
    CountOrTime(u64, Duration),
}

impl Limit {
    /// Constructs a limit from the request count and the time limit, where
    /// zero means "not set".
    ///
    /// Returns `None` if neither is set.
    pub fn new(count: u64, time: Duration) -> Option<Self> {
        match (count, time.is_zero()) {
            (0, true) => None,
            (0, false) => Some(Self::Time(time)),
            (count, true) => Some(Self::Count(count)),
            (count, false) => Some(Self::CountOrTime(count, time)),
        }
    }

    #[inline]
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(count) | Self::CountOrTime(count, ..) => Some(*count),
            Self::Time(..) => None,
        }
    }

    #[inline]
    pub fn time(&self) -> Option<Duration> {
        match self {
            Self::Time(time) | Self::CountOrTime(.., time) => Some(*time),
            Self::Count(..) => None,
        }
    }
}

/// Creates the work queue for the given number of workers.
///
/// The capacity is twice the number of workers, so that a slow worker pool
/// throttles the source.
pub fn queue(workers: usize) -> (Sender<Descriptor>, Receiver<Descriptor>) {
    flume::bounded(2 * workers.max(1))
}

/// Produces descriptors into the work queue.
#[derive(Debug)]
pub struct Source<P> {
    produce: P,
    limit: Limit,
    tx: Sender<Descriptor>,
    cancel: CancellationToken,
}

impl<P> Source<P>
where
    P: Produce<Item = Descriptor>,
{
    pub fn new(produce: P, limit: Limit, tx: Sender<Descriptor>, cancel: CancellationToken) -> Self {
        Self { produce, limit, tx, cancel }
    }

    /// Runs this source until the limit is reached, the run is cancelled or
    /// all workers are gone.
    ///
    /// The queue is closed on return, after the last descriptor was pushed.
    ///
    /// A send interrupted by the cancellation or the deadline may still be
    /// delivered, so the dispatched descriptors are counted by the workers on
    /// receipt rather than here.
    pub async fn run(self) {
        let Self { produce, limit, tx, cancel } = self;

        let deadline = limit.time().map(|time| Instant::now() + time);
        let timer = async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        tokio::pin!(timer);

        let count = limit.count().unwrap_or(u64::MAX);
        let mut sent = 0;
        while sent < count {
            let desc = produce.next().clone();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("dispatch cancelled after {sent} requests");
                    break;
                }
                _ = &mut timer => {
                    log::debug!("time limit reached after {sent} requests");
                    break;
                }
                res = tx.send_async(desc) => {
                    if res.is_err() {
                        log::warn!("no workers left, stopping dispatch");
                        break;
                    }
                    sent += 1;
                }
            }
        }

        // Dropping the only sender closes the queue, letting workers drain it.
        drop(tx);
    }
}
