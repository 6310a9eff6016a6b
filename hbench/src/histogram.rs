use core::time::Duration;

/// Width of a single bucket.
pub const RESOLUTION: Duration = Duration::from_micros(100);

/// Number of fixed buckets, covering [0; 1s).
pub const NUM_BUCKETS: usize = 10_000;

/// Percentiles reported in the latency distribution.
pub const PERCENTILES: [u8; 9] = [50, 66, 75, 80, 90, 95, 98, 99, 100];

/// Converts the given duration into a bucket index.
#[inline]
pub fn bucket_of(d: Duration) -> u64 {
    (d.as_nanos() / RESOLUTION.as_nanos()) as u64
}

/// Converts a bucket index into milliseconds.
#[inline]
pub fn bucket_ms(idx: u64) -> f64 {
    units_ms(idx as f64)
}

/// Converts a value measured in bucket widths into milliseconds.
#[inline]
pub fn units_ms(v: f64) -> f64 {
    v * RESOLUTION.as_micros() as f64 / 1e3
}

/// Linear latency histogram with fixed resolution.
///
/// Samples inside [0; 1s) land into an arena of fixed buckets, anything
/// slower is appended into an unbounded overflow list, keeping its raw
/// bucket index.
#[derive(Debug, Clone)]
pub struct LinearHistogram {
    buckets: Box<[u64]>,
    overflow: Vec<u64>,
}

impl Default for LinearHistogram {
    fn default() -> Self {
        Self {
            buckets: vec![0; NUM_BUCKETS].into_boxed_slice(),
            overflow: Vec::new(),
        }
    }
}

impl LinearHistogram {
    /// Records a sample given as a bucket index.
    #[inline]
    pub fn record(&mut self, idx: u64) {
        match self.buckets.get_mut(idx as usize) {
            Some(b) => *b += 1,
            None => self.overflow.push(idx),
        }
    }

    /// Returns the total number of recorded samples.
    #[inline]
    pub fn num_samples(&self) -> u64 {
        self.buckets.iter().sum::<u64>() + self.overflow.len() as u64
    }

    /// Calculates the distribution of recorded samples.
    ///
    /// Returns `None` if there are no samples.
    ///
    /// Percentiles are found by accumulating counts in ascending order until
    /// the running sum reaches `n * p / 100`. The first non-empty bucket that
    /// reaches the threshold is reported, and every subsequent threshold it
    /// also satisfies is reported at the same bucket. The 100th percentile is
    /// pinned to `n`, so it is always the maximum.
    pub fn distribution(&mut self) -> Option<Distribution> {
        let n = self.num_samples();
        if n == 0 {
            return None;
        }

        self.overflow.sort_unstable();

        let mut min = u64::MAX;
        let mut max = 0;
        let mut sum = 0u128;
        for (idx, &count) in self.samples() {
            if count == 0 {
                continue;
            }
            min = min.min(idx);
            max = max.max(idx);
            sum += idx as u128 * count as u128;
        }

        let mean = sum as f64 / n as f64;
        let mut var = 0.0;
        for (idx, &count) in self.samples() {
            if count > 0 {
                let d = idx as f64 - mean;
                var += d * d * count as f64;
            }
        }
        let stddev = (var / n as f64).sqrt();

        let mut thresholds = PERCENTILES.map(|p| n * p as u64 / 100);
        thresholds[PERCENTILES.len() - 1] = n;

        let mut percentiles = Vec::with_capacity(PERCENTILES.len());
        let mut curr = 0;
        for (idx, &count) in self.samples() {
            if count == 0 {
                continue;
            }
            curr += count;
            while percentiles.len() < thresholds.len() && curr >= thresholds[percentiles.len()] {
                percentiles.push((PERCENTILES[percentiles.len()], idx));
            }
            if percentiles.len() == thresholds.len() {
                break;
            }
        }

        let m = Distribution {
            n,
            min,
            max,
            mean,
            stddev,
            percentiles,
        };

        Some(m)
    }

    /// Iterates over `(bucket index, count)` pairs in ascending order,
    /// including the overflow list as unit counts.
    ///
    /// The overflow list must be sorted for the order to hold.
    fn samples(&self) -> impl Iterator<Item = (u64, &u64)> {
        const ONE: u64 = 1;

        let fixed = self.buckets.iter().enumerate().map(|(idx, count)| (idx as u64, count));
        let overflow = self.overflow.iter().map(|&idx| (idx, &ONE));

        fixed.chain(overflow)
    }
}

/// Latency distribution, expressed in bucket indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// Number of samples.
    pub n: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// `(percentile, bucket index)` pairs, in ascending order.
    pub percentiles: Vec<(u8, u64)>,
}
