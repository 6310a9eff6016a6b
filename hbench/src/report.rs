//! Final run report.

use core::{
    fmt::{self, Display, Formatter},
    time::Duration,
};

use serde::Serialize;

use crate::{
    descriptor::Method,
    histogram::{bucket_ms, units_ms, Distribution},
    stat::Counters,
};

/// Throughput figures over the measurement window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub concurrency: usize,
    /// Measurement window in seconds.
    pub elapsed: f64,
    pub completed: u64,
    pub failed: u64,
    pub non_2xx: u64,
    /// Bytes transferred in both directions.
    pub bytes: u64,
    /// Completed requests per second.
    pub rps: f64,
    /// Transfer rate in KiB per second.
    pub kbps: f64,
}

impl Totals {
    pub fn new(concurrency: usize, elapsed: Duration, c: Counters) -> Self {
        let secs = elapsed.as_secs_f64();
        let per_sec = |v: f64| if secs > 0.0 { v / secs } else { 0.0 };

        Self {
            concurrency,
            elapsed: secs,
            completed: c.completed,
            failed: c.failed,
            non_2xx: c.non_2xx,
            bytes: c.bytes(),
            rps: per_sec(c.completed as f64),
            kbps: per_sec(c.bytes() as f64 / 1024.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentile {
    pub percent: u8,
    pub ms: f64,
}

/// Latency distribution in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Latency {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub stddev_ms: f64,
    pub percentiles: Vec<Percentile>,
}

impl From<Distribution> for Latency {
    fn from(d: Distribution) -> Self {
        Self {
            min_ms: bucket_ms(d.min),
            avg_ms: units_ms(d.mean),
            max_ms: bucket_ms(d.max),
            stddev_ms: units_ms(d.stddev),
            percentiles: d
                .percentiles
                .into_iter()
                .map(|(percent, idx)| Percentile { percent, ms: bucket_ms(idx) })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodReport {
    pub method: Method,
    #[serde(flatten)]
    pub totals: Totals,
    pub latency: Latency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(flatten)]
    pub totals: Totals,
    /// Number of descriptors handed to workers.
    pub dispatched: u64,
}

/// Everything printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Whether the run was stopped by the user.
    pub interrupted: bool,
    pub summary: Summary,
    pub methods: Vec<MethodReport>,
}

fn write_header(f: &mut Formatter, name: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "------------ {name} ----------")?;
    writeln!(f)
}

impl Display for Totals {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "Concurrency Level:      {}", self.concurrency)?;
        writeln!(f, "Time taken for tests:   {:.3} seconds", self.elapsed)?;
        writeln!(f, "Complete requests:      {}", self.completed)?;
        writeln!(f, "Failed requests:        {}", self.failed)?;
        writeln!(f, "Non-2xx responses:      {}", self.non_2xx)?;
        writeln!(f, "Total transferred:      {} bytes", self.bytes)?;
        writeln!(f, "Requests per second:    {:.2} [#/sec]", self.rps)?;
        writeln!(f, "Transfer rate:          {:.2} [Kbytes/sec]", self.kbps)
    }
}

impl Display for Latency {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "Connection Times (ms)")?;
        writeln!(f, "              min      avg      max      std")?;
        writeln!(
            f,
            "Total:    {:>7.1}  {:>7.1}  {:>7.1}  {:>7.1}",
            self.min_ms, self.avg_ms, self.max_ms, self.stddev_ms
        )?;
        writeln!(f)?;
        writeln!(f, "Percentage of the requests served within a certain time (ms)")?;
        for p in &self.percentiles {
            writeln!(f, "  {:>3}%    {:>7.1} ms", p.percent, p.ms)?;
        }

        Ok(())
    }
}

impl Display for MethodReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write_header(f, self.method.as_str())?;
        write!(f, "{}", self.totals)?;
        writeln!(f)?;
        write!(f, "{}", self.latency)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write_header(f, "Summary")?;
        if self.interrupted {
            writeln!(f, "Interrupted after dispatching {} requests", self.summary.dispatched)?;
        }
        write!(f, "{}", self.summary.totals)?;

        for m in &self.methods {
            write!(f, "{m}")?;
        }

        Ok(())
    }
}
