use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::executor::MULTIPART;

/// HTTP load generator and latency meter.
///
/// Either drives a single URL with the given method, or cycles through a
/// list of "METHOD,URL" lines loaded from a file.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cmd {
    /// Target URL.
    ///
    /// Conflicts with the descriptor list file.
    pub url: Option<String>,
    /// Number of concurrent workers.
    #[clap(short, long, default_value_t = 1)]
    pub concurrency: usize,
    /// Number of requests to perform.
    ///
    /// Zero means no request limit, in which case the time limit must be set.
    #[clap(short = 'n', long, default_value_t = 0)]
    pub requests: u64,
    /// Maximum number of seconds to spend for benchmarking.
    ///
    /// If both limits are set, whichever is reached first stops the run.
    #[clap(short = 't', long, default_value_t = 0)]
    pub timelimit: u64,
    /// Reuse connections between requests.
    #[clap(short = 'k', long)]
    pub keep_alive: bool,
    /// Per-request timeout in seconds.
    #[clap(short = 's', long, default_value_t = 30)]
    pub timeout: u64,
    /// HTTP method used in single-target mode.
    #[clap(short, long, default_value = "GET")]
    pub method: String,
    /// Extra header in the "Name: value" form, may be repeated.
    #[clap(short = 'H', long = "header")]
    pub headers: Vec<String>,
    /// Minimum size of synthetic upload bodies in bytes.
    #[clap(long, default_value_t = 10)]
    pub min: u64,
    /// Maximum size of synthetic upload bodies in bytes, exclusive.
    #[clap(long, default_value_t = 100)]
    pub max: u64,
    /// Path to the descriptor list file, one "METHOD,URL" per line.
    #[clap(short = 'f', long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Path to the file used as the upload body instead of synthetic
    /// content.
    #[clap(short = 'b', long, value_name = "PATH")]
    pub body: Option<PathBuf>,
    /// Content type of upload bodies.
    ///
    /// "multipart/form-data" wraps bodies into a multipart form, anything
    /// else sends them as is.
    #[clap(long, default_value = MULTIPART)]
    pub content_type: String,
    /// Number of runtime threads.
    #[clap(long, default_value_t = 1)]
    pub cpu: usize,
    /// Print the final report as JSON.
    #[clap(long)]
    pub json: bool,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count)]
    pub verbose: u8,
}
