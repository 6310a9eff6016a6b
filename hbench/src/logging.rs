use core::error::Error;

use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Initializes the global logger.
///
/// Only records from this crate are printed, with the level given by the
/// number of "-v" flags.
pub fn init(verbosity: usize) -> Result<(), Box<dyn Error>> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    SimpleLogger::new()
        .with_level(LevelFilter::Off)
        .with_module_level("hbench", level)
        .with_utc_timestamps()
        .init()?;

    Ok(())
}
