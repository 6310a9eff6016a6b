use core::{error::Error, future};

use clap::Parser;
use hbench::{cfg::Config, cmd::Cmd, runtime::Runtime};
use tokio::runtime::Builder;

pub fn main() {
    let cmd = Cmd::parse();
    if let Err(err) = hbench::logging::init(cmd.verbose as usize) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cmd) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(cmd: Cmd) -> Result<(), Box<dyn Error>> {
    let cfg: Config = cmd.try_into()?;
    let json = cfg.json;

    let report = Builder::new_multi_thread()
        .worker_threads(cfg.threads.get())
        .enable_io()
        .enable_time()
        .thread_name("hbench")
        .build()?
        .block_on(async {
            let runtime = Runtime::new(cfg);

            runtime.run(interrupted()).await
        })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(())
}

/// Resolves on Ctrl-C.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for Ctrl-C: {err}");
        future::pending::<()>().await;
    }
}
