use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod error;
mod format;
mod multi;
mod output;
mod phase;
mod probe;
mod process;
mod record;
mod run;
mod stats;
mod summary;

use crate::error::BenchError;
use crate::multi::{MultiRunResult, run_session};
use crate::output::Sinks;
use crate::process::{AbortHandle, IperfLauncher};
use crate::run::run_single;

/// Conventional status for a run stopped with ctrl-c.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    let abort = AbortHandle::new();
    let handler_flag = abort.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.abort()) {
        warn!("could not install ctrl-c handler: {e}");
    }

    let outcome = match args.cmd {
        cli::Cmd::Single(opts) => single(opts, &abort),
        cli::Cmd::Multi(opts) => multi(opts, &abort),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<BenchError>() {
            Some(BenchError::Interrupted) => {
                println!();
                info!("interrupted, iperf stopped");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            Some(BenchError::ProcessTermination { .. }) => {
                error!("{e:#}");
                eprintln!("Could not kill the iperf subprocess, you should do so manually.");
                ExitCode::FAILURE
            }
            _ => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_sinks(target: &cli::TargetOpts) -> Result<Sinks> {
    Sinks::open(target.csv_file.as_deref(), target.summary_file.as_deref())
        .context("opening report files")
}

fn single(opts: cli::SingleOpts, abort: &AbortHandle) -> Result<()> {
    let config = opts.target.to_run_config(1, true)?;
    let mut sinks = open_sinks(&opts.target)?;
    let launcher = IperfLauncher::new(&opts.target.iperf_bin);

    print!("{}", config.header());
    let result = run_single(&launcher, config, &mut sinks, abort)?;
    print!("{}", result.summary());
    Ok(())
}

fn multi(opts: cli::MultiOpts, abort: &AbortHandle) -> Result<()> {
    opts.validate()?;
    let base = opts.target.to_run_config(0, false)?;
    let mut sinks = open_sinks(&opts.target)?;
    let launcher = IperfLauncher::new(&opts.target.iperf_bin);
    let mut session = MultiRunResult::new(&base.description);

    let outcome = run_session(
        &launcher,
        &base,
        opts.num_tests,
        &mut sinks,
        abort,
        &mut session,
        |run| print!("{}{}", run.config.header(), run.summary()),
    );
    if let Err(e) = outcome {
        if session.completed() > 0 {
            warn!(
                "session stopped after {} of {} runs",
                session.completed(),
                opts.num_tests
            );
        }
        return Err(e.into());
    }

    print!("{}{}", session.header(), session.summary());
    if opts.csv_summary {
        print!("{}", session.summary().to_csv());
    }
    Ok(())
}
