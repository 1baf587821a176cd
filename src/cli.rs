use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::phase::PhaseSplit;
use crate::run::RunConfig;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "iperf-hammer",
    about = "Repeated iperf upload/download runs with min/max/jitter summaries"
)]
pub struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run one test and print per-interval progress
    Single(SingleOpts),
    /// Run several tests back to back and average the results
    Multi(MultiOpts),
}

#[derive(Args, Debug, Clone)]
pub struct TargetOpts {
    /// iperf server to connect to
    #[arg(short = 'c', long = "client", value_name = "SERVER_IP")]
    pub server: String,
    /// Test comment (location, antenna name, distance, etc.)
    #[arg(short = 'd', long)]
    pub description: String,
    /// Seconds to run each direction
    #[arg(short = 't', long = "time", default_value_t = 15)]
    pub time: u64,
    /// Seconds between interval reports
    #[arg(short = 'i', long, default_value_t = 1)]
    pub interval: u64,
    /// iperf TCP window size
    #[arg(short = 'w', long, default_value = "64k")]
    pub window: String,
    /// Append every raw iperf line here
    #[arg(long = "csv-file", value_name = "FILE")]
    pub csv_file: Option<PathBuf>,
    /// Append run summaries here
    #[arg(long = "summary-file", value_name = "FILE")]
    pub summary_file: Option<PathBuf>,
    /// "positional" (first time+1 lines are upload) or "port" (by server port)
    #[arg(long, default_value = "positional")]
    pub phase_split: PhaseSplit,
    /// Warn and skip lines that are not iperf CSV instead of failing the run
    #[arg(long, default_value_t = false)]
    pub skip_malformed: bool,
    /// iperf binary
    #[arg(long, default_value = "iperf")]
    pub iperf_bin: String,
}

#[derive(Args, Debug, Clone)]
pub struct SingleOpts {
    #[command(flatten)]
    pub target: TargetOpts,
}

#[derive(Args, Debug, Clone)]
pub struct MultiOpts {
    #[command(flatten)]
    pub target: TargetOpts,
    /// Number of tests to run
    #[arg(short = 'n', long = "num-tests", default_value_t = 3)]
    pub num_tests: u32,
    /// Also print the session summary as CSV
    #[arg(long, default_value_t = false)]
    pub csv_summary: bool,
}

impl TargetOpts {
    pub fn to_run_config(&self, id: u32, echo: bool) -> Result<RunConfig> {
        if self.server.trim().is_empty() {
            bail!("server must not be empty");
        }
        if self.time == 0 {
            bail!("time must be at least 1 second");
        }
        if self.interval == 0 {
            bail!("interval must be at least 1 second");
        }
        if self.window.trim().is_empty() {
            bail!("window must not be empty");
        }
        Ok(RunConfig {
            server: self.server.trim().to_string(),
            id,
            description: self.description.clone(),
            duration: self.time,
            window: self.window.clone(),
            interval: self.interval,
            phase_split: self.phase_split,
            skip_malformed: self.skip_malformed,
            echo,
        })
    }
}

impl MultiOpts {
    pub fn validate(&self) -> Result<()> {
        if self.num_tests == 0 {
            bail!("num-tests must be at least 1");
        }
        Ok(())
    }
}
