use std::io;

use thiserror::Error;

use crate::record::ParseError;
use crate::stats::StatsError;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("could not connect to iperf server at {addr} ({source})")]
    Connectivity {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed iperf line \"{line}\": {source}")]
    Parse {
        line: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("failed to start `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },
    #[error("terminate failed ({graceful}) and kill failed ({forced})")]
    ProcessTermination { graceful: io::Error, forced: io::Error },
    #[error("interrupted by user")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BenchError>;
