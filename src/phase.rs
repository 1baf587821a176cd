use std::str::FromStr;

use crate::record::MeasurementRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Upload,
    Download,
}

/// How records are assigned to the upload or download phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSplit {
    /// First `duration + 1` lines are upload. iperf prints one line per
    /// second plus a closing cumulative line for each phase.
    Positional,
    /// Upload records are the ones whose server side port is the iperf
    /// listen port; `-r` download traffic comes back on a fresh connection.
    ServerPort,
}

impl FromStr for PhaseSplit {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positional" => Ok(PhaseSplit::Positional),
            "port" => Ok(PhaseSplit::ServerPort),
            other => Err(format!("unknown phase split '{other}', expected positional or port")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseSplitter {
    mode: PhaseSplit,
    upload_lines: u64,
    listen_port: u16,
    seen: u64,
}

impl PhaseSplitter {
    pub fn new(mode: PhaseSplit, duration_secs: u64, listen_port: u16) -> Self {
        Self {
            mode,
            upload_lines: duration_secs + 1,
            listen_port,
            seen: 0,
        }
    }

    /// Classify the next non-empty line.
    pub fn classify(&mut self, rec: &MeasurementRecord) -> Phase {
        let idx = self.seen;
        self.seen += 1;
        match self.mode {
            PhaseSplit::Positional if idx < self.upload_lines => Phase::Upload,
            PhaseSplit::Positional => Phase::Download,
            PhaseSplit::ServerPort => match rec.server_port.trim().parse::<u16>() {
                Ok(p) if p == self.listen_port => Phase::Upload,
                _ => Phase::Download,
            },
        }
    }
}
