use std::fmt;

use thiserror::Error;

/// Number of comma separated fields in one `iperf -y C` line.
pub const FIELD_COUNT: usize = 9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("expected 9 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid integer for {0}: {1}")]
    BadInt(&'static str, String),
}

/// One interval line reported by iperf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementRecord {
    pub timestamp: String,
    pub client_addr: String,
    pub client_port: String,
    pub server_addr: String,
    pub server_port: String,
    /// iperf reports -1 on summed lines
    pub test_id: i64,
    pub time_range: String,
    /// bytes moved during the interval
    pub transferred: u64,
    /// bits per second
    pub speed: u64,
}

pub fn parse_record(line: &str) -> Result<MeasurementRecord, ParseError> {
    let s = line.trim_end_matches(['\r', '\n']);
    if s.is_empty() {
        return Err(ParseError::Empty);
    }
    let fields: Vec<&str> = s.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount(fields.len()));
    }

    Ok(MeasurementRecord {
        timestamp: fields[0].to_string(),
        client_addr: fields[1].to_string(),
        client_port: fields[2].to_string(),
        server_addr: fields[3].to_string(),
        server_port: fields[4].to_string(),
        test_id: req_i64(fields[5], "test_id")?,
        time_range: fields[6].to_string(),
        transferred: req_u64(fields[7], "transferred")?,
        speed: req_u64(fields[8], "speed")?,
    })
}

fn req_u64(v: &str, k: &'static str) -> Result<u64, ParseError> {
    v.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::BadInt(k, v.to_string()))
}
fn req_i64(v: &str, k: &'static str) -> Result<i64, ParseError> {
    v.trim()
        .parse::<i64>()
        .map_err(|_| ParseError::BadInt(k, v.to_string()))
}

impl fmt::Display for MeasurementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.timestamp,
            self.client_addr,
            self.client_port,
            self.server_addr,
            self.server_port,
            self.test_id,
            self.time_range,
            self.transferred,
            self.speed
        )
    }
}
