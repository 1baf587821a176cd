use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{BenchError, Result};
use crate::format::{format_bits, format_bytes};
use crate::output::Sinks;
use crate::phase::{Phase, PhaseSplit, PhaseSplitter};
use crate::probe::IPERF_PORT;
use crate::process::{AbortHandle, Launcher, LineEvent, stop_process};
use crate::record::parse_record;
use crate::stats::DirectionalStats;
use crate::summary::{DirectionSummary, Summary, banner};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything needed to launch and label one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub server: String,
    pub id: u32,
    pub description: String,
    /// seconds per phase
    pub duration: u64,
    pub window: String,
    pub interval: u64,
    pub phase_split: PhaseSplit,
    pub skip_malformed: bool,
    /// Print progress lines to stdout while the run is in flight.
    pub echo: bool,
}

impl RunConfig {
    /// Tradeoff mode (`-r`) so both directions run back to back, CSV output.
    pub fn iperf_args(&self) -> Vec<String> {
        vec![
            "-c".into(),
            self.server.clone(),
            "-t".into(),
            self.duration.to_string(),
            "-w".into(),
            self.window.clone(),
            "-r".into(),
            "-i".into(),
            self.interval.to_string(),
            "-y".into(),
            "C".into(),
        ]
    }

    pub fn header(&self) -> String {
        banner(&self.description, &format!("Test #{}", self.id))
    }
}

#[derive(Debug, Clone)]
pub struct SingleRunResult {
    pub config: RunConfig,
    pub upload: DirectionalStats,
    pub download: DirectionalStats,
    /// malformed lines dropped under `skip_malformed`
    pub skipped: usize,
}

impl SingleRunResult {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            upload: DirectionalStats::new(),
            download: DirectionalStats::new(),
            skipped: 0,
        }
    }

    fn direction_mut(&mut self, phase: Phase) -> &mut DirectionalStats {
        match phase {
            Phase::Upload => &mut self.upload,
            Phase::Download => &mut self.download,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            upload: DirectionSummary::from_stats(&self.upload),
            download: DirectionSummary::from_stats(&self.download),
        }
    }
}

/// Probe the server, run iperf once and collect both directions.
///
/// The abort flag is checked after every wait on the process; once it is
/// seen the process is stopped and no further lines are consumed.
pub fn run_single(
    launcher: &dyn Launcher,
    config: RunConfig,
    sinks: &mut Sinks,
    abort: &AbortHandle,
) -> Result<SingleRunResult> {
    run_single_to(launcher, config, sinks, abort, &mut io::stdout())
}

/// `run_single` with progress lines going to `out`.
fn run_single_to(
    launcher: &dyn Launcher,
    config: RunConfig,
    sinks: &mut Sinks,
    abort: &AbortHandle,
    out: &mut dyn Write,
) -> Result<SingleRunResult> {
    if abort.is_aborted() {
        return Err(BenchError::Interrupted);
    }
    launcher.probe(&config.server)?;
    info!(
        "run #{} against {} ({}s per direction, window {}, interval {}s)",
        config.id, config.server, config.duration, config.window, config.interval
    );

    let mut result = SingleRunResult::new(config);
    sinks.raw_text(&result.config.header())?;

    if abort.is_aborted() {
        return Err(BenchError::Interrupted);
    }
    let mut process = launcher.launch(&result.config)?;
    let mut splitter = PhaseSplitter::new(
        result.config.phase_split,
        result.config.duration,
        IPERF_PORT,
    );
    let echo = result.config.echo;
    // iperf always starts with the client sending
    let mut current = Phase::Upload;
    if echo {
        writeln!(out, "Upload In Progress:")?;
    }

    loop {
        let event = process.next_line(POLL_INTERVAL);
        if abort.is_aborted() {
            warn!("run #{} aborted, stopping iperf", result.config.id);
            stop_process(process.as_mut())?;
            return Err(BenchError::Interrupted);
        }
        let line = match event? {
            LineEvent::Line(l) => l,
            LineEvent::Pending => continue,
            LineEvent::Exited => break,
        };
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        sinks.raw_line(line)?;

        let rec = match parse_record(line) {
            Ok(r) => r,
            Err(source) if result.config.skip_malformed => {
                warn!("skipping malformed line \"{line}\": {source}");
                result.skipped += 1;
                continue;
            }
            Err(source) => {
                stop_process(process.as_mut())?;
                return Err(BenchError::Parse {
                    line: line.to_string(),
                    source,
                });
            }
        };

        let phase = splitter.classify(&rec);
        if echo {
            if current != phase {
                match phase {
                    Phase::Upload => writeln!(out, "Upload In Progress:")?,
                    Phase::Download => writeln!(out, "Download In Progress:")?,
                }
            }
            writeln!(
                out,
                " {} sec \t{}\t{}/sec",
                rec.time_range,
                format_bytes(rec.transferred as f64),
                format_bits(rec.speed as f64)
            )?;
        }
        current = phase;
        debug!("{phase:?} {} {} bps", rec.time_range, rec.speed);
        result.direction_mut(phase).record(rec);
    }

    info!(
        "run #{} finished: {} upload and {} download records, {} skipped",
        result.config.id,
        result.upload.len(),
        result.download.len(),
        result.skipped
    );
    let report = format!("{}{}", result.config.header(), result.summary());
    sinks.summary_text(&report)?;
    Ok(result)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;

    use super::*;
    use crate::process::testing::*;

    pub fn config(id: u32, duration: u64) -> RunConfig {
        RunConfig {
            server: "10.0.0.1".into(),
            id,
            description: "bench lab".into(),
            duration,
            window: "64k".into(),
            interval: 1,
            phase_split: PhaseSplit::Positional,
            skip_malformed: false,
            echo: false,
        }
    }

    #[test]
    fn iperf_command_line() {
        assert_eq!(
            config(1, 15).iperf_args().join(" "),
            "-c 10.0.0.1 -t 15 -w 64k -r -i 1 -y C"
        );
    }

    #[test]
    fn splits_positionally_and_keeps_last_values() {
        // duration 2: three upload lines, the last being the cumulative one
        let lines = iperf_lines(&[100, 300, 200], &[400, 900, 700]);
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(lines)]);
        let res =
            run_single(&launcher, config(1, 2), &mut Sinks::default(), &AbortHandle::new())
                .unwrap();

        assert_eq!(res.upload.len(), 3);
        assert_eq!(res.download.len(), 3);
        assert_eq!(res.upload.last_speed(), Ok(200));
        assert_eq!(res.upload.last_transferred(), Ok(25));
        assert_eq!(res.upload.min_speed(), Some(100));
        assert_eq!(res.upload.max_speed(), Some(300));
        assert_eq!(res.download.last_speed(), Ok(700));
        assert_eq!(res.download.min_speed(), Some(400));
        assert_eq!(res.download.max_speed(), Some(900));
    }

    #[test]
    fn blank_lines_do_not_count() {
        let mut lines = iperf_lines(&[100, 100], &[50]);
        lines.insert(1, String::new());
        lines.insert(0, "   ".into());
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(lines)]);
        let res =
            run_single(&launcher, config(1, 1), &mut Sinks::default(), &AbortHandle::new())
                .unwrap();
        assert_eq!(res.upload.len(), 2);
        assert_eq!(res.download.len(), 1);
    }

    #[test]
    fn port_split_follows_connection() {
        // one upload line too few for positional mode to get right
        let lines = iperf_lines(&[100, 200], &[300, 400, 500]);
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(lines)]);
        let mut conf = config(1, 2);
        conf.phase_split = PhaseSplit::ServerPort;
        let res = run_single(&launcher, conf, &mut Sinks::default(), &AbortHandle::new()).unwrap();
        assert_eq!(res.upload.len(), 2);
        assert_eq!(res.download.len(), 3);
    }

    #[test]
    fn unreachable_server_never_spawns() {
        let mut launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(vec![])]);
        launcher.unreachable = true;
        let err = run_single(&launcher, config(1, 1), &mut Sinks::default(), &AbortHandle::new())
            .unwrap_err();
        assert!(matches!(err, BenchError::Connectivity { .. }));
        assert_eq!(launcher.launched.get(), 0);
    }

    #[test]
    fn malformed_line_is_fatal_by_default() {
        let mut lines = iperf_lines(&[100, 200], &[300]);
        lines.insert(1, "WARNING: window size mismatch".into());
        let p = ScriptedProcess::new(lines);
        let log = p.log.clone();
        let launcher = ScriptedLauncher::new(vec![p]);
        let err = run_single(&launcher, config(1, 1), &mut Sinks::default(), &AbortHandle::new())
            .unwrap_err();
        assert!(matches!(err, BenchError::Parse { .. }));
        assert!(log.terminated.get());
    }

    #[test]
    fn malformed_line_skipped_when_asked() {
        let mut lines = iperf_lines(&[100, 200], &[300]);
        lines.insert(1, "a,b,c".into());
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(lines)]);
        let mut conf = config(1, 1);
        conf.skip_malformed = true;
        let res = run_single(&launcher, conf, &mut Sinks::default(), &AbortHandle::new()).unwrap();
        assert_eq!(res.skipped, 1);
        assert_eq!(res.upload.len(), 2);
        assert_eq!(res.download.len(), 1);
    }

    #[test]
    fn abort_stops_process_and_consumption() {
        let abort = AbortHandle::new();
        let mut p = ScriptedProcess::new(iperf_lines(&[100, 200, 300], &[400, 500, 600]));
        p.abort = Some((abort.clone(), 2));
        let log = p.log.clone();
        let launcher = ScriptedLauncher::new(vec![p]);

        let err = run_single(&launcher, config(1, 2), &mut Sinks::default(), &abort).unwrap_err();
        assert!(matches!(err, BenchError::Interrupted));
        assert!(log.terminated.get());
        assert_eq!(log.lines_served.get(), 2);
    }

    #[test]
    fn abort_with_stuck_process_is_termination_error() {
        let abort = AbortHandle::new();
        let mut p = ScriptedProcess::new(iperf_lines(&[100], &[]));
        p.abort = Some((abort.clone(), 0));
        p.terminate_fails = true;
        p.kill_fails = true;
        let launcher = ScriptedLauncher::new(vec![p]);

        let err = run_single(&launcher, config(1, 0), &mut Sinks::default(), &abort).unwrap_err();
        assert!(matches!(err, BenchError::ProcessTermination { .. }));
    }

    #[test]
    fn abort_before_start_never_launches() {
        let abort = AbortHandle::new();
        abort.abort();
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(iperf_lines(&[1], &[1]))]);
        let err = run_single(&launcher, config(1, 0), &mut Sinks::default(), &abort).unwrap_err();
        assert!(matches!(err, BenchError::Interrupted));
        assert_eq!(launcher.launched.get(), 0);
    }

    #[test]
    fn upload_banner_printed_before_any_output() {
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(vec![])]);
        let mut conf = config(1, 1);
        conf.echo = true;
        let mut out = Vec::new();
        run_single_to(&launcher, conf, &mut Sinks::default(), &AbortHandle::new(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Upload In Progress:\n");
    }

    #[test]
    fn echo_announces_each_phase_once() {
        let launcher =
            ScriptedLauncher::new(vec![ScriptedProcess::new(iperf_lines(&[1024, 1024], &[2048]))]);
        let mut conf = config(1, 1);
        conf.echo = true;
        let mut out = Vec::new();
        run_single_to(&launcher, conf, &mut Sinks::default(), &AbortHandle::new(), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Upload In Progress:");
        assert_eq!(lines[3], "Download In Progress:");
        assert_eq!(lines[4], " 0.0-1.0 sec \t256.00 bytes\t  2.00 Kbits/sec");
    }

    #[test]
    fn writes_raw_and_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        let summary = dir.path().join("summary.txt");
        let mut sinks = Sinks::open(Some(&raw), Some(&summary)).unwrap();

        let lines = iperf_lines(&[1024, 2048], &[4096]);
        let launcher = ScriptedLauncher::new(vec![ScriptedProcess::new(lines.clone())]);
        run_single(&launcher, config(7, 1), &mut sinks, &AbortHandle::new()).unwrap();
        drop(sinks);

        let raw = fs::read_to_string(raw).unwrap();
        assert!(raw.starts_with(&config(7, 1).header()));
        for l in &lines {
            assert!(raw.contains(l.as_str()));
        }

        let summary = fs::read_to_string(summary).unwrap();
        assert!(summary.contains("Test #7"));
        assert!(summary.contains("Upload:\n"));
        assert!(summary.contains("Speed      :   2.00 Kbits"));
        assert!(summary.contains("Speed      :   4.00 Kbits"));
    }
}
