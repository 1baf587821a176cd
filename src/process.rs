use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{BenchError, Result};
use crate::probe::{IPERF_PORT, PROBE_TIMEOUT, check_server_alive};
use crate::run::RunConfig;

/// How long a terminated process gets to exit before it is killed.
#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_secs(2);
#[cfg(unix)]
const REAP_POLL: Duration = Duration::from_millis(50);

pub enum LineEvent {
    Line(String),
    /// Nothing arrived within the wait window.
    Pending,
    Exited,
}

/// A running measurement tool whose stdout is consumed line by line.
pub trait MeasurementProcess {
    fn next_line(&mut self, wait: Duration) -> io::Result<LineEvent>;
    /// Ask the process to stop (SIGTERM on unix).
    fn terminate(&mut self) -> io::Result<()>;
    fn kill(&mut self) -> io::Result<()>;
}

/// Probes targets and starts measurement processes.
pub trait Launcher {
    fn probe(&self, server: &str) -> Result<()>;
    fn launch(&self, conf: &RunConfig) -> Result<Box<dyn MeasurementProcess>>;
}

/// Shared cancellation flag, set from the ctrl-c handler.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Terminate, escalate to kill, and report both causes if neither worked.
pub fn stop_process(process: &mut dyn MeasurementProcess) -> Result<()> {
    let graceful = match process.terminate() {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    warn!("terminate failed ({graceful}), killing measurement process");
    match process.kill() {
        Ok(()) => Ok(()),
        Err(forced) => Err(BenchError::ProcessTermination { graceful, forced }),
    }
}

pub struct IperfLauncher {
    pub bin: String,
    pub port: u16,
}

impl IperfLauncher {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            port: IPERF_PORT,
        }
    }
}

impl Launcher for IperfLauncher {
    fn probe(&self, server: &str) -> Result<()> {
        check_server_alive(server, self.port, PROBE_TIMEOUT)
    }

    fn launch(&self, conf: &RunConfig) -> Result<Box<dyn MeasurementProcess>> {
        let args = conf.iperf_args();
        let cmd = format!("{} {}", self.bin, args.join(" "));
        debug!("spawning {cmd}");
        let child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BenchError::Spawn { cmd, source })?;
        Ok(Box::new(IperfProcess::new(child)?))
    }
}

pub struct IperfProcess {
    child: Child,
    lines: Receiver<io::Result<String>>,
}

impl IperfProcess {
    fn new(mut child: Child) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("iperf stdout not captured"))?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });

        if let Some(stderr) = child.stderr.take() {
            thread::spawn(move || drain_stderr(stderr));
        }

        Ok(Self { child, lines: rx })
    }

    /// Reap the child, giving up once `grace` has passed.
    #[cfg(unix)]
    fn wait_with_deadline(&mut self, grace: Duration) -> io::Result<()> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("iperf exited with {status}");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("still running {}ms after SIGTERM", grace.as_millis()),
                ));
            }
            thread::sleep(REAP_POLL);
        }
    }
}

fn drain_stderr(stderr: impl Read) {
    for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
        debug!("[iperf] {line}");
    }
}

impl MeasurementProcess for IperfProcess {
    fn next_line(&mut self, wait: Duration) -> io::Result<LineEvent> {
        match self.lines.recv_timeout(wait) {
            Ok(line) => line.map(LineEvent::Line),
            Err(RecvTimeoutError::Timeout) => Ok(LineEvent::Pending),
            Err(RecvTimeoutError::Disconnected) => {
                let status = self.child.wait()?;
                debug!("iperf exited with {status}");
                Ok(LineEvent::Exited)
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let rc = unsafe { libc::kill(self.child.id() as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        self.wait_with_deadline(TERM_GRACE)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()?;
        self.child.wait().map(|_| ())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()?;
        self.child.wait().map(|_| ())
    }
}
