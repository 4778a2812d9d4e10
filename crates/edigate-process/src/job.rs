//! Job specification, spawning, and supervised wait.

use std::fmt;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use edigate_config::{ESCALATION_WINDOW, ProcessCapabilities};

use crate::JOB_TARGET;
use crate::errors::JobError;
use crate::termination::{FORCED_STAGE, GRACEFUL_STAGE, TerminationHandle};

#[cfg(unix)]
use std::os::fd::AsRawFd;

/// Poll interval for the supervised wait.
const WAIT_TICK: Duration = Duration::from_millis(5);

/// Description of one worker run.
#[derive(Debug, Clone)]
pub struct JobSpec {
    command: String,
    args: Vec<String>,
    escalation_window: Duration,
    capabilities: ProcessCapabilities,
}

impl JobSpec {
    /// Builds a specification for the given command with platform-detected
    /// capabilities and the default escalation window.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            escalation_window: ESCALATION_WINDOW,
            capabilities: ProcessCapabilities::detect(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Overrides the graceful-to-forced escalation window.
    #[must_use]
    pub fn escalation_window(mut self, window: Duration) -> Self {
        self.escalation_window = window;
        self
    }

    /// Overrides the platform capabilities.
    #[must_use]
    pub fn capabilities(mut self, capabilities: ProcessCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The worker command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The worker arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

/// Lifecycle state of a job. Transitions are strictly forward; a job never
/// re-enters `Running` after `Exited` or `Killed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Specified but not yet spawned.
    Created,
    /// Spawned; the supervised wait has not begun.
    Started,
    /// Under supervised wait.
    Running,
    /// A graceful stop has been delivered.
    TerminationRequested,
    /// Exited naturally with the given code.
    Exited(i32),
    /// Stopped by a termination signal.
    Killed,
}

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The worker exited with the given code.
    Exited(i32),
    /// The worker was stopped by a signal.
    Killed {
        /// Signal number, where the platform reports one.
        signal: i32,
    },
}

impl ExitOutcome {
    /// Whether the run ended with exit code zero.
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The exit code, when the worker exited naturally.
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Killed { .. } => None,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(formatter, "exit status {code}"),
            Self::Killed { signal } => write!(formatter, "killed by signal {signal}"),
        }
    }
}

/// One spawned worker under supervision.
///
/// A job owns its child process exclusively for its lifetime; the only
/// cross-thread influence is the cloneable [`TerminationHandle`].
#[derive(Debug)]
pub struct Job {
    spec: JobSpec,
    child: Child,
    state: JobState,
    termination: TerminationHandle,
}

impl Job {
    /// Spawns the worker described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Spawn`] when the executable cannot be launched.
    pub fn spawn(spec: JobSpec) -> Result<Self, JobError> {
        Self::spawn_inner(spec, None)
    }

    /// Spawns the worker with `stream` presented at the fixed descriptor
    /// slot, per the inheritance contract.
    ///
    /// The caller keeps its own copy of the stream; ownership of the
    /// connection logically transfers to the worker once it executes.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Spawn`] when the executable cannot be launched
    /// or the descriptor cannot be presented.
    #[cfg(unix)]
    pub fn spawn_with_stream(spec: JobSpec, stream: &impl AsRawFd) -> Result<Self, JobError> {
        Self::spawn_inner(spec, Some(stream.as_raw_fd()))
    }

    fn spawn_inner(spec: JobSpec, inherited: Option<i32>) -> Result<Self, JobError> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            if spec.capabilities.group_signaling() {
                command.process_group(0);
            }
            if let Some(fd) = inherited {
                let slot = crate::inherit::INHERITED_STREAM_SLOT;
                // SAFETY: the hook runs after fork and only calls dup2,
                // which is async-signal-safe. dup2 clears close-on-exec on
                // the duplicate, so the connection survives the exec at the
                // agreed slot.
                unsafe {
                    command.pre_exec(move || {
                        if libc::dup2(fd, slot) == -1 {
                            return Err(std::io::Error::last_os_error());
                        }
                        Ok(())
                    });
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = inherited;
        }

        let child = command.spawn().map_err(|source| JobError::Spawn {
            command: spec.command.clone(),
            source,
        })?;
        debug!(
            target: JOB_TARGET,
            command = %spec.command,
            pid = child.id(),
            "worker spawned"
        );
        Ok(Self {
            spec,
            child,
            state: JobState::Started,
            termination: TerminationHandle::new(),
        })
    }

    /// The worker's OS process ID.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// A cancellation token for this job, callable from any thread.
    #[must_use]
    pub fn termination_handle(&self) -> TerminationHandle {
        self.termination.clone()
    }

    /// Requests termination of this job (first request graceful, second
    /// forced; idempotent beyond that).
    pub fn request_termination(&self) {
        self.termination.request_termination();
    }

    /// Blocks until the worker terminates, honouring termination requests.
    ///
    /// A first termination request delivers the graceful stop signal; the
    /// forced kill follows exactly once, either when the escalation window
    /// elapses without an exit or when a second request arrives.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Wait`] when polling the child fails, or a signal
    /// delivery error for a process that still exists but cannot be
    /// signalled.
    pub fn await_exit(&mut self) -> Result<ExitOutcome, JobError> {
        if self.state == JobState::Started {
            self.state = JobState::Running;
        }
        let mut graceful_sent_at: Option<Instant> = None;
        let mut forced_sent = false;
        loop {
            if let Some(status) = self.child.try_wait().map_err(|source| JobError::Wait {
                command: self.spec.command.clone(),
                source,
            })? {
                let outcome = outcome_from_status(status);
                self.state = match outcome {
                    ExitOutcome::Exited(code) => JobState::Exited(code),
                    ExitOutcome::Killed { .. } => JobState::Killed,
                };
                debug!(
                    target: JOB_TARGET,
                    command = %self.spec.command,
                    outcome = %outcome,
                    "worker finished"
                );
                return Ok(outcome);
            }

            let stage = self.termination.stage();
            if stage >= GRACEFUL_STAGE && graceful_sent_at.is_none() {
                self.state = JobState::TerminationRequested;
                debug!(
                    target: JOB_TARGET,
                    command = %self.spec.command,
                    pid = self.pid(),
                    "delivering graceful stop"
                );
                self.send_graceful()?;
                graceful_sent_at = Some(Instant::now());
            }
            if !forced_sent
                && let Some(sent_at) = graceful_sent_at
                && (stage >= FORCED_STAGE || sent_at.elapsed() >= self.spec.escalation_window)
            {
                debug!(
                    target: JOB_TARGET,
                    command = %self.spec.command,
                    pid = self.pid(),
                    "escalating to forced kill"
                );
                self.send_forced()?;
                forced_sent = true;
            }
            thread::sleep(WAIT_TICK);
        }
    }

    #[cfg(unix)]
    fn send_graceful(&self) -> Result<(), JobError> {
        self.deliver_signal(nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(unix)]
    fn send_forced(&self) -> Result<(), JobError> {
        self.deliver_signal(nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(unix)]
    fn deliver_signal(&self, signal: nix::sys::signal::Signal) -> Result<(), JobError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(self.child.id().cast_signed());
        let delivered = if self.spec.capabilities.group_signaling() {
            killpg(pid, signal)
        } else {
            kill(pid, signal)
        };
        match delivered {
            // The worker exited between the poll and the signal; the next
            // poll observes the exit.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(JobError::Signal {
                pid: pid.as_raw(),
                source,
            }),
        }
    }

    #[cfg(not(unix))]
    fn send_graceful(&mut self) -> Result<(), JobError> {
        self.stop_child()
    }

    #[cfg(not(unix))]
    fn send_forced(&mut self) -> Result<(), JobError> {
        self.stop_child()
    }

    #[cfg(not(unix))]
    fn stop_child(&mut self) -> Result<(), JobError> {
        self.child.kill().map_err(|source| JobError::Stop {
            command: self.spec.command.clone(),
            source,
        })
    }
}

fn outcome_from_status(status: std::process::ExitStatus) -> ExitOutcome {
    if let Some(code) = status.code() {
        return ExitOutcome::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitOutcome::Killed {
            signal: status.signal().unwrap_or(0),
        }
    }
    #[cfg(not(unix))]
    {
        ExitOutcome::Killed { signal: 0 }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn runs_a_worker_to_natural_exit() {
        let mut job = Job::spawn(JobSpec::new("/bin/sh").args(["-c", "exit 0"])).unwrap();
        let outcome = job.await_exit().unwrap();
        assert!(outcome.success());
        assert_eq!(job.state(), JobState::Exited(0));
    }

    #[test]
    fn reports_nonzero_exit_codes() {
        let mut job = Job::spawn(JobSpec::new("/bin/sh").args(["-c", "exit 3"])).unwrap();
        let outcome = job.await_exit().unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(3));
        assert!(!outcome.success());
        assert_eq!(outcome.code(), Some(3));
    }

    #[test]
    fn spawn_failure_names_the_command() {
        let error = Job::spawn(JobSpec::new("/nonexistent/edigate-worker")).unwrap_err();
        match error {
            JobError::Spawn { command, .. } => {
                assert_eq!(command, "/nonexistent/edigate-worker");
            }
            other => panic!("expected Spawn, got: {other:?}"),
        }
    }

    #[test]
    fn graceful_stop_is_honoured_within_the_window() {
        let spec = JobSpec::new("/bin/sh")
            .args(["-c", "trap 'exit 7' TERM; while :; do sleep 0.01; done"])
            .escalation_window(Duration::from_secs(10));
        let mut job = Job::spawn(spec).unwrap();
        let handle = job.termination_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            handle.request_termination();
        });
        let outcome = job.await_exit().unwrap();
        assert_eq!(outcome, ExitOutcome::Exited(7));
    }

    #[test]
    fn escalates_to_forced_kill_when_the_worker_ignores_the_stop() {
        let spec = JobSpec::new("/bin/sh")
            .args(["-c", "trap '' TERM; while :; do sleep 0.01; done"])
            .escalation_window(Duration::from_millis(200));
        let mut job = Job::spawn(spec).unwrap();
        let handle = job.termination_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.request_termination();
            // Requests beyond the second stage are no-ops.
            handle.request_termination();
            handle.request_termination();
        });
        let started = Instant::now();
        let outcome = job.await_exit().unwrap();
        assert_eq!(
            outcome,
            ExitOutcome::Killed {
                signal: libc::SIGKILL
            }
        );
        assert_eq!(job.state(), JobState::Killed);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn second_request_forces_the_kill_before_the_window() {
        let spec = JobSpec::new("/bin/sh")
            .args(["-c", "trap '' TERM; while :; do sleep 0.01; done"])
            .escalation_window(Duration::from_secs(30));
        let mut job = Job::spawn(spec).unwrap();
        let handle = job.termination_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.request_termination();
            std::thread::sleep(Duration::from_millis(50));
            handle.request_termination();
        });
        let started = Instant::now();
        let outcome = job.await_exit().unwrap();
        assert!(matches!(outcome, ExitOutcome::Killed { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn inherited_stream_lands_at_the_fixed_slot() {
        use std::io::Read;
        use std::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut parent_end = TcpStream::connect(addr).unwrap();
        let (worker_end, _) = listener.accept().unwrap();

        let spec = JobSpec::new("/bin/sh").args(["-c", "printf claimed >&3"]);
        let mut job = Job::spawn_with_stream(spec, &worker_end).unwrap();
        let outcome = job.await_exit().unwrap();
        assert!(outcome.success());

        drop(worker_end);
        let mut greeting = String::new();
        parent_end.read_to_string(&mut greeting).unwrap();
        assert_eq!(greeting, "claimed");
    }
}
