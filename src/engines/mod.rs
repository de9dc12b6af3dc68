//! Speech engines backed by external programs.
//!
//! # Available Engines
//!
//! - [`espeak::EspeakSynthesizer`] - text-to-speech through `espeak-ng`
//! - [`command::CommandRecognizer`] - speech-to-text through any program that
//!   prints a verbose JSON transcript
//!
//! Both shell out and need their program on `PATH` (or an explicit path).

pub mod command;
pub mod espeak;

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pipeline::CancelToken;

/// Longest stderr excerpt kept in an error message.
const STDERR_EXCERPT_CHARS: usize = 600;
/// How often a running program is checked for exit, timeout and cancel.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Default limit for one engine call.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("{0} not found. Install it or configure the full path to the program.")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} exited with code {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{program} timed out after {after:?} and was killed")]
    TimedOut { program: String, after: Duration },
    #[error("{0} was killed because the narration was cancelled")]
    Cancelled(String),
}

/// Bounds on one external program run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunLimits<'a> {
    pub timeout: Option<Duration>,
    pub cancel: &'a CancelToken,
}

/// Run `program` to completion, optionally feeding `stdin`, and return its
/// stdout.
///
/// The program is killed when `limits.timeout` elapses or `limits.cancel`
/// fires.
pub(crate) fn run<I, S>(
    program: &Path,
    args: I,
    stdin: Option<&[u8]>,
    limits: RunLimits<'_>,
) -> Result<Vec<u8>, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound(name.clone())
            } else {
                ProcessError::Io(e)
            }
        })?;

    // Pipes are serviced on their own threads so the loop below can poll.
    let feeder = match (child.stdin.take(), stdin) {
        (Some(mut pipe), Some(input)) => {
            let input = input.to_vec();
            Some(thread::spawn(move || pipe.write_all(&input)))
        }
        _ => None,
    };
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if limits.cancel.is_cancelled() {
            kill(&mut child);
            return Err(ProcessError::Cancelled(name));
        }
        if let Some(after) = limits.timeout {
            if started.elapsed() >= after {
                kill(&mut child);
                return Err(ProcessError::TimedOut {
                    program: name,
                    after,
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join(stdout)?;
    let stderr = join(stderr)?;
    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(ProcessError::Failed {
            program: name,
            code: status.code(),
            stderr: stderr.trim().chars().take(STDERR_EXCERPT_CHARS).collect(),
        });
    }
    if let Some(feeder) = feeder {
        feeder
            .join()
            .map_err(|_| std::io::Error::other("stdin writer panicked"))??;
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>, ProcessError> {
    let bytes = handle
        .join()
        .map_err(|_| std::io::Error::other("output reader panicked"))??;
    Ok(bytes)
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill engine process {}: {e}", child.id());
    }
    // Reap it; the exit status of a killed process carries nothing useful.
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbounded(cancel: &CancelToken) -> RunLimits<'_> {
        RunLimits {
            timeout: None,
            cancel,
        }
    }

    #[test]
    fn missing_program_is_reported_by_name() {
        let cancel = CancelToken::new();
        let program = Path::new("definitely-not-an-installed-program");
        let err = run(program, ["x"], None, unbounded(&cancel)).unwrap_err();
        match err {
            ProcessError::NotFound(name) => {
                assert_eq!(name, "definitely-not-an-installed-program")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn stdout_and_failures_are_captured() {
        let cancel = CancelToken::new();
        let sh = Path::new("sh");
        let out = run(sh, ["-c", "cat"], Some(b"piped".as_slice()), unbounded(&cancel)).unwrap();
        assert_eq!(out, b"piped");

        let err = run(sh, ["-c", "echo boom >&2; exit 3"], None, unbounded(&cancel)).unwrap_err();
        match err {
            ProcessError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn hung_program_is_killed_at_the_timeout() {
        let cancel = CancelToken::new();
        let limits = RunLimits {
            timeout: Some(Duration::from_millis(200)),
            cancel: &cancel,
        };
        let started = Instant::now();
        let err = run(Path::new("sh"), ["-c", "sleep 5"], None, limits).unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn cancel_kills_a_running_program() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = run(Path::new("sh"), ["-c", "sleep 5"], None, unbounded(&cancel)).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, ProcessError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
