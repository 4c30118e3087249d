//! Timed shell-command execution, shared by bootstrap/lint/doctor/fast-test
//! invocations in the worker loop.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs a shell command with a wall-clock timeout. Abstracted behind a
/// trait so the worker loop's retry logic can be exercised against a
/// scripted runner in tests without spawning real processes.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, command: &str, timeout: Duration) -> CommandOutcome;
}

/// Shells out via `sh -c`, polling for completion so a hung command is
/// killed after `timeout` rather than blocking the worker loop forever
///.
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, cwd: &Path, command: &str, timeout: Duration) -> CommandOutcome {
        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CommandOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn '{command}': {e}"),
                    timed_out: false,
                };
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf);
            }
            let _ = stdout_tx.send(buf);
        });
        thread::spawn(move || {
            let mut buf = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buf);
            }
            let _ = stderr_tx.send(buf);
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        break None;
                    }
                    thread::sleep(Duration::from_millis(25));
                }
                Err(_) => break None,
            }
        };

        let stdout = stdout_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();
        let stderr = stderr_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();

        CommandOutcome {
            exit_code: status.and_then(|s| s.code()),
            stdout,
            stderr,
            timed_out: status.is_none(),
        }
    }
}

/// A scripted `CommandRunner` for tests: returns queued outcomes in order.
pub struct ScriptedCommandRunner {
    outcomes: std::sync::Mutex<std::collections::VecDeque<CommandOutcome>>,
}

impl ScriptedCommandRunner {
    #[must_use]
    pub fn new(outcomes: Vec<CommandOutcome>) -> Self {
        Self { outcomes: std::sync::Mutex::new(outcomes.into()) }
    }

    #[must_use]
    pub fn ok() -> CommandOutcome {
        CommandOutcome { exit_code: Some(0), stdout: String::new(), stderr: String::new(), timed_out: false }
    }

    #[must_use]
    pub fn fail(stderr: impl Into<String>) -> CommandOutcome {
        CommandOutcome { exit_code: Some(1), stdout: String::new(), stderr: stderr.into(), timed_out: false }
    }
}

impl CommandRunner for ScriptedCommandRunner {
    fn run(&self, _cwd: &Path, _command: &str, _timeout: Duration) -> CommandOutcome {
        self.outcomes
            .lock()
            .expect("scripted command runner mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| CommandOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: "scripted command queue exhausted".to_owned(),
                timed_out: false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_requires_exit_zero_and_no_timeout() {
        assert!(ScriptedCommandRunner::ok().succeeded());
        assert!(!ScriptedCommandRunner::fail("boom").succeeded());
        let timed_out = CommandOutcome {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        };
        assert!(!timed_out.succeeded());
    }

    #[test]
    fn scripted_runner_returns_queued_outcomes_in_order() {
        let runner = ScriptedCommandRunner::new(vec![ScriptedCommandRunner::fail("x"), ScriptedCommandRunner::ok()]);
        let first = runner.run(Path::new("/tmp"), "true", Duration::from_secs(1));
        let second = runner.run(Path::new("/tmp"), "true", Duration::from_secs(1));
        assert!(!first.succeeded());
        assert!(second.succeeded());
    }

    #[test]
    fn real_process_runner_captures_exit_code_and_stdout() {
        let runner = ProcessCommandRunner;
        let outcome = runner.run(Path::new("."), "echo hello", Duration::from_secs(5));
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[test]
    fn real_process_runner_kills_on_timeout() {
        let runner = ProcessCommandRunner;
        let outcome = runner.run(Path::new("."), "sleep 5", Duration::from_millis(100));
        assert!(outcome.timed_out);
    }
}
