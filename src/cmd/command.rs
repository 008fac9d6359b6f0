use std::ffi::OsStr;
use std::io::{BufRead, BufReader};
use std::io::{Error, ErrorKind};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::cmd::command::CommandError::{ExecutionError, ExitStatusError, TimeoutError};

use itertools::Itertools;
use std::time::{Duration, Instant};
use timeout_readwrite::TimeoutReader;

const MASK: &str = "xxx";

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("Error while executing command")]
    ExecutionError(#[from] Error),

    #[error("Command terminated with a non success exit status code: {0}")]
    ExitStatusError(ExitStatus),

    #[error("Command killed due to timeout: {0}")]
    TimeoutError(String),

}

#[derive(Debug, Clone)]
pub enum AbortReason {
    Timeout(Duration),
}

pub struct CommandKiller<'a> {
    should_abort: Box<dyn Fn() -> Option<AbortReason> + 'a>,
}

impl<'a> CommandKiller<'a> {
    pub fn never() -> CommandKiller<'a> {
        CommandKiller {
            should_abort: Box::new(|| None),
        }
    }

    pub fn from_timeout(timeout: Duration) -> CommandKiller<'a> {
        let now = Instant::now();
        CommandKiller {
            should_abort: Box::new(move || {
                if now.elapsed() >= timeout {
                    return Some(AbortReason::Timeout(timeout));
                }

                None
            }),
        }
    }

    pub fn should_abort(&self) -> Option<AbortReason> {
        (self.should_abort)()
    }
}

/// Wrapper around `std::process::Command` streaming stdout/stderr line by line.
/// Values registered as secrets are masked whenever the command line is logged.
pub struct WorkshopCommand {
    command: Command,
    secrets: Vec<String>,
}

impl WorkshopCommand {
    pub fn new<P: AsRef<Path>>(binary: P, args: &[&str], envs: &[(&str, &str)]) -> WorkshopCommand {
        let mut command = Command::new(binary.as_ref().as_os_str());
        command.args(args);

        envs.iter().for_each(|(k, v)| {
            command.env(k, v);
        });

        WorkshopCommand {
            command,
            secrets: vec![],
        }
    }

    pub fn with_secrets(mut self, secrets: &[&str]) -> WorkshopCommand {
        self.secrets
            .extend(secrets.iter().filter(|s| !s.is_empty()).map(|s| s.to_string()));
        self
    }

    pub fn set_current_dir<P: AsRef<Path>>(&mut self, root_dir: P) {
        self.command.current_dir(root_dir);
    }

    /// Command line as it can be safely printed: program and args, secrets masked, no env vars.
    pub fn safe_command_line(&self) -> String {
        let line = std::iter::once(self.command.get_program())
            .chain(self.command.get_args())
            .map(|part| part.to_string_lossy().to_string())
            .join(" ");

        mask_secrets(&line, &self.secrets)
    }

    fn kill(cmd_handle: &mut Child) {
        let _ = cmd_handle
            .kill() //Fire
            .map(|_| cmd_handle.wait())
            .map_err(|err| error!("Cannot kill process {:?} {}", cmd_handle.id(), err));
    }

    pub fn exec_with_abort<STDOUT, STDERR>(
        &mut self,
        stdout_output: &mut STDOUT,
        stderr_output: &mut STDERR,
        abort_notifier: &CommandKiller,
    ) -> Result<(), CommandError>
    where
        STDOUT: FnMut(String),
        STDERR: FnMut(String),
    {
        let command_line = self.safe_command_line();
        info!("command: {}", command_line);
        let mut cmd_handle = self
            .command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExecutionError)?;

        // Read stdout/stderr until timeout is reached
        let reader_timeout = Duration::from_secs(1);
        let stdout = cmd_handle
            .stdout
            .take()
            .ok_or_else(|| ExecutionError(Error::new(ErrorKind::BrokenPipe, "Cannot get stdout for command")))?;
        let mut stdout_reader = BufReader::new(TimeoutReader::new(stdout, reader_timeout)).lines();

        let stderr = cmd_handle
            .stderr
            .take()
            .ok_or_else(|| ExecutionError(Error::new(ErrorKind::BrokenPipe, "Cannot get stderr for command")))?;
        let mut stderr_reader = BufReader::new(TimeoutReader::new(
            stderr,
            Duration::from_secs(0), // don't block on stderr
        ))
        .lines();

        let mut stdout_closed = false;
        let mut stderr_closed = false;
        while !stdout_closed || !stderr_closed {
            if abort_notifier.should_abort().is_some() {
                break;
            }

            while !stdout_closed {
                let line = match stdout_reader.next() {
                    Some(line) => line,
                    None => {
                        stdout_closed = true;
                        break;
                    }
                };

                match line {
                    Err(ref err) if err.kind() == ErrorKind::TimedOut => break,
                    Ok(line) => stdout_output(line),
                    Err(err) => {
                        error!("Error on stdout of cmd {}: {:?}", command_line, err);
                        stdout_closed = true;
                        break;
                    }
                }

                if abort_notifier.should_abort().is_some() {
                    stdout_closed = true;
                    stderr_closed = true;
                    break;
                }
            }

            while !stderr_closed {
                let line = match stderr_reader.next() {
                    Some(line) => line,
                    None => {
                        stderr_closed = true;
                        break;
                    }
                };

                match line {
                    Err(ref err) if err.kind() == ErrorKind::TimedOut => break,
                    Ok(line) => stderr_output(line),
                    Err(err) => {
                        error!("Error on stderr of cmd {}: {:?}", command_line, err);
                        stderr_closed = true;
                        break;
                    }
                }

                if abort_notifier.should_abort().is_some() {
                    stdout_closed = true;
                    stderr_closed = true;
                    break;
                }
            }
        }

        // Wait for the process to exit before reaching the timeout
        // If not, we just kill it
        let exit_status;
        loop {
            match cmd_handle.try_wait() {
                Ok(Some(status)) => {
                    exit_status = status;
                    break;
                }
                Ok(None) => match abort_notifier.should_abort() {
                    None => {}
                    Some(AbortReason::Timeout(timeout)) => {
                        let msg = format!(
                            "Killing process {} due to timeout {}s reached",
                            command_line,
                            timeout.as_secs()
                        );
                        warn!("{}", msg);
                        Self::kill(&mut cmd_handle);
                        return Err(TimeoutError(msg));
                    }
                },
                Err(err) => return Err(ExecutionError(err)),
            };

            std::thread::sleep(Duration::from_millis(100));
        }

        if !exit_status.success() {
            debug!(
                "command: {} terminated with error exit status {:?}",
                command_line, exit_status
            );
            return Err(ExitStatusError(exit_status));
        }

        Ok(())
    }
}

/// Captured output of a command run to completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn stdout_joined(&self, separator: &str) -> String {
        self.stdout.join(separator)
    }

    pub fn stderr_joined(&self) -> String {
        self.stderr.join("\n")
    }
}

/// Runs a command and keeps its output, returning it alongside the execution result so callers
/// can inspect stdout/stderr even when the exit status is not a success.
pub fn exec_and_capture(
    command: &mut WorkshopCommand,
    abort_notifier: &CommandKiller,
) -> (CommandOutput, Result<(), CommandError>) {
    let mut output = CommandOutput::default();
    let mut stdout = vec![];
    let mut stderr = vec![];
    let result = command.exec_with_abort(
        &mut |line| stdout.push(line),
        &mut |line| {
            debug!("stderr: {}", line);
            stderr.push(line)
        },
        abort_notifier,
    );
    output.stdout = stdout;
    output.stderr = stderr;

    (output, result)
}

pub fn does_binary_exist<S>(binary: S) -> bool
where
    S: AsRef<OsStr>,
{
    Command::new(binary)
        .stdout(Stdio::null())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|mut child| child.wait())
        .is_ok()
}

pub fn mask_secrets(text: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
}
