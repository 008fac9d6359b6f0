use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use crate::cmd::command::{CommandError, CommandKiller, WorkshopCommand};
use crate::cmd::container_runtime::ContainerRuntimeKind;

const ANSIBLE_PLAYBOOK: &str = "ansible-playbook";
const ANSIBLE_BUILDER: &str = "ansible-builder";
const BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const PLAYBOOK_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(thiserror::Error, Debug)]
pub enum AnsibleError {
    #[error("Invalid {binary} configuration: {raw_error_message}")]
    InvalidConfig {
        binary: &'static str,
        raw_error_message: String,
    },

    #[error("{binary} terminated with an unknown error: {source}")]
    ExecutionError {
        binary: &'static str,
        source: std::io::Error,
    },

    #[error("{binary} terminated with a non success exit status code: {status}")]
    ExitStatusError {
        binary: &'static str,
        status: ExitStatus,
    },

    #[error("{binary} command terminated due to timeout: {raw_error_message}")]
    Timeout {
        binary: &'static str,
        raw_error_message: String,
    },
}

/// Extra variables handed to `ansible-playbook -e`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraVars(Vec<(String, String)>);

impl ExtraVars {
    pub fn new(vars: Vec<(String, String)>) -> Self {
        ExtraVars(vars)
    }

    /// Parses `key=value` arguments, the value may itself contain `=`.
    pub fn parse(raw: &[String]) -> Result<Self, AnsibleError> {
        raw.iter()
            .map(|kv| match kv.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
                _ => Err(AnsibleError::InvalidConfig {
                    binary: ANSIBLE_PLAYBOOK,
                    raw_error_message: format!("extra var `{kv}` is not in the key=value form"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ExtraVars)
    }

    fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(k, v)| ["-e".to_string(), format!("{k}={v}")])
            .collect()
    }
}

pub struct AnsiblePlaybook {
    envs: Vec<(String, String)>,
}

impl AnsiblePlaybook {
    /// `envs` are exported to the playbook process, typically the values of the `.env` file.
    pub fn new(envs: Vec<(String, String)>) -> Self {
        AnsiblePlaybook { envs }
    }

    pub fn run<Stdout, Stderr>(
        &self,
        playbook: &Path,
        inventory: Option<&str>,
        extra_vars: &ExtraVars,
        stdout_output: &mut Stdout,
        stderr_output: &mut Stderr,
    ) -> Result<(), AnsibleError>
    where
        Stdout: FnMut(String),
        Stderr: FnMut(String),
    {
        if !playbook.is_file() {
            return Err(AnsibleError::InvalidConfig {
                binary: ANSIBLE_PLAYBOOK,
                raw_error_message: format!("playbook `{}` is not a valid file", playbook.display()),
            });
        }

        let mut args = vec![];
        if let Some(inventory) = inventory {
            args.push("-i".to_string());
            args.push(inventory.to_string());
        }
        args.extend(extra_vars.to_args());
        args.push(playbook.to_str().unwrap_or_default().to_string());

        info!("Running playbook {}", playbook.display());
        let secrets = self.secret_values();
        ansible_exec(
            ANSIBLE_PLAYBOOK,
            &args.iter().map(|a| a.as_str()).collect::<Vec<&str>>(),
            &self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect::<Vec<_>>(),
            &secrets.iter().map(|s| s.as_str()).collect::<Vec<&str>>(),
            None,
            stdout_output,
            stderr_output,
            &CommandKiller::from_timeout(PLAYBOOK_TIMEOUT),
        )
    }

    fn secret_values(&self) -> Vec<String> {
        self.envs
            .iter()
            .filter(|(k, _)| k.ends_with("_PASSWORD") || k.ends_with("_TOKEN"))
            .map(|(_, v)| v.to_string())
            .collect()
    }
}

pub struct AnsibleBuilder {
    runtime: ContainerRuntimeKind,
}

impl AnsibleBuilder {
    pub fn new(runtime: ContainerRuntimeKind) -> Self {
        AnsibleBuilder { runtime }
    }

    pub fn build<Stdout, Stderr>(
        &self,
        definition: &Path,
        context_dir: &Path,
        tag: &str,
        stdout_output: &mut Stdout,
        stderr_output: &mut Stderr,
    ) -> Result<(), AnsibleError>
    where
        Stdout: FnMut(String),
        Stderr: FnMut(String),
    {
        if !definition.is_file() {
            return Err(AnsibleError::InvalidConfig {
                binary: ANSIBLE_BUILDER,
                raw_error_message: format!(
                    "execution environment definition `{}` is not a valid file",
                    definition.display()
                ),
            });
        }

        info!("Building execution environment {} with {}", tag, self.runtime);
        let args = [
            "build",
            "-f",
            definition.to_str().unwrap_or_default(),
            "-t",
            tag,
            "-c",
            context_dir.to_str().unwrap_or_default(),
            "--container-runtime",
            self.runtime.as_ref(),
            "-v",
            "2",
        ];

        let working_dir = definition.parent();
        ansible_exec(
            ANSIBLE_BUILDER,
            &args,
            &[],
            &[],
            working_dir,
            stdout_output,
            stderr_output,
            &CommandKiller::from_timeout(BUILD_TIMEOUT),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn ansible_exec<F, X>(
    binary: &'static str,
    args: &[&str],
    envs: &[(&str, &str)],
    secrets: &[&str],
    working_dir: Option<&Path>,
    stdout_output: &mut F,
    stderr_output: &mut X,
    cmd_killer: &CommandKiller,
) -> Result<(), AnsibleError>
where
    F: FnMut(String),
    X: FnMut(String),
{
    let mut cmd = WorkshopCommand::new(binary, args, envs).with_secrets(secrets);
    if let Some(working_dir) = working_dir {
        cmd.set_current_dir(working_dir);
    }

    match cmd.exec_with_abort(stdout_output, stderr_output, cmd_killer) {
        Ok(_) => Ok(()),
        Err(CommandError::TimeoutError(msg)) => Err(AnsibleError::Timeout {
            binary,
            raw_error_message: msg,
        }),
        Err(CommandError::ExitStatusError(status)) => Err(AnsibleError::ExitStatusError { binary, status }),
        Err(CommandError::ExecutionError(source)) => Err(AnsibleError::ExecutionError { binary, source }),
    }
}
