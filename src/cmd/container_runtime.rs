use crate::cmd::command::{CommandError, CommandKiller, WorkshopCommand, does_binary_exist};
use std::process::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum ContainerRuntimeError {
    #[error("No container runtime found, install podman or docker.")]
    NotFound,

    #[error("Container runtime terminated with an unknown error: {0}")]
    ExecutionError(#[from] std::io::Error),

    #[error("Container runtime terminated with a non success exit status code: {0}")]
    ExitStatusError(ExitStatus),

    #[error("Container runtime command terminated due to timeout: {0}")]
    Timeout(String),

    #[error("Image {0} not found locally.")]
    ImageNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
pub enum ContainerRuntimeKind {
    #[strum(serialize = "podman")]
    Podman,
    #[strum(serialize = "docker")]
    Docker,
}

/// Image builder/pusher, podman first and docker as fallback.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    kind: ContainerRuntimeKind,
}

impl ContainerRuntime {
    pub fn new(kind: ContainerRuntimeKind) -> Self {
        ContainerRuntime { kind }
    }

    pub fn detect() -> Result<Self, ContainerRuntimeError> {
        [ContainerRuntimeKind::Podman, ContainerRuntimeKind::Docker]
            .into_iter()
            .find(|kind| does_binary_exist(kind.as_ref()))
            .map(ContainerRuntime::new)
            .ok_or(ContainerRuntimeError::NotFound)
    }

    pub fn kind(&self) -> ContainerRuntimeKind {
        self.kind
    }

    pub fn login(&self, registry: &str, username: &str, password: &str) -> Result<(), ContainerRuntimeError> {
        info!("{} login {} as user {}", self.kind, registry, username);

        runtime_exec(
            self.kind,
            &["login", registry, "-u", username, "-p", password],
            &[password],
            &mut |line| info!("{}", line),
            &mut |line| warn!("{}", line),
            &CommandKiller::never(),
        )
    }

    pub fn does_image_exist_locally(&self, image: &str) -> Result<bool, ContainerRuntimeError> {
        info!("{} check locally image exist {}", self.kind, image);

        let ret = runtime_exec(
            self.kind,
            &["image", "inspect", image],
            &[],
            &mut |_| {},
            &mut |line| debug!("{}", line),
            &CommandKiller::never(),
        );

        match ret {
            Ok(_) => Ok(true),
            Err(ContainerRuntimeError::ExitStatusError(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn push<Stdout, Stderr>(
        &self,
        image: &str,
        stdout_output: &mut Stdout,
        stderr_output: &mut Stderr,
        should_abort: &CommandKiller,
    ) -> Result<(), ContainerRuntimeError>
    where
        Stdout: FnMut(String),
        Stderr: FnMut(String),
    {
        info!("{} push {}", self.kind, image);
        runtime_exec(self.kind, &["push", image], &[], stdout_output, stderr_output, should_abort)
    }
}

fn runtime_exec<F, X>(
    kind: ContainerRuntimeKind,
    args: &[&str],
    secrets: &[&str],
    stdout_output: &mut F,
    stderr_output: &mut X,
    cmd_killer: &CommandKiller,
) -> Result<(), ContainerRuntimeError>
where
    F: FnMut(String),
    X: FnMut(String),
{
    let mut cmd = WorkshopCommand::new(kind.as_ref(), args, &[]).with_secrets(secrets);
    let ret = cmd.exec_with_abort(stdout_output, stderr_output, cmd_killer);

    match ret {
        Ok(_) => Ok(()),
        Err(CommandError::TimeoutError(msg)) => Err(ContainerRuntimeError::Timeout(msg)),
        Err(CommandError::ExitStatusError(err)) => Err(ContainerRuntimeError::ExitStatusError(err)),
        Err(CommandError::ExecutionError(err)) => Err(ContainerRuntimeError::ExecutionError(err)),
    }
}

// needs a local podman or docker to run
#[cfg(feature = "test-live-cluster")]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_does_not_exist_locally() {
        let runtime = ContainerRuntime::detect().expect("a container runtime is installed");

        let ret = runtime.does_image_exist_locally("localhost/workshop/does-not-exist:never");

        assert!(matches!(ret, Ok(false)));
    }
}
