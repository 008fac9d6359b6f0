extern crate derivative;

use crate::cmd::ansible::AnsibleError;
use crate::cmd::container_runtime::ContainerRuntimeError;
use crate::cmd::oc::OcError;
use crate::io_models::details::DetailsError;
use crate::io_models::env_file::EnvFileError;
use crate::io_models::workshop::WorkshopConfigError;
use crate::models::aap::EnsureError;
use crate::services::aap::AapServiceError;
use derivative::Derivative;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// ErrorMessageVerbosity: represents command error message's verbosity from minimal to full verbosity.
pub enum ErrorMessageVerbosity {
    SafeOnly,
    FullDetailsWithoutEnvVars,
    FullDetails,
}

/// CommandError: error reported to the user, mostly coming from third party tools.
#[derive(Derivative, Clone, Error, PartialEq)]
#[derivative(Debug)]
pub struct CommandError {
    /// full_details: full error message, can contain unsafe text such as passwords and tokens.
    full_details: Option<String>,
    /// message_safe: error message omitting any protected data such as passwords and tokens.
    message_safe: String,
    /// env_vars: environment variables the failing process ran with, including credentials.
    /// Never printed by Debug.
    #[derivative(Debug = "ignore")]
    env_vars: Option<Vec<(String, String)>>,
}

impl CommandError {
    /// Returns CommandError message_raw. May contain unsafe text such as passwords and tokens.
    pub fn message_raw(&self) -> Option<String> {
        self.full_details.clone()
    }

    /// Returns CommandError message_safe omitting all unsafe text such as passwords and tokens.
    pub fn message_safe(&self) -> String {
        self.message_safe.to_string()
    }

    pub fn env_vars(&self) -> Option<Vec<(String, String)>> {
        self.env_vars.clone()
    }

    /// Returns error message based on verbosity.
    pub fn message(&self, message_verbosity: ErrorMessageVerbosity) -> String {
        match message_verbosity {
            ErrorMessageVerbosity::SafeOnly => self.message_safe.to_string(),
            ErrorMessageVerbosity::FullDetailsWithoutEnvVars => match &self.full_details {
                None => self.message(ErrorMessageVerbosity::SafeOnly),
                Some(full_details) => format!("{} / Full details: {}", self.message_safe, full_details),
            },
            ErrorMessageVerbosity::FullDetails => match (&self.full_details, &self.env_vars) {
                (None, _) => self.message(ErrorMessageVerbosity::SafeOnly),
                (Some(_), None) => self.message(ErrorMessageVerbosity::FullDetailsWithoutEnvVars),
                (Some(full_details), Some(env_vars)) => format!(
                    "{} / Full details: {} / Env vars: {}",
                    self.message_safe,
                    full_details,
                    env_vars
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<String>>()
                        .join(" "),
                ),
            },
        }
    }

    /// Creates a new CommandError from safe message. To be used when message is safe.
    pub fn new_from_safe_message(message: String) -> Self {
        CommandError::new(message, None, None)
    }

    /// Creates a new CommandError having both a safe, an unsafe message and env vars.
    pub fn new(message_safe: String, message_raw: Option<String>, env_vars: Option<Vec<(String, String)>>) -> Self {
        CommandError {
            full_details: message_raw,
            message_safe,
            env_vars,
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message(ErrorMessageVerbosity::SafeOnly).as_str())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        CommandError::new("IO error".to_string(), Some(err.to_string()), None)
    }
}

/// Error of a workshop stage.
#[derive(Error, Debug)]
pub enum WorkshopError {
    #[error("Missing prerequisite: `{binary}` was not found, please install it.")]
    MissingPrerequisite { binary: String },

    #[error("Details file error: {0}")]
    Details(#[from] DetailsError),

    #[error("Environment file error: {0}")]
    EnvFile(#[from] EnvFileError),

    #[error("Workshop definition error: {0}")]
    Config(#[from] WorkshopConfigError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] OcError),

    #[error("Ansible error: {0}")]
    Ansible(#[from] AnsibleError),

    #[error("Container runtime error: {0}")]
    ContainerRuntime(#[from] ContainerRuntimeError),

    #[error("Automation Controller error: {0}")]
    Aap(#[from] AapServiceError),

    #[error("Automation Controller resource error: {0}")]
    Ensure(#[from] EnsureError),

    #[error("{0}")]
    Command(#[from] CommandError),
}

impl WorkshopError {
    /// A non fatal error is reported and the stage goes on with the next resource.
    pub fn is_fatal(&self) -> bool {
        match self {
            WorkshopError::Ensure(err) => err.kind().is_required(),
            _ => true,
        }
    }

    /// Message safe to print: command errors and controller responses keep their raw details apart.
    pub fn to_command_error(&self) -> CommandError {
        match self {
            WorkshopError::Command(err) => err.clone(),
            WorkshopError::Aap(AapServiceError::HttpStatus { url, status, body }) => CommandError::new(
                format!("Automation Controller error: `{url}` answered with HTTP status {status}"),
                Some(body.to_string()),
                None,
            ),
            WorkshopError::Cluster(OcError::CmdError {
                command,
                raw_error_message,
            }) => CommandError::new(
                format!("Cluster error: command `{command}` failed"),
                Some(raw_error_message.to_string()),
                None,
            ),
            other => CommandError::new_from_safe_message(other.to_string()),
        }
    }
}
