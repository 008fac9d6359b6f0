use std::env;

use tracing_subscriber::EnvFilter;

const CI_VAR: &str = "CI";
const RUST_LOG_VAR: &str = "RUST_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum_macros::Display)]
pub enum LogLevel {
    #[strum(serialize = "debug")]
    Debug,
    #[strum(serialize = "info")]
    Info,
    #[strum(serialize = "warn")]
    Warning,
    #[strum(serialize = "error")]
    Error,
}

/// Stage a log line belongs to, attached to every span as the `step` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Step {
    Init,
    Login,
    SetupCluster,
    ConfigureAap,
    BuildEe,
    RunPlaybook,
    Validate,
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set,
/// output is json when asked or when running in CI.
pub fn init_logger(level: LogLevel, json: bool) {
    let filter = match env::var_os(RUST_LOG_VAR) {
        Some(_) => EnvFilter::try_from_env(RUST_LOG_VAR).unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        None => EnvFilter::new(level.to_string()),
    };

    let _ = match json || env::var_os(CI_VAR).is_some() {
        true => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .try_init(),
        false => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

pub fn step_span(guid: &str, step: Step) -> tracing::Span {
    tracing::span!(tracing::Level::INFO, "workshop", guid = guid, step = step.to_string().as_str())
}
