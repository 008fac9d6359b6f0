use std::path::{Path, PathBuf};

use crate::cmd::ansible::{AnsibleError, AnsiblePlaybook, ExtraVars};
use crate::constants::WORKSHOP_GUID;
use crate::errors::{CommandError, WorkshopError};
use crate::io_models::context::Context;
use crate::io_models::env_file::EnvFile;
use crate::logger::{Step, step_span};

fn resolve_playbook(context: &Context, playbook: &Path) -> PathBuf {
    match playbook.is_absolute() {
        true => playbook.to_path_buf(),
        false => context.workspace_root_dir().join(playbook),
    }
}

/// Runs `ansible-playbook` with every `.env` value exported to it.
pub fn run_playbook(
    context: &Context,
    env_file: &EnvFile,
    playbook: &Path,
    inventory: Option<&str>,
    extra_vars: &[String],
) -> Result<(), WorkshopError> {
    let guid = env_file.get(WORKSHOP_GUID).unwrap_or_default();
    let _span = step_span(guid, Step::RunPlaybook).entered();

    let playbook = resolve_playbook(context, playbook);
    let extra_vars = ExtraVars::parse(extra_vars)?;
    let envs = env_file.to_envs();

    let ret = AnsiblePlaybook::new(envs.clone()).run(
        &playbook,
        inventory,
        &extra_vars,
        &mut |line| info!("{}", line),
        &mut |line| warn!("{}", line),
    );

    match ret {
        Ok(()) => {
            info!("Playbook {} succeeded", playbook.display());
            Ok(())
        }
        Err(err @ AnsibleError::ExitStatusError { .. }) => Err(CommandError::new(
            format!("Playbook `{}` failed.", playbook.display()),
            Some(err.to_string()),
            Some(envs),
        )
        .into()),
        Err(err) => Err(err.into()),
    }
}
