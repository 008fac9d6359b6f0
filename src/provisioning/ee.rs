use std::path::{Path, PathBuf};

use crate::cmd::ansible::AnsibleBuilder;
use crate::cmd::command::CommandKiller;
use crate::cmd::container_runtime::{ContainerRuntime, ContainerRuntimeError};
use crate::errors::{CommandError, WorkshopError};
use crate::io_models::context::Context;
use crate::io_models::workshop::EeBuildConfig;
use crate::logger::{Step, step_span};
use crate::template::{EmbeddedTemplate, render_templates, write_rendered_templates};

const EE_WORKSPACE_DIR: &str = "execution-environment";
const EE_DEFINITION_FILE: &str = "execution-environment.yml";
const EE_BUILD_CONTEXT_DIR: &str = "context";

const EE_TEMPLATES: [EmbeddedTemplate; 4] = [
    EmbeddedTemplate {
        file_name: "execution-environment.j2.yml",
        content: include_str!("../../templates/execution-environment/execution-environment.j2.yml"),
    },
    EmbeddedTemplate {
        file_name: "requirements.j2.yml",
        content: include_str!("../../templates/execution-environment/requirements.j2.yml"),
    },
    EmbeddedTemplate {
        file_name: "requirements.j2.txt",
        content: include_str!("../../templates/execution-environment/requirements.j2.txt"),
    },
    EmbeddedTemplate {
        file_name: "bindep.j2.txt",
        content: include_str!("../../templates/execution-environment/bindep.j2.txt"),
    },
];

/// Registry credentials, used to log in before pushing.
#[derive(Clone, PartialEq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Renders `execution-environment.yml` and its dependency files into `into`, returns the
/// definition path.
pub fn render_definition(build: &EeBuildConfig, guid: &str, into: &Path) -> Result<PathBuf, CommandError> {
    let mut context = tera::Context::new();
    context.insert("base_image", &build.base_image);
    context.insert("guid", guid);
    context.insert("collections", &build.collections);
    context.insert("python_requirements", &build.python_requirements);
    context.insert("system_requirements", &build.system_requirements);

    let rendered = render_templates(&EE_TEMPLATES, &context)?;
    write_rendered_templates(&rendered, into)?;

    Ok(into.join(EE_DEFINITION_FILE))
}

/// Registry part of an image reference, `None` for the default registry.
pub fn registry_of(image: &str) -> Option<&str> {
    let (first, _) = image.split_once('/')?;
    match first.contains('.') || first.contains(':') || first == "localhost" {
        true => Some(first),
        false => None,
    }
}

fn ee_definition(context: &Context, guid: &str, workspace: &Path) -> Result<PathBuf, WorkshopError> {
    let ee = &context.config().execution_environment;
    match &ee.definition {
        Some(definition) if definition.is_absolute() => Ok(definition.to_path_buf()),
        Some(definition) => Ok(context.workspace_root_dir().join(definition)),
        None => {
            let definition = render_definition(&ee.build, guid, workspace)?;
            info!("Execution environment definition rendered in {}", workspace.display());
            Ok(definition)
        }
    }
}

/// Builds the execution environment image and optionally pushes it. Returns the image tag.
pub fn build_ee(
    context: &Context,
    guid: &str,
    runtime: &ContainerRuntime,
    push: bool,
    registry_credentials: Option<&RegistryCredentials>,
) -> Result<String, WorkshopError> {
    let _span = step_span(guid, Step::BuildEe).entered();
    let build = &context.config().execution_environment.build;

    let workspace = context.workspace_directory(EE_WORKSPACE_DIR).map_err(CommandError::from)?;
    let definition = ee_definition(context, guid, &workspace)?;
    let build_context = workspace.join(EE_BUILD_CONTEXT_DIR);

    AnsibleBuilder::new(runtime.kind()).build(
        &definition,
        &build_context,
        &build.tag,
        &mut |line| info!("{}", line),
        &mut |line| warn!("{}", line),
    )?;
    info!("Execution environment image {} built", build.tag);

    if !push {
        return Ok(build.tag.to_string());
    }

    if !runtime.does_image_exist_locally(&build.tag)? {
        return Err(ContainerRuntimeError::ImageNotFound(build.tag.to_string()).into());
    }

    if let Some(credentials) = registry_credentials {
        match registry_of(&build.tag) {
            Some(registry) => runtime.login(registry, &credentials.username, &credentials.password)?,
            None => runtime.login("docker.io", &credentials.username, &credentials.password)?,
        }
    }
    runtime.push(
        &build.tag,
        &mut |line| info!("{}", line),
        &mut |line| warn!("{}", line),
        &CommandKiller::never(),
    )?;
    info!("Execution environment image {} pushed", build.tag);

    Ok(build.tag.to_string())
}
