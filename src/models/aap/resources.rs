use serde_json::{Value, json};

use crate::io_models::details::HostAddress;
use crate::models::aap::EnsureError;
use crate::io_models::workshop::{ExecutionEnvironmentConfig, JobTemplateConfig, ProjectConfig};
use crate::services::aap::ResourceKind;

/// What to look up and, when absent, what to create.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    /// Lookup filters besides `name`.
    pub filters: Vec<(String, String)>,
    pub payload: Value,
}

fn organization_filter(organization_id: u64) -> Vec<(String, String)> {
    vec![("organization".to_string(), organization_id.to_string())]
}

pub fn project_spec(name: &str, organization_id: u64, project: &ProjectConfig) -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::Project,
        name: name.to_string(),
        filters: organization_filter(organization_id),
        payload: json!({
            "name": name,
            "description": "Workshop playbooks",
            "organization": organization_id,
            "scm_type": "git",
            "scm_url": project.scm_url,
            "scm_branch": project.scm_branch,
            "scm_update_on_launch": false,
        }),
    }
}

pub fn inventory_spec(name: &str, organization_id: u64) -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::Inventory,
        name: name.to_string(),
        filters: organization_filter(organization_id),
        payload: json!({
            "name": name,
            "description": "Workshop targets",
            "organization": organization_id,
        }),
    }
}

/// Inventory host, the port goes to `ansible_port` when one is given.
pub fn host_spec(address: &HostAddress, inventory_id: u64) -> ResourceSpec {
    let variables = match address.port {
        Some(port) => format!("ansible_host: {}\nansible_port: {}\n", address.host, port),
        None => format!("ansible_host: {}\n", address.host),
    };

    ResourceSpec {
        kind: ResourceKind::Host,
        name: address.host.to_string(),
        filters: vec![("inventory".to_string(), inventory_id.to_string())],
        payload: json!({
            "name": address.host,
            "inventory": inventory_id,
            "enabled": true,
            "variables": variables,
        }),
    }
}

pub struct BearerTokenCredential<'a> {
    pub name: &'a str,
    pub organization_id: u64,
    pub credential_type_id: u64,
    pub api_url: &'a str,
    pub token: &'a str,
    pub verify_ssl: bool,
}

pub fn credential_spec(credential: &BearerTokenCredential) -> ResourceSpec {
    let mut filters = organization_filter(credential.organization_id);
    filters.push((
        "credential_type".to_string(),
        credential.credential_type_id.to_string(),
    ));

    ResourceSpec {
        kind: ResourceKind::Credential,
        name: credential.name.to_string(),
        filters,
        payload: json!({
            "name": credential.name,
            "description": "Workshop service account token",
            "organization": credential.organization_id,
            "credential_type": credential.credential_type_id,
            "inputs": {
                "host": credential.api_url,
                "bearer_token": credential.token,
                "verify_ssl": credential.verify_ssl,
            },
        }),
    }
}

pub fn execution_environment_spec(
    name: &str,
    organization_id: u64,
    execution_environment: &ExecutionEnvironmentConfig,
) -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::ExecutionEnvironment,
        name: name.to_string(),
        filters: organization_filter(organization_id),
        payload: json!({
            "name": name,
            "description": "Workshop execution environment",
            "organization": organization_id,
            "image": execution_environment.image,
            "pull": execution_environment.pull.as_ref(),
        }),
    }
}

pub struct JobTemplateRefs {
    pub project_id: u64,
    pub inventory_id: u64,
    pub execution_environment_id: Option<u64>,
}

pub fn job_template_spec(
    name: &str,
    refs: &JobTemplateRefs,
    template: &JobTemplateConfig,
) -> Result<ResourceSpec, EnsureError> {
    // the controller wants extra vars as a YAML or JSON document
    let extra_vars = match template.extra_vars.is_empty() {
        true => String::new(),
        false => serde_json::to_string(&template.extra_vars).map_err(|e| EnsureError::Dependency {
            kind: ResourceKind::JobTemplate,
            name: name.to_string(),
            raw_error_message: format!("extra vars cannot be sent as JSON: {e}"),
        })?,
    };

    let mut payload = json!({
        "name": name,
        "description": template.description,
        "job_type": "run",
        "project": refs.project_id,
        "inventory": refs.inventory_id,
        "playbook": template.playbook,
        "ask_variables_on_launch": template.ask_variables_on_launch,
        "extra_vars": extra_vars,
    });
    if let (Some(ee_id), Some(fields)) = (refs.execution_environment_id, payload.as_object_mut()) {
        fields.insert("execution_environment".to_string(), json!(ee_id));
    }

    Ok(ResourceSpec {
        kind: ResourceKind::JobTemplate,
        name: name.to_string(),
        filters: vec![],
        payload,
    })
}
