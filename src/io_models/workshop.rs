use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_str::deserialize_duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_derive::Deserialize;

static DNS_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("dns label regex is valid"));
const MAX_NAMESPACE_LENGTH: usize = 63;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WorkshopConfigError {
    #[error("Cannot read workshop definition `{path}`: {raw_error_message}")]
    CannotRead { path: String, raw_error_message: String },
    #[error("Invalid workshop definition `{path}`: {raw_error_message}")]
    InvalidYaml { path: String, raw_error_message: String },
    #[error("Invalid value for `{field}`: {raw_error_message}")]
    InvalidValue { field: String, raw_error_message: String },
}

/// Workshop definition. Every field has a default, an empty file is a valid definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkshopConfig {
    pub organization: String,
    pub namespace_prefix: String,
    pub environments: Vec<String>,
    pub service_account: String,
    pub users: Vec<String>,
    pub project: ProjectConfig,
    pub inventory: InventoryConfig,
    pub credential: CredentialConfig,
    pub execution_environment: ExecutionEnvironmentConfig,
    pub job_templates: Vec<JobTemplateConfig>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub project_sync_timeout: Duration,
    pub verify_ssl: bool,
}

impl Default for WorkshopConfig {
    fn default() -> Self {
        WorkshopConfig {
            organization: "Default".to_string(),
            namespace_prefix: "workshop".to_string(),
            environments: vec!["dev".to_string(), "test".to_string(), "prod".to_string()],
            service_account: "aap-deployer".to_string(),
            users: vec![],
            project: ProjectConfig::default(),
            inventory: InventoryConfig::default(),
            credential: CredentialConfig::default(),
            execution_environment: ExecutionEnvironmentConfig::default(),
            job_templates: vec![JobTemplateConfig {
                name: "Hello World".to_string(),
                playbook: "hello_world.yml".to_string(),
                description: "Checks the controller can run a job".to_string(),
                ask_variables_on_launch: false,
                extra_vars: BTreeMap::new(),
            }],
            project_sync_timeout: Duration::from_secs(5 * 60),
            verify_ssl: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    pub scm_url: String,
    pub scm_branch: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        ProjectConfig {
            name: "Workshop Project".to_string(),
            scm_url: "https://github.com/ansible/ansible-tower-samples".to_string(),
            scm_branch: "".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryConfig {
    pub name: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        InventoryConfig {
            name: "Workshop Inventory".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialConfig {
    pub name: String,
    pub credential_type: String,
    /// Lifetime of the service account token stored in the credential, as accepted by `oc create token`.
    pub token_duration: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig {
            name: "OpenShift Deployer".to_string(),
            credential_type: "OpenShift or Kubernetes API Bearer Token".to_string(),
            token_duration: "24h".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum_macros::Display, strum_macros::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PullPolicy {
    Always,
    Missing,
    Never,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionEnvironmentConfig {
    pub name: String,
    /// Image registered in the controller.
    pub image: String,
    pub pull: PullPolicy,
    pub build: EeBuildConfig,
    /// Existing `execution-environment.yml`, used as is instead of the rendered one.
    pub definition: Option<PathBuf>,
}

impl Default for ExecutionEnvironmentConfig {
    fn default() -> Self {
        ExecutionEnvironmentConfig {
            name: "Workshop EE".to_string(),
            image: "quay.io/ansible/awx-ee:latest".to_string(),
            pull: PullPolicy::Missing,
            build: EeBuildConfig::default(),
            definition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EeBuildConfig {
    /// Tag of the built image, pushed as is.
    pub tag: String,
    pub base_image: String,
    pub collections: Vec<String>,
    pub python_requirements: Vec<String>,
    pub system_requirements: Vec<String>,
}

impl Default for EeBuildConfig {
    fn default() -> Self {
        EeBuildConfig {
            tag: "localhost/workshop-ee:latest".to_string(),
            base_image: "quay.io/ansible/awx-ee:latest".to_string(),
            collections: vec!["kubernetes.core".to_string(), "ibm.ibm_zos_core".to_string()],
            python_requirements: vec!["kubernetes".to_string()],
            system_requirements: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobTemplateConfig {
    pub name: String,
    pub playbook: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ask_variables_on_launch: bool,
    #[serde(default)]
    pub extra_vars: BTreeMap<String, serde_yaml::Value>,
}

impl WorkshopConfig {
    /// Reads the definition at `path`, defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, WorkshopConfigError> {
        let config = match path {
            None => WorkshopConfig::default(),
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| WorkshopConfigError::CannotRead {
                    path: path.display().to_string(),
                    raw_error_message: e.to_string(),
                })?;
                Self::from_yaml(&content).map_err(|e| match e {
                    WorkshopConfigError::InvalidYaml { raw_error_message, .. } => WorkshopConfigError::InvalidYaml {
                        path: path.display().to_string(),
                        raw_error_message,
                    },
                    other => other,
                })?
            }
        };

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, WorkshopConfigError> {
        // an empty document deserializes as null
        let config = match content.trim().is_empty() {
            true => WorkshopConfig::default(),
            false => serde_yaml::from_str::<WorkshopConfig>(content).map_err(|e| WorkshopConfigError::InvalidYaml {
                path: "<inline>".to_string(),
                raw_error_message: e.to_string(),
            })?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WorkshopConfigError> {
        let invalid = |field: &str, raw_error_message: String| WorkshopConfigError::InvalidValue {
            field: field.to_string(),
            raw_error_message,
        };

        if self.environments.is_empty() {
            return Err(invalid("environments", "at least one environment is required".to_string()));
        }
        for label in std::iter::once(&self.namespace_prefix)
            .chain(self.environments.iter())
            .chain(std::iter::once(&self.service_account))
        {
            if !DNS_LABEL_RE.is_match(label) {
                return Err(invalid(
                    "namespace_prefix/environments/service_account",
                    format!("`{label}` is not a valid DNS label"),
                ));
            }
        }

        let mut seen = HashSet::new();
        for template in &self.job_templates {
            if template.name.trim().is_empty() || template.playbook.trim().is_empty() {
                return Err(invalid("job_templates", "name and playbook are required".to_string()));
            }
            if !seen.insert(template.name.as_str()) {
                return Err(invalid("job_templates", format!("`{}` is defined twice", template.name)));
            }
        }

        for (field, name) in [
            ("organization", &self.organization),
            ("project.name", &self.project.name),
            ("project.scm_url", &self.project.scm_url),
            ("inventory.name", &self.inventory.name),
            ("credential.name", &self.credential.name),
            ("execution_environment.name", &self.execution_environment.name),
            ("execution_environment.image", &self.execution_environment.image),
        ] {
            if name.trim().is_empty() {
                return Err(invalid(field, "must not be empty".to_string()));
            }
        }

        Ok(())
    }

    pub fn base_namespace(&self, guid: &str) -> String {
        format!("{}-{}", self.namespace_prefix, guid)
    }

    pub fn environment_namespace(&self, guid: &str, environment: &str) -> String {
        format!("{}-{}", self.base_namespace(guid), environment)
    }

    /// `(environment, namespace)` for every environment, rejecting names over the namespace size limit.
    pub fn environment_namespaces(&self, guid: &str) -> Result<Vec<(String, String)>, WorkshopConfigError> {
        self.environments
            .iter()
            .map(|env| {
                let namespace = self.environment_namespace(guid, env);
                match namespace.len() > MAX_NAMESPACE_LENGTH {
                    true => Err(WorkshopConfigError::InvalidValue {
                        field: "environments".to_string(),
                        raw_error_message: format!(
                            "namespace `{namespace}` is longer than {MAX_NAMESPACE_LENGTH} characters"
                        ),
                    }),
                    false => Ok((env.to_string(), namespace)),
                }
            })
            .collect()
    }
}

/// Name of a controller resource owned by the workshop `guid`.
pub fn resource_name(name: &str, guid: &str) -> String {
    format!("{name} ({guid})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_definition_gives_defaults() {
        let config = WorkshopConfig::from_yaml("").expect("valid definition");

        assert_eq!(config, WorkshopConfig::default());
        assert_eq!(config.base_namespace("abc12"), "workshop-abc12");
        assert_eq!(
            config.environment_namespaces("abc12").expect("valid namespaces"),
            vec![
                ("dev".to_string(), "workshop-abc12-dev".to_string()),
                ("test".to_string(), "workshop-abc12-test".to_string()),
                ("prod".to_string(), "workshop-abc12-prod".to_string()),
            ]
        );
        assert_eq!(config.project_sync_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_definition() {
        let yaml = r#"
namespace_prefix: cics
environments: [dev]
users: [user1, user2]
project:
  name: CICS Pipelines
  scm_url: https://git.example.com/workshop/cics.git
  scm_branch: main
execution_environment:
  pull: always
job_templates:
  - name: Deploy CICS app
    playbook: deploy.yml
    ask_variables_on_launch: true
    extra_vars:
      region: CICSTS61
project_sync_timeout: 90s
verify_ssl: true
"#;

        let config = WorkshopConfig::from_yaml(yaml).expect("valid definition");

        assert_eq!(config.environment_namespace("abc12", "dev"), "cics-abc12-dev");
        assert_eq!(config.users, vec!["user1".to_string(), "user2".to_string()]);
        assert_eq!(config.project.scm_branch, "main");
        assert_eq!(config.inventory, InventoryConfig::default());
        assert_eq!(config.execution_environment.pull, PullPolicy::Always);
        assert_eq!(config.execution_environment.name, "Workshop EE");
        assert_eq!(config.job_templates.len(), 1);
        assert!(config.job_templates[0].ask_variables_on_launch);
        assert_eq!(config.project_sync_timeout, Duration::from_secs(90));
        assert!(config.verify_ssl);
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(matches!(
            WorkshopConfig::from_yaml("environments: []"),
            Err(WorkshopConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            WorkshopConfig::from_yaml("namespace_prefix: Not_Valid"),
            Err(WorkshopConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            WorkshopConfig::from_yaml(
                "job_templates:\n  - {name: a, playbook: a.yml}\n  - {name: a, playbook: b.yml}\n"
            ),
            Err(WorkshopConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            WorkshopConfig::from_yaml("unknown_field: 1"),
            Err(WorkshopConfigError::InvalidYaml { .. })
        ));

        let long_prefix = format!("namespace_prefix: {}", "a".repeat(60));
        let config = WorkshopConfig::from_yaml(&long_prefix).expect("prefix alone is valid");
        assert!(config.environment_namespaces("abc12").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("workshop.yml");
        std::fs::write(&path, "organization: Workshops\n").expect("fixture written");

        assert_eq!(
            WorkshopConfig::load(Some(&path)).expect("valid file").organization,
            "Workshops"
        );
        assert_eq!(WorkshopConfig::load(None).expect("defaults"), WorkshopConfig::default());
        assert!(matches!(
            WorkshopConfig::load(Some(&dir.path().join("missing.yml"))),
            Err(WorkshopConfigError::CannotRead { .. })
        ));
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("Workshop Project", "abc12"), "Workshop Project (abc12)");
    }
}
