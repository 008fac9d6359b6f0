use std::fmt;

use crate::cmd::oc::{ClusterResource, Oc, RoleBindingSubject};
use crate::constants::{LABEL_WORKSHOP_ENVIRONMENT, LABEL_WORKSHOP_GUID};
use crate::errors::WorkshopError;
use crate::io_models::context::Context;
use crate::io_models::details::WorkshopDetails;
use crate::logger::{Step, step_span};
use crate::models::aap::EnsureOutcome;

const SERVICE_ACCOUNT_ROLE: &str = "edit";
const USER_ROLE: &str = "admin";

/// Logs into the cluster with the credentials of the environment file, returns the user name.
pub fn login(context: &Context, oc: &Oc, details: &WorkshopDetails) -> Result<String, WorkshopError> {
    let _span = step_span(&details.guid, Step::Login).entered();

    info!("Logging into {} with {}", details.cluster.api_url, oc.cli());
    oc.login(
        details.cluster.api_url.as_str(),
        &details.cluster.auth,
        !context.config().verify_ssl,
    )?;
    let user = oc.whoami()?;
    info!("Logged in as {}", user);

    Ok(user)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSummary {
    pub resources: Vec<(ClusterResource, EnsureOutcome)>,
}

impl ClusterSummary {
    fn record(&mut self, resource: ClusterResource, outcome: EnsureOutcome) {
        info!("{} {}", resource, outcome);
        self.resources.push((resource, outcome));
    }
}

impl fmt::Display for ClusterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cluster resources:")?;
        for (resource, outcome) in &self.resources {
            writeln!(f, "  {outcome:<8} {resource}")?;
        }
        Ok(())
    }
}

/// Role binding names must be valid resource names, user names may not be.
fn binding_name(subject: &str, role: &str) -> String {
    let subject = subject
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>();

    format!("{}-{}", subject.trim_matches('-'), role)
}

fn ensure_namespace(
    oc: &Oc,
    name: &str,
    labels: Vec<(String, String)>,
    summary: &mut ClusterSummary,
) -> Result<(), WorkshopError> {
    let outcome = match oc.get_namespace(name)? {
        Some(_) => EnsureOutcome::Reused,
        None => {
            oc.create_namespace(name)?;
            EnsureOutcome::Created
        }
    };
    oc.label_namespace(name, labels)?;
    summary.record(
        ClusterResource {
            kind: "namespace".to_string(),
            name: name.to_string(),
            namespace: None,
        },
        outcome,
    );

    Ok(())
}

fn ensure_role_binding(
    oc: &Oc,
    namespace: &str,
    cluster_role: &str,
    subject: &RoleBindingSubject,
    summary: &mut ClusterSummary,
) -> Result<(), WorkshopError> {
    let subject_name = match subject {
        RoleBindingSubject::ServiceAccount { name, .. } => name.as_str(),
        RoleBindingSubject::User(user) => user.as_str(),
    };
    let resource = ClusterResource::namespaced("rolebinding", &binding_name(subject_name, cluster_role), namespace);

    let outcome = match oc.resource_exists(&resource)? {
        true => EnsureOutcome::Reused,
        false => {
            oc.create_role_binding(namespace, &resource.name, cluster_role, subject)?;
            EnsureOutcome::Created
        }
    };
    summary.record(resource, outcome);

    Ok(())
}

/// Namespaces, labels, service account and role bindings of the workshop. Existing resources
/// are kept, labels are always applied.
pub fn setup_cluster(context: &Context, oc: &Oc, guid: &str) -> Result<ClusterSummary, WorkshopError> {
    let _span = step_span(guid, Step::SetupCluster).entered();
    let config = context.config();
    let mut summary = ClusterSummary::default();
    let guid_label = (LABEL_WORKSHOP_GUID.to_string(), guid.to_string());

    let base_namespace = config.base_namespace(guid);
    let environment_namespaces = config.environment_namespaces(guid)?;
    ensure_namespace(oc, &base_namespace, vec![guid_label.clone()], &mut summary)?;
    for (environment, namespace) in &environment_namespaces {
        ensure_namespace(
            oc,
            namespace,
            vec![
                guid_label.clone(),
                (LABEL_WORKSHOP_ENVIRONMENT.to_string(), environment.to_string()),
            ],
            &mut summary,
        )?;
    }

    let service_account = ClusterResource::namespaced("serviceaccount", &config.service_account, &base_namespace);
    let outcome = match oc.resource_exists(&service_account)? {
        true => EnsureOutcome::Reused,
        false => {
            oc.create_service_account(&base_namespace, &config.service_account)?;
            EnsureOutcome::Created
        }
    };
    summary.record(service_account, outcome);

    let service_account_subject = RoleBindingSubject::ServiceAccount {
        namespace: base_namespace.to_string(),
        name: config.service_account.to_string(),
    };
    for (_, namespace) in &environment_namespaces {
        ensure_role_binding(
            oc,
            namespace,
            SERVICE_ACCOUNT_ROLE,
            &service_account_subject,
            &mut summary,
        )?;
        for user in &config.users {
            ensure_role_binding(
                oc,
                namespace,
                USER_ROLE,
                &RoleBindingSubject::User(user.to_string()),
                &mut summary,
            )?;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::structs::{KubernetesNamespace, Metadata};
    use crate::io_models::workshop::WorkshopConfig;
    use std::path::PathBuf;

    fn context(config: WorkshopConfig) -> Context {
        Context::new(PathBuf::from("/tmp"), PathBuf::from(".env"), None, config)
    }

    #[test]
    fn test_binding_name() {
        assert_eq!(binding_name("aap-deployer", "edit"), "aap-deployer-edit");
        assert_eq!(binding_name("John.Doe@example.com", "admin"), "john-doe-example-com-admin");
    }

    #[test]
    fn test_setup_creates_missing_resources() {
        let config = WorkshopConfig {
            environments: vec!["dev".to_string()],
            users: vec!["user1".to_string()],
            ..WorkshopConfig::default()
        };
        let mut oc = Oc::faux();
        faux::when!(oc.get_namespace(_)).then_return(Ok(None));
        faux::when!(oc.create_namespace(_)).then_return(Ok(()));
        faux::when!(oc.label_namespace(_, _)).then_return(Ok(()));
        faux::when!(oc.resource_exists(_)).then_return(Ok(false));
        faux::when!(oc.create_service_account(_, _)).then_return(Ok(()));
        faux::when!(oc.create_role_binding(_, _, _, _)).then_return(Ok(()));

        let summary = setup_cluster(&context(config), &oc, "abc12").expect("cluster set up");

        let created = summary
            .resources
            .iter()
            .map(|(r, o)| (r.to_string(), *o))
            .collect::<Vec<_>>();
        assert_eq!(
            created,
            vec![
                ("namespace/workshop-abc12".to_string(), EnsureOutcome::Created),
                ("namespace/workshop-abc12-dev".to_string(), EnsureOutcome::Created),
                (
                    "serviceaccount/aap-deployer in namespace workshop-abc12".to_string(),
                    EnsureOutcome::Created
                ),
                (
                    "rolebinding/aap-deployer-edit in namespace workshop-abc12-dev".to_string(),
                    EnsureOutcome::Created
                ),
                (
                    "rolebinding/user1-admin in namespace workshop-abc12-dev".to_string(),
                    EnsureOutcome::Created
                ),
            ]
        );
    }

    #[test]
    fn test_setup_keeps_existing_resources() {
        // creation methods are not stubbed: calling them panics
        let config = WorkshopConfig {
            environments: vec!["dev".to_string(), "prod".to_string()],
            ..WorkshopConfig::default()
        };
        let mut oc = Oc::faux();
        faux::when!(oc.get_namespace(_)).then_return(Ok(Some(KubernetesNamespace {
            metadata: Metadata {
                name: "workshop-abc12".to_string(),
                ..Default::default()
            },
            status: None,
        })));
        faux::when!(oc.label_namespace(_, _)).then_return(Ok(()));
        faux::when!(oc.resource_exists(_)).then_return(Ok(true));

        let summary = setup_cluster(&context(config), &oc, "abc12").expect("cluster set up");

        assert_eq!(summary.resources.len(), 6);
        assert!(summary.resources.iter().all(|(_, o)| *o == EnsureOutcome::Reused));
    }
}
