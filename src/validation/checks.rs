use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::cmd::oc::{AccessReview, ClusterResource, Oc, RoleBindingSubject};
use crate::cmd::structs::KubernetesNamespace;
use crate::constants::{
    AAP_CREDENTIAL_ID, AAP_EE_ID, AAP_HOST_ID, AAP_INVENTORY_ID, AAP_ORGANIZATION_ID, AAP_PROJECT_ID,
    DEFAULT_MAINFRAME_PORT, LABEL_WORKSHOP_ENVIRONMENT, LABEL_WORKSHOP_GUID, MAINFRAME_HOST,
};
use crate::io_models::details::HostAddress;
use crate::io_models::env_file::{EnvFile, job_template_env_key};
use crate::io_models::workshop::{WorkshopConfig, resource_name};
use crate::services::aap::{AapService, ResourceKind};
use crate::validation::ValidationTarget;
use crate::validation::report::CheckSeverity::{self, Critical, Warning};
use crate::validation::report::CheckResult;

const CLUSTER: &str = "cluster";
const NAMESPACE: &str = "namespace";
const RBAC: &str = "rbac";
const WORKLOADS: &str = "workloads";
const AAP: &str = "aap";
const CONNECTIVITY: &str = "connectivity";

pub fn cluster_checks(oc: &Oc) -> Vec<CheckResult> {
    let check = match oc.whoami() {
        Ok(user) => CheckResult::passed(CLUSTER, "logged in", Critical, format!("as {user}")),
        Err(err) => CheckResult::failed(CLUSTER, "logged in", Critical, err.to_string()),
    };

    vec![check]
}

fn label_check(namespace: &KubernetesNamespace, name: &str, key: &str, expected: &str) -> CheckResult {
    match namespace.metadata.label(key) {
        Some(value) if value == expected => CheckResult::passed(NAMESPACE, name, Warning, format!("{key}={value}")),
        Some(value) => CheckResult::failed(
            NAMESPACE,
            name,
            Warning,
            format!("{key} is `{value}`, expected `{expected}`"),
        ),
        None => CheckResult::failed(NAMESPACE, name, Warning, format!("no {key} label")),
    }
}

pub fn namespace_checks(oc: &Oc, target: &ValidationTarget) -> Vec<CheckResult> {
    let missing = |detail: String| {
        vec![
            CheckResult::failed(NAMESPACE, "namespace exists", Critical, detail),
            CheckResult::skipped(NAMESPACE, "guid label", Warning, "namespace not found"),
            CheckResult::skipped(NAMESPACE, "environment label", Warning, "namespace not found"),
        ]
    };

    let namespace = match oc.get_namespace(&target.namespace) {
        Ok(Some(namespace)) => namespace,
        Ok(None) => return missing(format!("namespace {} not found", target.namespace)),
        Err(err) => return missing(err.to_string()),
    };

    vec![
        CheckResult::passed(NAMESPACE, "namespace exists", Critical, target.namespace.to_string()),
        label_check(&namespace, "guid label", LABEL_WORKSHOP_GUID, &target.guid),
        label_check(&namespace, "environment label", LABEL_WORKSHOP_ENVIRONMENT, &target.environment),
    ]
}

fn access_check(oc: &Oc, name: &str, severity: CheckSeverity, review: AccessReview, expected: bool) -> CheckResult {
    let scope = match &review.namespace {
        Some(namespace) => format!("in namespace {namespace}"),
        None => "cluster-wide".to_string(),
    };
    let question = format!(
        "{} {} {} {}",
        review.subject.impersonation_name(),
        review.verb,
        review.resource,
        scope
    );

    match oc.can_i(review) {
        Ok(allowed) => CheckResult::from_bool(
            RBAC,
            name,
            severity,
            allowed == expected,
            format!("{question}: {}", if allowed { "allowed" } else { "denied" }),
        ),
        Err(err) => CheckResult::failed(RBAC, name, severity, err.to_string()),
    }
}

pub fn rbac_checks(oc: &Oc, config: &WorkshopConfig, target: &ValidationTarget) -> Vec<CheckResult> {
    let service_account = ClusterResource::namespaced("serviceaccount", &config.service_account, &target.base_namespace);
    let mut checks = vec![match oc.resource_exists(&service_account) {
        Ok(true) => CheckResult::passed(RBAC, "service account exists", Critical, service_account.to_string()),
        Ok(false) => CheckResult::failed(
            RBAC,
            "service account exists",
            Critical,
            format!("{service_account} not found"),
        ),
        Err(err) => CheckResult::failed(RBAC, "service account exists", Critical, err.to_string()),
    }];

    let subject = RoleBindingSubject::ServiceAccount {
        namespace: target.base_namespace.to_string(),
        name: config.service_account.to_string(),
    };
    checks.push(access_check(
        oc,
        "service account can create deployments",
        Critical,
        AccessReview {
            verb: "create".to_string(),
            resource: "deployments".to_string(),
            namespace: Some(target.namespace.to_string()),
            subject: subject.clone(),
        },
        true,
    ));
    checks.push(access_check(
        oc,
        "service account cannot delete namespaces",
        Critical,
        AccessReview {
            verb: "delete".to_string(),
            resource: "namespaces".to_string(),
            namespace: None,
            subject,
        },
        false,
    ));

    for user in &config.users {
        checks.push(access_check(
            oc,
            &format!("{user} can create pods"),
            Warning,
            AccessReview {
                verb: "create".to_string(),
                resource: "pods".to_string(),
                namespace: Some(target.namespace.to_string()),
                subject: RoleBindingSubject::User(user.to_string()),
            },
            true,
        ));
    }

    checks
}

pub fn workload_checks(oc: &Oc, target: &ValidationTarget) -> Vec<CheckResult> {
    let check = match oc.get_deployments(&target.namespace) {
        Ok(deployments) if deployments.is_empty() => {
            CheckResult::failed(WORKLOADS, "deployments ready", Warning, "no deployment in namespace")
        }
        Ok(deployments) => {
            let not_ready = deployments
                .iter()
                .filter(|d| !d.is_ready())
                .map(|d| d.metadata.name.as_str())
                .collect::<Vec<&str>>();
            match not_ready.is_empty() {
                true => CheckResult::passed(
                    WORKLOADS,
                    "deployments ready",
                    Warning,
                    format!("{} deployment(s) ready", deployments.len()),
                ),
                false => CheckResult::failed(
                    WORKLOADS,
                    "deployments ready",
                    Warning,
                    format!("not ready: {}", not_ready.join(", ")),
                ),
            }
        }
        Err(err) => CheckResult::failed(WORKLOADS, "deployments ready", Warning, err.to_string()),
    };

    vec![check]
}

/// A controller resource whose id configure-aap wrote to the `.env` file.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResource {
    pub kind: ResourceKind,
    pub env_key: String,
    pub name: String,
    pub filters: Vec<(String, String)>,
}

impl RecordedResource {
    fn new(kind: ResourceKind, env_key: &str, name: String) -> Self {
        RecordedResource {
            kind,
            env_key: env_key.to_string(),
            name,
            filters: vec![],
        }
    }
}

/// Resources expected from the workshop definition, restricted to the ones recorded in `env_file`.
pub fn recorded_resources(env_file: &EnvFile, config: &WorkshopConfig, guid: &str) -> Vec<RecordedResource> {
    let mut resources = vec![
        RecordedResource::new(ResourceKind::Organization, AAP_ORGANIZATION_ID, config.organization.to_string()),
        RecordedResource::new(ResourceKind::Project, AAP_PROJECT_ID, resource_name(&config.project.name, guid)),
        RecordedResource::new(
            ResourceKind::Inventory,
            AAP_INVENTORY_ID,
            resource_name(&config.inventory.name, guid),
        ),
        RecordedResource::new(
            ResourceKind::Credential,
            AAP_CREDENTIAL_ID,
            resource_name(&config.credential.name, guid),
        ),
        RecordedResource::new(
            ResourceKind::ExecutionEnvironment,
            AAP_EE_ID,
            resource_name(&config.execution_environment.name, guid),
        ),
    ];

    if let Some(host) = env_file.get(MAINFRAME_HOST).map(HostAddress::parse) {
        let mut recorded = RecordedResource::new(ResourceKind::Host, AAP_HOST_ID, host.host);
        if let Some(inventory_id) = env_file.get(AAP_INVENTORY_ID) {
            recorded.filters.push(("inventory".to_string(), inventory_id.to_string()));
        }
        resources.push(recorded);
    }

    resources.extend(config.job_templates.iter().map(|t| {
        RecordedResource::new(
            ResourceKind::JobTemplate,
            &job_template_env_key(&t.name),
            resource_name(&t.name, guid),
        )
    }));

    resources.retain(|r| env_file.get(&r.env_key).is_some());
    resources
}

fn idempotency_check(service: &AapService, env_file: &EnvFile, recorded: &RecordedResource) -> CheckResult {
    let name = format!("{} `{}` exists once", recorded.kind, recorded.name);
    let Some(recorded_id) = env_file.get_id(&recorded.env_key) else {
        return CheckResult::failed(
            AAP,
            &name,
            Critical,
            format!("{} does not hold a valid id", recorded.env_key),
        );
    };

    let mut query = vec![("name".to_string(), recorded.name.to_string())];
    query.extend(recorded.filters.iter().cloned());
    let list = match service.find(recorded.kind, query) {
        Ok(list) => list,
        Err(err) => return CheckResult::failed(AAP, &name, Critical, err.to_string()),
    };

    let count = list.count.max(list.results.len() as u64);
    match (count, list.results.first()) {
        (1, Some(found)) if found.id == recorded_id => {
            CheckResult::passed(AAP, &name, Critical, format!("id {recorded_id}"))
        }
        (1, Some(found)) => CheckResult::failed(
            AAP,
            &name,
            Critical,
            format!("found with id {}, {} records {}", found.id, recorded.env_key, recorded_id),
        ),
        (0, _) | (1, None) => CheckResult::failed(
            AAP,
            &name,
            Critical,
            format!("not found, {} records {}", recorded.env_key, recorded_id),
        ),
        (count, _) => CheckResult::failed(AAP, &name, Critical, format!("{count} resources share this name")),
    }
}

/// `service` is the controller client, or why it could not be built.
pub fn aap_checks(
    service: Result<&AapService, String>,
    env_file: &EnvFile,
    config: &WorkshopConfig,
    target: &ValidationTarget,
) -> Vec<CheckResult> {
    let recorded = recorded_resources(env_file, config, &target.guid);
    let unreachable = |detail: String| {
        let mut checks = vec![CheckResult::failed(AAP, "controller reachable", Critical, detail)];
        checks.extend(recorded.iter().map(|r| {
            CheckResult::skipped(
                AAP,
                &format!("{} `{}` exists once", r.kind, r.name),
                Critical,
                "controller unreachable",
            )
        }));
        checks
    };

    let service = match service {
        Ok(service) => service,
        Err(reason) => return unreachable(reason),
    };
    let ping = match service.ping() {
        Ok(ping) => ping,
        Err(err) => return unreachable(err.to_string()),
    };

    let mut checks = vec![CheckResult::passed(
        AAP,
        "controller reachable",
        Critical,
        format!("version {}", ping.version.as_deref().unwrap_or("unknown")),
    )];
    checks.extend(recorded.iter().map(|r| idempotency_check(service, env_file, r)));
    checks
}

pub fn connectivity_checks(target: &ValidationTarget, timeout: Duration) -> Vec<CheckResult> {
    const NAME: &str = "mainframe reachable";
    let Some(host) = &target.mainframe_host else {
        return vec![CheckResult::skipped(CONNECTIVITY, NAME, Warning, "no mainframe host")];
    };
    let port = host.port.unwrap_or(DEFAULT_MAINFRAME_PORT);
    let endpoint = format!("{}:{}", host.host, port);

    let addresses = match (host.host.as_str(), port).to_socket_addrs() {
        Ok(addresses) => addresses.collect::<Vec<_>>(),
        Err(err) => {
            return vec![CheckResult::failed(
                CONNECTIVITY,
                NAME,
                Warning,
                format!("cannot resolve {}: {}", host.host, err),
            )];
        }
    };

    let mut last_error = "no address".to_string();
    for address in addresses {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(_) => return vec![CheckResult::passed(CONNECTIVITY, NAME, Warning, endpoint)],
            Err(err) => {
                debug!("{} unreachable: {}", address, err);
                last_error = err.to_string();
            }
        }
    }

    vec![CheckResult::failed(
        CONNECTIVITY,
        NAME,
        Warning,
        format!("{endpoint} unreachable: {last_error}"),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::oc::OcError;
    use crate::cmd::structs::{KubernetesDeployment, KubernetesDeploymentSpec, KubernetesDeploymentStatus, Metadata};
    use crate::constants::WORKSHOP_GUID;
    use crate::services::aap::{AapServiceError, PingResponse, ResourceList, ResourceSummary};
    use crate::validation::report::CheckStatus;
    use maplit::btreemap;
    use std::net::TcpListener;
    use std::path::Path;

    fn target(mainframe_host: Option<HostAddress>) -> ValidationTarget {
        ValidationTarget {
            guid: "abc12".to_string(),
            namespace: "workshop-abc12-dev".to_string(),
            environment: "dev".to_string(),
            base_namespace: "workshop-abc12".to_string(),
            mainframe_host,
        }
    }

    fn statuses(checks: &[CheckResult]) -> Vec<CheckStatus> {
        checks.iter().map(|c| c.status).collect()
    }

    fn namespace(labels: std::collections::BTreeMap<String, String>) -> KubernetesNamespace {
        KubernetesNamespace {
            metadata: Metadata {
                name: "workshop-abc12-dev".to_string(),
                labels: Some(labels),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_namespace_labels() {
        let mut oc = Oc::faux();
        faux::when!(oc.get_namespace(_)).then_return(Ok(Some(namespace(btreemap! {
            LABEL_WORKSHOP_GUID.to_string() => "abc12".to_string(),
            LABEL_WORKSHOP_ENVIRONMENT.to_string() => "prod".to_string(),
        }))));

        let checks = namespace_checks(&oc, &target(None));

        assert_eq!(
            statuses(&checks),
            vec![CheckStatus::Passed, CheckStatus::Passed, CheckStatus::Failed]
        );
        assert_eq!(checks[2].detail, "workshop/environment is `prod`, expected `dev`");
        assert!(!checks[2].is_critical_failure());
    }

    #[test]
    fn test_missing_namespace_is_critical() {
        let mut oc = Oc::faux();
        faux::when!(oc.get_namespace(_)).then_return(Ok(None));

        let checks = namespace_checks(&oc, &target(None));

        assert!(checks[0].is_critical_failure());
        assert_eq!(
            statuses(&checks),
            vec![CheckStatus::Failed, CheckStatus::Skipped, CheckStatus::Skipped]
        );
    }

    #[test]
    fn test_rbac_checks() {
        let config = WorkshopConfig {
            users: vec!["user1".to_string()],
            ..WorkshopConfig::default()
        };
        let mut oc = Oc::faux();
        faux::when!(oc.resource_exists(_)).then_return(Ok(true));
        faux::when!(oc.can_i(_)).then(|review| match (review.verb.as_str(), review.resource.as_str()) {
            ("create", "deployments") => {
                assert_eq!(review.namespace.as_deref(), Some("workshop-abc12-dev"));
                assert_eq!(
                    review.subject.impersonation_name(),
                    "system:serviceaccount:workshop-abc12:aap-deployer"
                );
                Ok(true)
            }
            ("delete", "namespaces") => {
                assert_eq!(review.namespace, None);
                Ok(false)
            }
            _ => Ok(false),
        });

        let checks = rbac_checks(&oc, &config, &target(None));

        assert_eq!(
            statuses(&checks),
            vec![
                CheckStatus::Passed,
                CheckStatus::Passed,
                CheckStatus::Passed,
                CheckStatus::Failed
            ]
        );
        assert_eq!(checks[3].name, "user1 can create pods");
        assert!(!checks[3].is_critical_failure());
    }

    #[test]
    fn test_overprivileged_service_account_is_critical() {
        let mut oc = Oc::faux();
        faux::when!(oc.resource_exists(_)).then_return(Ok(true));
        faux::when!(oc.can_i(_)).then_return(Ok(true));

        let checks = rbac_checks(&oc, &WorkshopConfig::default(), &target(None));

        assert_eq!(checks[2].name, "service account cannot delete namespaces");
        assert!(checks[2].is_critical_failure());
    }

    fn deployment(name: &str, replicas: u32, ready: u32) -> KubernetesDeployment {
        KubernetesDeployment {
            metadata: Metadata {
                name: name.to_string(),
                ..Default::default()
            },
            spec: KubernetesDeploymentSpec { replicas: Some(replicas) },
            status: KubernetesDeploymentStatus {
                replicas: Some(replicas),
                ready_replicas: Some(ready),
                available_replicas: Some(ready),
            },
        }
    }

    #[test]
    fn test_workload_checks() {
        let mut oc = Oc::faux();
        faux::when!(oc.get_deployments(_)).then_return(Ok(vec![deployment("api", 2, 2), deployment("web", 1, 0)]));
        let checks = workload_checks(&oc, &target(None));
        assert_eq!(checks[0].status, CheckStatus::Failed);
        assert_eq!(checks[0].detail, "not ready: web");

        let mut oc = Oc::faux();
        faux::when!(oc.get_deployments(_)).then_return(Ok(vec![]));
        let checks = workload_checks(&oc, &target(None));
        assert_eq!(checks[0].status, CheckStatus::Failed);
        assert!(!checks[0].is_critical_failure());
    }

    #[test]
    fn test_cluster_login_failure() {
        let mut oc = Oc::faux();
        faux::when!(oc.whoami()).then_return(Err(OcError::CmdError {
            command: "oc whoami".to_string(),
            raw_error_message: "Unauthorized".to_string(),
        }));

        assert!(cluster_checks(&oc)[0].is_critical_failure());
    }

    fn env_file(dir: &Path) -> EnvFile {
        EnvFile::create(
            &dir.join(".env"),
            &[
                (WORKSHOP_GUID, "abc12".to_string()),
                (MAINFRAME_HOST, "zos.example.com:10443".to_string()),
                (AAP_ORGANIZATION_ID, "1".to_string()),
                (AAP_PROJECT_ID, "12".to_string()),
                (AAP_INVENTORY_ID, "7".to_string()),
                (AAP_HOST_ID, "70".to_string()),
                ("AAP_JOB_TEMPLATE_HELLO_WORLD_ID", "21".to_string()),
            ],
            false,
        )
        .expect("env file created")
    }

    #[test]
    fn test_recorded_resources() {
        let dir = tempfile::tempdir().expect("temp dir");
        let recorded = recorded_resources(&env_file(dir.path()), &WorkshopConfig::default(), "abc12");

        assert_eq!(
            recorded.iter().map(|r| (r.kind, r.name.as_str())).collect::<Vec<_>>(),
            vec![
                (ResourceKind::Organization, "Default"),
                (ResourceKind::Project, "Workshop Project (abc12)"),
                (ResourceKind::Inventory, "Workshop Inventory (abc12)"),
                (ResourceKind::Host, "zos.example.com"),
                (ResourceKind::JobTemplate, "Hello World (abc12)"),
            ]
        );
        assert_eq!(recorded[3].filters, vec![("inventory".to_string(), "7".to_string())]);
    }

    fn found(id: u64, name: &str) -> ResourceList {
        ResourceList {
            count: 1,
            results: vec![ResourceSummary {
                id,
                name: name.to_string(),
                status: None,
            }],
        }
    }

    #[test]
    fn test_aap_idempotency_checks() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut service = AapService::faux();
        faux::when!(service.ping()).then_return(Ok(PingResponse {
            version: Some("4.5.0".to_string()),
            active_node: None,
        }));
        faux::when!(service.find(_, _)).then(|(kind, _)| match kind {
            ResourceKind::Organization => Ok(found(1, "Default")),
            ResourceKind::Project => Ok(found(99, "Workshop Project (abc12)")),
            ResourceKind::Inventory => Ok(ResourceList {
                count: 2,
                results: vec![],
            }),
            ResourceKind::Host => Ok(ResourceList::default()),
            _ => Ok(found(21, "Hello World (abc12)")),
        });

        let checks = aap_checks(Ok(&service), &env_file(dir.path()), &WorkshopConfig::default(), &target(None));

        assert_eq!(
            statuses(&checks),
            vec![
                CheckStatus::Passed,
                CheckStatus::Passed,
                CheckStatus::Failed,
                CheckStatus::Failed,
                CheckStatus::Failed,
                CheckStatus::Passed,
            ]
        );
        assert_eq!(checks[2].detail, "found with id 99, AAP_PROJECT_ID records 12");
        assert_eq!(checks[3].detail, "2 resources share this name");
        assert_eq!(checks[4].detail, "not found, AAP_HOST_ID records 70");
    }

    #[test]
    fn test_unreachable_controller_skips_resource_checks() {
        // `find` is not stubbed: calling it panics
        let dir = tempfile::tempdir().expect("temp dir");
        let mut service = AapService::faux();
        faux::when!(service.ping()).then_return(Err(AapServiceError::Unreachable {
            url: "https://aap.example.com/api/controller/v2/ping/".to_string(),
            raw_error_message: "connection refused".to_string(),
        }));

        let env_file = env_file(dir.path());

        let checks = aap_checks(Ok(&service), &env_file, &WorkshopConfig::default(), &target(None));

        assert!(checks[0].is_critical_failure());
        assert_eq!(checks.len(), 6);
        assert!(checks[1..].iter().all(|c| c.status == CheckStatus::Skipped));

        let checks = aap_checks(
            Err("no controller url".to_string()),
            &env_file,
            &WorkshopConfig::default(),
            &target(None),
        );
        assert!(checks[0].is_critical_failure());
        assert_eq!(checks[0].detail, "no controller url");
        assert!(checks[1..].iter().all(|c| c.status == CheckStatus::Skipped));
    }

    #[test]
    fn test_connectivity_checks() {
        let timeout = Duration::from_secs(2);
        assert_eq!(connectivity_checks(&target(None), timeout)[0].status, CheckStatus::Skipped);

        let listener = TcpListener::bind("127.0.0.1:0").expect("listener bound");
        let port = listener.local_addr().expect("local address").port();
        let reachable = HostAddress {
            host: "127.0.0.1".to_string(),
            port: Some(port),
        };
        assert_eq!(
            connectivity_checks(&target(Some(reachable.clone())), timeout)[0].status,
            CheckStatus::Passed
        );

        drop(listener);
        let checks = connectivity_checks(&target(Some(reachable)), timeout);
        assert_eq!(checks[0].status, CheckStatus::Failed);
        assert!(!checks[0].is_critical_failure());
    }
}
