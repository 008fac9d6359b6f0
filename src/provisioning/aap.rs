use std::fmt;

use crate::cmd::oc::Oc;
use crate::constants::{
    AAP_CREDENTIAL_ID, AAP_EE_ID, AAP_HOST_ID, AAP_INVENTORY_ID, AAP_ORGANIZATION_ID, AAP_PROJECT_ID,
};
use crate::errors::WorkshopError;
use crate::io_models::context::Context;
use crate::io_models::details::{HostAddress, WorkshopDetails};
use crate::io_models::env_file::{EnvFile, job_template_env_key};
use crate::io_models::workshop::resource_name;
use crate::logger::{Step, step_span};
use crate::models::aap::resources::{
    BearerTokenCredential, JobTemplateRefs, credential_spec, execution_environment_spec, host_spec,
    inventory_spec, job_template_spec, project_spec,
};
use crate::models::aap::{EnsureError, EnsureOutcome, Ensured, ResourceEnsurer, ResourceKind};

const JOB_TEMPLATE_CREDENTIALS: &str = "credentials";

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryStatus {
    Done { id: u64, outcome: EnsureOutcome },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub kind: ResourceKind,
    pub name: String,
    pub status: SummaryStatus,
}

/// What configure-aap did with each controller resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AapSummary {
    pub entries: Vec<SummaryEntry>,
}

impl AapSummary {
    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, SummaryStatus::Failed(_)))
            .count()
    }

    pub fn id_of(&self, kind: ResourceKind) -> Option<u64> {
        self.entries.iter().find_map(|e| match (e.kind == kind, &e.status) {
            (true, SummaryStatus::Done { id, .. }) => Some(*id),
            _ => None,
        })
    }

    fn done(&mut self, ensured: &Ensured) {
        self.entries.push(SummaryEntry {
            kind: ensured.kind,
            name: ensured.name.to_string(),
            status: SummaryStatus::Done {
                id: ensured.id,
                outcome: ensured.outcome,
            },
        });
    }

    fn failed(&mut self, kind: ResourceKind, name: &str, err: &WorkshopError) {
        warn!("{} `{}` skipped: {}", kind, name, err);
        self.entries.push(SummaryEntry {
            kind,
            name: name.to_string(),
            status: SummaryStatus::Failed(err.to_string()),
        });
    }
}

impl fmt::Display for AapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Automation Controller resources:")?;
        for entry in &self.entries {
            match &entry.status {
                SummaryStatus::Done { id, outcome } => writeln!(
                    f,
                    "  {:<8} {:<22} {} (id {})",
                    outcome.to_string(),
                    entry.kind.to_string(),
                    entry.name,
                    id
                )?,
                SummaryStatus::Failed(reason) => writeln!(
                    f,
                    "  {:<8} {:<22} {}: {}",
                    "failed",
                    entry.kind.to_string(),
                    entry.name,
                    reason
                )?,
            }
        }
        Ok(())
    }
}

/// Runs one resource step: fatal errors stop the configuration, the others are recorded.
fn step<F>(summary: &mut AapSummary, kind: ResourceKind, name: &str, f: F) -> Result<Option<Ensured>, WorkshopError>
where
    F: FnOnce() -> Result<Ensured, WorkshopError>,
{
    match f() {
        Ok(ensured) => {
            summary.done(&ensured);
            Ok(Some(ensured))
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            summary.failed(kind, name, &err);
            Ok(None)
        }
    }
}

/// Ensures every controller resource of the workshop and records their ids in the environment file.
pub fn configure_aap(
    context: &Context,
    oc: &Oc,
    ensurer: &ResourceEnsurer,
    details: &WorkshopDetails,
    env_file: &mut EnvFile,
) -> Result<AapSummary, WorkshopError> {
    let guid = details.guid.as_str();
    let _span = step_span(guid, Step::ConfigureAap).entered();
    let config = context.config();
    let mut summary = AapSummary::default();

    let ping = ensurer.service().ping()?;
    info!(
        "Controller {} reachable, version {}",
        details.controller.url,
        ping.version.as_deref().unwrap_or("unknown")
    );

    let organization = ensurer.lookup(ResourceKind::Organization, &config.organization, &[])?;
    env_file.upsert(AAP_ORGANIZATION_ID, &organization.id.to_string())?;

    let project_name = resource_name(&config.project.name, guid);
    let project = step(&mut summary, ResourceKind::Project, &project_name, || {
        let project = ensurer.ensure(&project_spec(&project_name, organization.id, &config.project))?;
        env_file.upsert(AAP_PROJECT_ID, &project.id.to_string())?;
        ensurer.ensure_project_synced(&project, config.project_sync_timeout)?;
        Ok(project)
    })?;

    let inventory_name = resource_name(&config.inventory.name, guid);
    let inventory = step(&mut summary, ResourceKind::Inventory, &inventory_name, || {
        let inventory = ensurer.ensure(&inventory_spec(&inventory_name, organization.id))?;
        env_file.upsert(AAP_INVENTORY_ID, &inventory.id.to_string())?;
        Ok(inventory)
    })?;

    // required steps return early on failure, these are always set
    let (Some(project), Some(inventory)) = (project, inventory) else {
        return Ok(summary);
    };

    if let Some(mainframe_host) = details.mainframe_host.as_deref().map(HostAddress::parse) {
        step(&mut summary, ResourceKind::Host, &mainframe_host.host, || {
            let host = ensurer.ensure(&host_spec(&mainframe_host, inventory.id))?;
            env_file.upsert(AAP_HOST_ID, &host.id.to_string())?;
            Ok(host)
        })?;
    }

    let credential_name = resource_name(&config.credential.name, guid);
    let credential = step(&mut summary, ResourceKind::Credential, &credential_name, || {
        let credential = ensure_credential(context, oc, ensurer, details, organization.id, &credential_name)?;
        env_file.upsert(AAP_CREDENTIAL_ID, &credential.id.to_string())?;
        Ok(credential)
    })?;

    let ee_name = resource_name(&config.execution_environment.name, guid);
    let execution_environment = step(&mut summary, ResourceKind::ExecutionEnvironment, &ee_name, || {
        let ee = ensurer.ensure(&execution_environment_spec(
            &ee_name,
            organization.id,
            &config.execution_environment,
        ))?;
        env_file.upsert(AAP_EE_ID, &ee.id.to_string())?;
        Ok(ee)
    })?;

    let refs = JobTemplateRefs {
        project_id: project.id,
        inventory_id: inventory.id,
        execution_environment_id: execution_environment.as_ref().map(|ee| ee.id),
    };
    for template in &config.job_templates {
        let template_name = resource_name(&template.name, guid);
        step(&mut summary, ResourceKind::JobTemplate, &template_name, || {
            let job_template = ensurer.ensure(&job_template_spec(&template_name, &refs, template)?)?;
            env_file.upsert(&job_template_env_key(&template.name), &job_template.id.to_string())?;
            if let Some(credential) = &credential {
                ensurer.ensure_association(
                    ResourceKind::JobTemplate,
                    job_template.id,
                    JOB_TEMPLATE_CREDENTIALS,
                    credential.id,
                )?;
            }
            Ok(job_template)
        })?;
    }

    info!("{}", summary);
    if summary.failures() > 0 {
        warn!("{} controller resource(s) could not be configured", summary.failures());
    }

    Ok(summary)
}

/// The credential holds a token of the workshop service account, only issued when the
/// credential has to be created.
fn ensure_credential(
    context: &Context,
    oc: &Oc,
    ensurer: &ResourceEnsurer,
    details: &WorkshopDetails,
    organization_id: u64,
    name: &str,
) -> Result<Ensured, WorkshopError> {
    let config = context.config();
    let api_url = details.cluster.api_url.as_str().trim_end_matches('/');
    let credential_type = ensurer
        .lookup(ResourceKind::CredentialType, &config.credential.credential_type, &[])
        .map_err(|e| EnsureError::Dependency {
            kind: ResourceKind::Credential,
            name: name.to_string(),
            raw_error_message: e.to_string(),
        })?;

    let spec_without_token = credential_spec(&BearerTokenCredential {
        name,
        organization_id,
        credential_type_id: credential_type.id,
        api_url,
        token: "",
        verify_ssl: config.verify_ssl,
    });
    if let Some(existing) = ensurer.find_one(ResourceKind::Credential, name, &spec_without_token.filters)? {
        info!("{} `{}` already exists with id {}", ResourceKind::Credential, name, existing.id);
        return Ok(Ensured {
            kind: ResourceKind::Credential,
            name: existing.name,
            id: existing.id,
            outcome: EnsureOutcome::Reused,
            status: existing.status,
        });
    }

    let base_namespace = config.base_namespace(&details.guid);
    let token = oc
        .create_token(&base_namespace, &config.service_account, &config.credential.token_duration)
        .map_err(|e| EnsureError::Dependency {
            kind: ResourceKind::Credential,
            name: name.to_string(),
            raw_error_message: e.to_string(),
        })?;

    Ok(ensurer.ensure(&credential_spec(&BearerTokenCredential {
        name,
        organization_id,
        credential_type_id: credential_type.id,
        api_url,
        token: &token,
        verify_ssl: config.verify_ssl,
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::oc::{ClusterAuth, OcError};
    use crate::io_models::details::{ClusterDetails, ControllerDetails};
    use crate::io_models::workshop::WorkshopConfig;
    use crate::services::aap::{AapService, AapServiceError, ControllerAuth, PingResponse, ResourceList, ResourceSummary};
    use std::path::Path;
    use std::time::Duration;
    use url::Url;

    fn details(mainframe_host: Option<&str>) -> WorkshopDetails {
        WorkshopDetails {
            guid: "abc12".to_string(),
            cluster: ClusterDetails {
                api_url: Url::parse("https://api.cluster-abc12.example.com:6443").expect("valid url"),
                console_url: None,
                auth: ClusterAuth::Token("sha256~tok".to_string()),
            },
            controller: ControllerDetails {
                url: Url::parse("https://aap.example.com").expect("valid url"),
                auth: ControllerAuth::Token("aaptok".to_string()),
            },
            mainframe_host: mainframe_host.map(|h| h.to_string()),
        }
    }

    fn setup(dir: &Path, details: &WorkshopDetails) -> (Context, EnvFile) {
        let context = Context::new(
            dir.to_path_buf(),
            ".env".into(),
            None,
            WorkshopConfig {
                project_sync_timeout: Duration::from_millis(10),
                ..WorkshopConfig::default()
            },
        );
        let env_file = EnvFile::create(context.env_file_path(), &details.env_entries("workshop-abc12"), false)
            .expect("env file created");

        (context, env_file)
    }

    fn ensurer(service: AapService) -> ResourceEnsurer {
        ResourceEnsurer::new(service).with_poll_interval(Duration::from_millis(1))
    }

    fn existing(kind: ResourceKind) -> (u64, &'static str) {
        match kind {
            ResourceKind::Organization => (1, "Default"),
            ResourceKind::Project => (12, "Workshop Project (abc12)"),
            ResourceKind::Inventory => (7, "Workshop Inventory (abc12)"),
            ResourceKind::Host => (70, "zos.example.com"),
            ResourceKind::CredentialType => (17, "OpenShift or Kubernetes API Bearer Token"),
            ResourceKind::Credential => (4, "OpenShift Deployer (abc12)"),
            ResourceKind::ExecutionEnvironment => (3, "Workshop EE (abc12)"),
            ResourceKind::JobTemplate => (21, "Hello World (abc12)"),
        }
    }

    fn resource(id: u64, name: &str, status: &str) -> ResourceSummary {
        ResourceSummary {
            id,
            name: name.to_string(),
            status: Some(status.to_string()),
        }
    }

    /// Controller holding every workshop resource except the `missing` kinds.
    fn service(missing: Vec<ResourceKind>) -> AapService {
        let mut service = AapService::faux();
        faux::when!(service.ping()).then_return(Ok(PingResponse {
            version: Some("4.5.0".to_string()),
            active_node: None,
        }));
        faux::when!(service.find(_, _)).then(move |(kind, _)| {
            let results = match missing.contains(&kind) {
                true => vec![],
                false => {
                    let (id, name) = existing(kind);
                    vec![resource(id, name, "successful")]
                }
            };
            Ok(ResourceList {
                count: results.len() as u64,
                results,
            })
        });
        faux::when!(service.get(ResourceKind::Project, 12))
            .then_return(Ok(resource(12, "Workshop Project (abc12)", "successful")));
        service
    }

    #[test]
    fn test_existing_resources_are_reused_and_recorded() {
        // neither `create` nor `associate` nor `create_token` is stubbed: calling them panics
        let dir = tempfile::tempdir().expect("temp dir");
        let details = details(Some("zos.example.com:10443"));
        let (context, mut env_file) = setup(dir.path(), &details);
        let mut service = service(vec![]);
        faux::when!(service.list_related(ResourceKind::JobTemplate, 21, _)).then_return(Ok(ResourceList {
            count: 1,
            results: vec![resource(4, "OpenShift Deployer (abc12)", "successful")],
        }));

        let summary =
            configure_aap(&context, &Oc::faux(), &ensurer(service), &details, &mut env_file).expect("configured");

        assert_eq!(summary.failures(), 0);
        assert_eq!(summary.entries.len(), 6);
        assert!(summary.entries.iter().all(|e| matches!(
            e.status,
            SummaryStatus::Done {
                outcome: EnsureOutcome::Reused,
                ..
            }
        )));

        let reloaded = EnvFile::load(context.env_file_path()).expect("env file reloaded");
        assert_eq!(reloaded.get(AAP_ORGANIZATION_ID), Some("1"));
        assert_eq!(reloaded.get(AAP_PROJECT_ID), Some("12"));
        assert_eq!(reloaded.get(AAP_INVENTORY_ID), Some("7"));
        assert_eq!(reloaded.get(AAP_HOST_ID), Some("70"));
        assert_eq!(reloaded.get(AAP_CREDENTIAL_ID), Some("4"));
        assert_eq!(reloaded.get(AAP_EE_ID), Some("3"));
        assert_eq!(reloaded.get("AAP_JOB_TEMPLATE_HELLO_WORLD_ID"), Some("21"));
    }

    #[test]
    fn test_missing_resources_are_created() {
        let dir = tempfile::tempdir().expect("temp dir");
        let details = details(None);
        let (context, mut env_file) = setup(dir.path(), &details);

        let mut service = service(vec![
            ResourceKind::Project,
            ResourceKind::Inventory,
            ResourceKind::Credential,
            ResourceKind::ExecutionEnvironment,
            ResourceKind::JobTemplate,
        ]);
        faux::when!(service.create(_, _)).then(|(kind, payload)| {
            if kind == ResourceKind::Credential {
                assert_eq!(payload["inputs"]["bearer_token"], "sa-token");
                assert_eq!(payload["inputs"]["host"], "https://api.cluster-abc12.example.com:6443");
            }
            let (id, _) = existing(kind);
            Ok(resource(id, payload["name"].as_str().unwrap_or_default(), "pending"))
        });
        faux::when!(service.list_related(ResourceKind::JobTemplate, 21, _)).then_return(Ok(ResourceList::default()));
        faux::when!(service.associate(ResourceKind::JobTemplate, 21, _, 4)).then_return(Ok(()));

        let mut oc = Oc::faux();
        faux::when!(oc.create_token(_, _, _)).then_return(Ok("sa-token".to_string()));

        let summary = configure_aap(&context, &oc, &ensurer(service), &details, &mut env_file).expect("configured");

        assert_eq!(summary.failures(), 0);
        assert_eq!(summary.entries.len(), 5);
        assert_eq!(summary.id_of(ResourceKind::Credential), Some(4));
        assert!(summary.entries.iter().all(|e| matches!(
            e.status,
            SummaryStatus::Done {
                outcome: EnsureOutcome::Created,
                ..
            }
        )));
        assert_eq!(env_file.get("AAP_JOB_TEMPLATE_HELLO_WORLD_ID"), Some("21"));
        assert_eq!(env_file.get(AAP_HOST_ID), None);
    }

    #[test]
    fn test_optional_failures_do_not_stop_configuration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let details = details(None);
        let (context, mut env_file) = setup(dir.path(), &details);

        let mut oc = Oc::faux();
        faux::when!(oc.create_token(_, _, _)).then_return(Err(OcError::NoServiceAccountToken {
            namespace: "workshop-abc12".to_string(),
            service_account: "aap-deployer".to_string(),
        }));

        let summary = configure_aap(
            &context,
            &oc,
            &ensurer(service(vec![ResourceKind::Credential])),
            &details,
            &mut env_file,
        )
        .expect("configured");

        assert_eq!(summary.failures(), 1);
        assert_eq!(summary.id_of(ResourceKind::Credential), None);
        assert_eq!(summary.id_of(ResourceKind::JobTemplate), Some(21));
        assert_eq!(env_file.get(AAP_CREDENTIAL_ID), None);
        assert!(summary.to_string().contains("failed"));
    }

    #[test]
    fn test_required_failures_stop_configuration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let details = details(None);
        let (context, mut env_file) = setup(dir.path(), &details);

        let mut service = AapService::faux();
        faux::when!(service.ping()).then_return(Ok(PingResponse::default()));
        faux::when!(service.find(_, _)).then(|(kind, _)| match kind {
            ResourceKind::Organization => Ok(ResourceList {
                count: 1,
                results: vec![resource(1, "Default", "successful")],
            }),
            _ => Err(AapServiceError::HttpStatus {
                url: "https://aap.example.com/api/controller/v2/projects/".to_string(),
                status: 500,
                body: "".to_string(),
            }),
        });

        let err = configure_aap(&context, &Oc::faux(), &ensurer(service), &details, &mut env_file)
            .expect_err("project failure is fatal");

        assert!(matches!(
            err,
            WorkshopError::Ensure(EnsureError::Lookup {
                kind: ResourceKind::Project,
                ..
            })
        ));
        assert_eq!(env_file.get(AAP_ORGANIZATION_ID), Some("1"));
        assert_eq!(env_file.get(AAP_PROJECT_ID), None);
    }
}
