pub mod aap;
pub mod cluster;
pub mod ee;
pub mod playbook;

use std::path::Path;

use crate::cmd::oc::{ClusterCli, Oc};
use crate::errors::WorkshopError;
use crate::io_models::context::Context;
use crate::io_models::details::WorkshopDetails;
use crate::io_models::env_file::EnvFile;
use crate::logger::{Step, step_span};
use crate::models::aap::ResourceEnsurer;
use crate::services::aap::{AapConnection, AapService};

/// Parses the details file and writes the environment file.
pub fn init(context: &Context, details_path: &Path, force: bool) -> Result<EnvFile, WorkshopError> {
    let details = WorkshopDetails::from_file(details_path)?;
    let _span = step_span(&details.guid, Step::Init).entered();
    info!("Details file {} parsed: {}", details_path.display(), details);

    let namespace = context.config().base_namespace(&details.guid);
    let env_file = EnvFile::create(context.env_file_path(), &details.env_entries(&namespace), force)?;

    Ok(env_file)
}

/// Environment file written at init, with the details it holds.
pub fn load_workshop(context: &Context) -> Result<(EnvFile, WorkshopDetails), WorkshopError> {
    let env_file = context.load_env_file()?;
    let details = WorkshopDetails::from_env_file(&env_file)?;

    Ok((env_file, details))
}

/// `oc` client, `kubectl` when `oc` is not installed.
pub fn cluster_client(context: &Context) -> Result<Oc, WorkshopError> {
    let cli = ClusterCli::detect().ok_or_else(|| WorkshopError::MissingPrerequisite {
        binary: ClusterCli::Oc.to_string(),
    })?;
    if cli != ClusterCli::Oc {
        warn!("`oc` not found, falling back on `{}`", cli);
    }

    Ok(Oc::new(cli, context.kubeconfig().map(|p| p.to_path_buf())))
}

pub fn aap_connection(context: &Context, details: &WorkshopDetails) -> AapConnection {
    AapConnection {
        url: details.controller.url.clone(),
        auth: details.controller.auth.clone(),
        verify_ssl: context.config().verify_ssl,
    }
}

pub fn resource_ensurer(context: &Context, details: &WorkshopDetails) -> Result<ResourceEnsurer, WorkshopError> {
    let service = AapService::new(&aap_connection(context, details))?;
    Ok(ResourceEnsurer::new(service))
}

/// init, login, setup-cluster and configure-aap in a row.
pub fn provision(context: &Context, details_path: &Path, force: bool) -> Result<aap::AapSummary, WorkshopError> {
    init(context, details_path, force)?;
    let (mut env_file, details) = load_workshop(context)?;

    let oc = cluster_client(context)?;
    cluster::login(context, &oc, &details)?;
    let cluster_summary = cluster::setup_cluster(context, &oc, &details.guid)?;
    info!("{}", cluster_summary);

    let ensurer = resource_ensurer(context, &details)?;
    aap::configure_aap(context, &oc, &ensurer, &details, &mut env_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{OCP_API_URL, WORKSHOP_GUID, WORKSHOP_NAMESPACE};
    use crate::errors::WorkshopError;
    use crate::io_models::env_file::EnvFileError;
    use crate::io_models::workshop::WorkshopConfig;
    use std::fs;

    const DETAILS: &str = "GUID: abc12\nOpenShift API URL: https://api.cluster-abc12.example.com:6443\n\
                           OpenShift Token: sha256~tok\nAAP URL: https://aap.example.com\nAAP Token: aaptok\n";

    #[test]
    fn test_init_writes_env_file_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let details_path = dir.path().join("details.txt");
        fs::write(&details_path, DETAILS).expect("fixture written");
        let context = Context::new(
            dir.path().to_path_buf(),
            ".env".into(),
            None,
            WorkshopConfig::default(),
        );

        let env_file = init(&context, &details_path, false).expect("init succeeded");

        assert_eq!(env_file.get(WORKSHOP_GUID), Some("abc12"));
        assert_eq!(env_file.get(WORKSHOP_NAMESPACE), Some("workshop-abc12"));
        assert_eq!(env_file.get(OCP_API_URL), Some("https://api.cluster-abc12.example.com:6443"));
        assert!(matches!(
            init(&context, &details_path, false),
            Err(WorkshopError::EnvFile(EnvFileError::AlreadyExists { .. }))
        ));

        let (_, details) = load_workshop(&context).expect("workshop loaded");
        assert_eq!(details.guid, "abc12");
    }
}
