pub mod checks;
pub mod report;

use std::time::Duration;

use crate::cmd::oc::Oc;
use crate::constants::{DEFAULT_ENVIRONMENT, MAINFRAME_HOST, TCP_CONNECT_TIMEOUT_SECS, WORKSHOP_GUID, WORKSHOP_NAMESPACE};
use crate::errors::WorkshopError;
use crate::io_models::context::Context;
use crate::io_models::details::{HostAddress, WorkshopDetails};
use crate::io_models::env_file::EnvFile;
use crate::logger::{Step, step_span};
use crate::provisioning::{aap_connection, cluster_client};
use crate::services::aap::AapService;
use crate::validation::report::ValidationReport;

/// `validate <namespace> [environment] [mainframe-host]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateRequest {
    pub namespace: String,
    pub environment: Option<String>,
    pub mainframe_host: Option<String>,
}

/// What the checks run against, arguments completed with the `.env` values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationTarget {
    pub guid: String,
    pub namespace: String,
    pub environment: String,
    /// Namespace holding the workshop service account.
    pub base_namespace: String,
    pub mainframe_host: Option<HostAddress>,
}

impl ValidationTarget {
    pub fn new(context: &Context, env_file: &EnvFile, request: &ValidateRequest) -> Result<Self, WorkshopError> {
        let guid = env_file.require(WORKSHOP_GUID)?.to_string();
        let base_namespace = env_file
            .get(WORKSHOP_NAMESPACE)
            .map(|ns| ns.to_string())
            .unwrap_or_else(|| context.config().base_namespace(&guid));

        Ok(ValidationTarget {
            namespace: request.namespace.to_string(),
            environment: request
                .environment
                .clone()
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            base_namespace,
            mainframe_host: request
                .mainframe_host
                .as_deref()
                .or_else(|| env_file.get(MAINFRAME_HOST))
                .map(HostAddress::parse),
            guid,
        })
    }
}

/// Runs every check, a failing check never stops the others.
pub fn run_checks(
    context: &Context,
    oc: &Oc,
    aap: Result<&AapService, String>,
    env_file: &EnvFile,
    target: &ValidationTarget,
) -> ValidationReport {
    let config = context.config();
    let mut report = ValidationReport::new(&target.namespace, &target.environment);

    report.extend(checks::cluster_checks(oc));
    report.extend(checks::namespace_checks(oc, target));
    report.extend(checks::rbac_checks(oc, config, target));
    report.extend(checks::workload_checks(oc, target));
    report.extend(checks::aap_checks(aap, env_file, config, target));
    report.extend(checks::connectivity_checks(
        target,
        Duration::from_secs(TCP_CONNECT_TIMEOUT_SECS),
    ));

    report
}

/// Validates the live workshop environment. Missing prerequisites are errors, everything else
/// ends up in the report.
pub fn validate(context: &Context, request: &ValidateRequest) -> Result<ValidationReport, WorkshopError> {
    let oc = cluster_client(context)?;
    let env_file = context.load_env_file()?;
    let target = ValidationTarget::new(context, &env_file, request)?;
    let _span = step_span(&target.guid, Step::Validate).entered();
    info!(
        "Validating namespace {} (environment {})",
        target.namespace, target.environment
    );

    let aap = WorkshopDetails::from_env_file(&env_file)
        .map_err(|e| e.to_string())
        .and_then(|details| AapService::new(&aap_connection(context, &details)).map_err(|e| e.to_string()));
    let report = run_checks(context, &oc, aap.as_ref().map_err(|e| e.to_string()), &env_file, &target);

    let tally = report.tally();
    info!(
        "Validation done: {} passed, {} failed, {} warning(s), {} skipped",
        tally.passed, tally.failed, tally.warnings, tally.skipped
    );

    Ok(report)
}
