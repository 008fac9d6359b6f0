use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose;
use serde::de::DeserializeOwned;

use crate::cmd::command::{
    CommandError, CommandKiller, CommandOutput, WorkshopCommand, does_binary_exist, exec_and_capture, mask_secrets,
};
use crate::cmd::structs::{KubernetesDeployment, KubernetesList, KubernetesNamespace, KubernetesSecret};
use crate::constants::KUBECONFIG;

const DEFAULT_OC_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const SERVICE_ACCOUNT_TOKEN_SECRET_TYPE: &str = "kubernetes.io/service-account-token";
const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Cluster command line client. `oc` is preferred, `kubectl` can do everything but login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
pub enum ClusterCli {
    #[strum(serialize = "oc")]
    Oc,
    #[strum(serialize = "kubectl")]
    Kubectl,
}

impl ClusterCli {
    pub fn detect() -> Option<ClusterCli> {
        [ClusterCli::Oc, ClusterCli::Kubectl]
            .into_iter()
            .find(|cli| does_binary_exist(cli.as_ref()))
    }
}

#[derive(Clone, PartialEq)]
pub enum ClusterAuth {
    Token(String),
    Password { username: String, password: String },
}

impl fmt::Debug for ClusterAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterAuth::Token(_) => f.write_str("ClusterAuth::Token(xxx)"),
            ClusterAuth::Password { username, .. } => write!(f, "ClusterAuth::Password({username}, xxx)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterResource {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ClusterResource {
    pub fn namespaced(kind: &str, name: &str, namespace: &str) -> Self {
        ClusterResource {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }
}

impl fmt::Display for ClusterResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{} in namespace {}", self.kind, self.name, namespace),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleBindingSubject {
    ServiceAccount { namespace: String, name: String },
    User(String),
}

impl RoleBindingSubject {
    /// Identity to impersonate with `--as`.
    pub fn impersonation_name(&self) -> String {
        match self {
            RoleBindingSubject::ServiceAccount { namespace, name } => {
                format!("system:serviceaccount:{namespace}:{name}")
            }
            RoleBindingSubject::User(user) => user.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessReview {
    pub verb: String,
    pub resource: String,
    pub namespace: Option<String>,
    pub subject: RoleBindingSubject,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OcError {
    #[error("Login requires the `oc` binary, `{cli}` cannot authenticate against OpenShift.")]
    LoginUnsupported { cli: String },
    #[error("Command `{command}` terminated with an error: {raw_error_message}")]
    CmdError { command: String, raw_error_message: String },
    #[error("Command `{command}` was aborted: {raw_error_message}")]
    Aborted { command: String, raw_error_message: String },
    #[error("Command `{command}` generated an invalid output: {raw_error_message}")]
    InvalidCmdOutputError { command: String, raw_error_message: String },
    #[error("No token can be issued for service account `{service_account}` in namespace `{namespace}`.")]
    NoServiceAccountToken { namespace: String, service_account: String },
}

/// Wrapper around the `oc`/`kubectl` binaries.
#[cfg_attr(test, faux::create)]
pub struct Oc {
    cli: ClusterCli,
    kubeconfig: Option<PathBuf>,
}

#[cfg_attr(test, faux::methods)]
impl Oc {
    pub fn new(cli: ClusterCli, kubeconfig: Option<PathBuf>) -> Self {
        Oc { cli, kubeconfig }
    }

    pub fn cli(&self) -> ClusterCli {
        self.cli
    }

    pub fn login(&self, api_url: &str, auth: &ClusterAuth, insecure_skip_tls_verify: bool) -> Result<(), OcError> {
        if self.cli != ClusterCli::Oc {
            return Err(OcError::LoginUnsupported {
                cli: self.cli.to_string(),
            });
        }

        let server = format!("--server={api_url}");
        let insecure = format!("--insecure-skip-tls-verify={insecure_skip_tls_verify}");
        let (args, secrets): (Vec<String>, Vec<String>) = match auth {
            ClusterAuth::Token(token) => (
                vec!["login".to_string(), server, format!("--token={token}"), insecure],
                vec![token.to_string()],
            ),
            ClusterAuth::Password { username, password } => (
                vec![
                    "login".to_string(),
                    server,
                    "-u".to_string(),
                    username.to_string(),
                    "-p".to_string(),
                    password.to_string(),
                    insecure,
                ],
                vec![password.to_string()],
            ),
        };

        let args = args.iter().map(|a| a.as_str()).collect::<Vec<&str>>();
        let secrets = secrets.iter().map(|s| s.as_str()).collect::<Vec<&str>>();
        oc_exec_checked(self.cli, self.kubeconfig.as_deref(), &args, &secrets)?;

        Ok(())
    }

    pub fn whoami(&self) -> Result<String, OcError> {
        let output = match self.cli {
            ClusterCli::Oc => oc_exec_checked(self.cli, self.kubeconfig.as_deref(), &["whoami"], &[])?,
            ClusterCli::Kubectl => oc_exec_checked(
                self.cli,
                self.kubeconfig.as_deref(),
                &["auth", "whoami", "-o", "jsonpath={.status.userInfo.username}"],
                &[],
            )?,
        };

        let user = output.stdout_joined("").trim().to_string();
        if user.is_empty() {
            return Err(OcError::InvalidCmdOutputError {
                command: format!("{} whoami", self.cli),
                raw_error_message: "empty user name".to_string(),
            });
        }

        Ok(user)
    }

    pub fn get_namespace(&self, name: &str) -> Result<Option<KubernetesNamespace>, OcError> {
        match oc_exec_json::<KubernetesNamespace>(
            self.cli,
            self.kubeconfig.as_deref(),
            &["get", "namespace", name, "-o", "json"],
        ) {
            Ok(namespace) => Ok(Some(namespace)),
            Err(OcError::CmdError { raw_error_message, .. }) if is_not_found(&raw_error_message) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn create_namespace(&self, name: &str) -> Result<(), OcError> {
        oc_exec_checked(self.cli, self.kubeconfig.as_deref(), &["create", "namespace", name], &[])?;
        Ok(())
    }

    pub fn label_namespace(&self, name: &str, labels: Vec<(String, String)>) -> Result<(), OcError> {
        if labels.is_empty() {
            return Ok(());
        }

        let labels = labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<String>>();
        let mut args = vec!["label", "namespace", name, "--overwrite"];
        args.extend(labels.iter().map(|l| l.as_str()));

        oc_exec_checked(self.cli, self.kubeconfig.as_deref(), &args, &[])?;
        Ok(())
    }

    pub fn resource_exists(&self, resource: &ClusterResource) -> Result<bool, OcError> {
        let mut args = vec!["get", resource.kind.as_str(), resource.name.as_str(), "-o", "name"];
        if let Some(namespace) = &resource.namespace {
            args.push("-n");
            args.push(namespace.as_str());
        }

        match oc_exec_checked(self.cli, self.kubeconfig.as_deref(), &args, &[]) {
            Ok(_) => Ok(true),
            Err(OcError::CmdError { raw_error_message, .. }) if is_not_found(&raw_error_message) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn create_service_account(&self, namespace: &str, name: &str) -> Result<(), OcError> {
        oc_exec_checked(
            self.cli,
            self.kubeconfig.as_deref(),
            &["create", "serviceaccount", name, "-n", namespace],
            &[],
        )?;
        Ok(())
    }

    pub fn create_role_binding(
        &self,
        namespace: &str,
        name: &str,
        cluster_role: &str,
        subject: &RoleBindingSubject,
    ) -> Result<(), OcError> {
        let cluster_role = format!("--clusterrole={cluster_role}");
        let subject = match subject {
            RoleBindingSubject::ServiceAccount {
                namespace: sa_namespace,
                name: sa_name,
            } => format!("--serviceaccount={sa_namespace}:{sa_name}"),
            RoleBindingSubject::User(user) => format!("--user={user}"),
        };

        oc_exec_checked(
            self.cli,
            self.kubeconfig.as_deref(),
            &["create", "rolebinding", name, &cluster_role, &subject, "-n", namespace],
            &[],
        )?;
        Ok(())
    }

    /// Issues a bearer token for a service account. Falls back on the legacy token secret for
    /// clusters older than Kubernetes 1.24 which don't know `create token`.
    pub fn create_token(&self, namespace: &str, service_account: &str, duration: &str) -> Result<String, OcError> {
        let duration = format!("--duration={duration}");
        let (output, result) = oc_exec(
            self.cli,
            self.kubeconfig.as_deref(),
            &["create", "token", service_account, "-n", namespace, &duration],
            &[],
        );

        match result {
            Ok(_) => {
                let token = output.stdout_joined("").trim().to_string();
                if token.is_empty() {
                    return Err(OcError::NoServiceAccountToken {
                        namespace: namespace.to_string(),
                        service_account: service_account.to_string(),
                    });
                }
                Ok(token)
            }
            Err(_) if output.stderr_joined().contains("unknown command") => {
                warn!("`{} create token` is not supported, reading legacy token secret", self.cli);
                let secrets: KubernetesList<KubernetesSecret> = oc_exec_json(
                    self.cli,
                    self.kubeconfig.as_deref(),
                    &["get", "secrets", "-n", namespace, "-o", "json"],
                )?;
                legacy_service_account_token(&secrets.items, namespace, service_account)
            }
            Err(err) => Err(to_oc_error(self.cli, &["create", "token", service_account], &[], &output, err)),
        }
    }

    pub fn can_i(&self, review: AccessReview) -> Result<bool, OcError> {
        let as_subject = format!("--as={}", review.subject.impersonation_name());
        let mut args = vec!["auth", "can-i", review.verb.as_str(), review.resource.as_str(), as_subject.as_str()];
        if let Some(namespace) = &review.namespace {
            args.push("-n");
            args.push(namespace.as_str());
        }

        // `can-i` answers "no" with a non zero exit status
        let (output, result) = oc_exec(self.cli, self.kubeconfig.as_deref(), &args, &[]);
        match output.stdout_joined("").trim() {
            "yes" => Ok(true),
            "no" => Ok(false),
            other => match result {
                Err(err) => Err(to_oc_error(self.cli, &args, &[], &output, err)),
                Ok(_) => Err(OcError::InvalidCmdOutputError {
                    command: format!("{} {}", self.cli, args.join(" ")),
                    raw_error_message: format!("unexpected answer `{other}`"),
                }),
            },
        }
    }

    pub fn get_deployments(&self, namespace: &str) -> Result<Vec<KubernetesDeployment>, OcError> {
        let deployments: KubernetesList<KubernetesDeployment> = oc_exec_json(
            self.cli,
            self.kubeconfig.as_deref(),
            &["get", "deployments", "-n", namespace, "-o", "json"],
        )?;

        Ok(deployments.items)
    }
}

fn is_not_found(raw_error_message: &str) -> bool {
    raw_error_message.contains("NotFound") || raw_error_message.contains("not found")
}

fn legacy_service_account_token(
    secrets: &[KubernetesSecret],
    namespace: &str,
    service_account: &str,
) -> Result<String, OcError> {
    let no_token = || OcError::NoServiceAccountToken {
        namespace: namespace.to_string(),
        service_account: service_account.to_string(),
    };

    let encoded = secrets
        .iter()
        .filter(|s| s.secret_type == SERVICE_ACCOUNT_TOKEN_SECRET_TYPE)
        .filter(|s| s.metadata.annotation(SERVICE_ACCOUNT_NAME_ANNOTATION) == Some(service_account))
        .find_map(|s| s.data.get("token"))
        .ok_or_else(no_token)?;

    let decoded = general_purpose::STANDARD.decode(encoded).map_err(|_| no_token())?;
    String::from_utf8(decoded).map_err(|_| no_token())
}

fn oc_exec(
    cli: ClusterCli,
    kubeconfig: Option<&Path>,
    args: &[&str],
    secrets: &[&str],
) -> (CommandOutput, Result<(), CommandError>) {
    let kubeconfig = kubeconfig.and_then(|p| p.to_str()).unwrap_or_default();
    let envs: Vec<(&str, &str)> = match kubeconfig.is_empty() {
        true => vec![],
        false => vec![(KUBECONFIG, kubeconfig)],
    };

    let mut cmd = WorkshopCommand::new(cli.as_ref(), args, &envs).with_secrets(secrets);
    exec_and_capture(&mut cmd, &CommandKiller::from_timeout(DEFAULT_OC_TIMEOUT))
}

fn oc_exec_checked(
    cli: ClusterCli,
    kubeconfig: Option<&Path>,
    args: &[&str],
    secrets: &[&str],
) -> Result<CommandOutput, OcError> {
    let (output, result) = oc_exec(cli, kubeconfig, args, secrets);
    match result {
        Ok(_) => Ok(output),
        Err(err) => Err(to_oc_error(cli, args, secrets, &output, err)),
    }
}

fn oc_exec_json<T>(cli: ClusterCli, kubeconfig: Option<&Path>, args: &[&str]) -> Result<T, OcError>
where
    T: DeserializeOwned,
{
    let output = oc_exec_checked(cli, kubeconfig, args, &[])?;
    let output_string = output.stdout_joined("");

    serde_json::from_str::<T>(&output_string).map_err(|err| {
        error!(
            "json parsing error on {:?} on command: {} {}. {:?}",
            std::any::type_name::<T>(),
            cli,
            args.join(" "),
            err
        );
        OcError::InvalidCmdOutputError {
            command: format!("{} {}", cli, args.join(" ")),
            raw_error_message: err.to_string(),
        }
    })
}

fn to_oc_error(cli: ClusterCli, args: &[&str], secrets: &[&str], output: &CommandOutput, err: CommandError) -> OcError {
    let secrets = secrets.iter().map(|s| s.to_string()).collect::<Vec<String>>();
    let command = mask_secrets(&format!("{} {}", cli, args.join(" ")), &secrets);
    match err {
        CommandError::TimeoutError(msg) => OcError::Aborted {
            command,
            raw_error_message: msg,
        },
        CommandError::ExitStatusError(status) => OcError::CmdError {
            command,
            raw_error_message: match output.stderr.is_empty() {
                true => status.to_string(),
                false => output.stderr_joined(),
            },
        },
        CommandError::ExecutionError(err) => OcError::CmdError {
            command,
            raw_error_message: err.to_string(),
        },
    }
}
