use std::fmt;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use url::Url;

use crate::constants::{AAP_API_PREFIX, HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};

#[derive(Clone, PartialEq)]
pub enum ControllerAuth {
    Token(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for ControllerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerAuth::Token(_) => f.write_str("ControllerAuth::Token(xxx)"),
            ControllerAuth::Basic { username, .. } => write!(f, "ControllerAuth::Basic({username}, xxx)"),
        }
    }
}

/// Controller resource collections, as named in the API paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[strum(serialize = "organization")]
    Organization,
    #[strum(serialize = "project")]
    Project,
    #[strum(serialize = "inventory")]
    Inventory,
    #[strum(serialize = "host")]
    Host,
    #[strum(serialize = "credential type")]
    CredentialType,
    #[strum(serialize = "credential")]
    Credential,
    #[strum(serialize = "execution environment")]
    ExecutionEnvironment,
    #[strum(serialize = "job template")]
    JobTemplate,
}

impl ResourceKind {
    pub fn api_path(&self) -> &'static str {
        match self {
            ResourceKind::Organization => "organizations",
            ResourceKind::Project => "projects",
            ResourceKind::Inventory => "inventories",
            ResourceKind::Host => "hosts",
            ResourceKind::CredentialType => "credential_types",
            ResourceKind::Credential => "credentials",
            ResourceKind::ExecutionEnvironment => "execution_environments",
            ResourceKind::JobTemplate => "job_templates",
        }
    }

    /// Everything else depends on these, configuration cannot go on without them.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            ResourceKind::Organization | ResourceKind::Project | ResourceKind::Inventory
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Only set on resources having a lifecycle, projects for instance.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    pub count: u64,
    #[serde(default)]
    pub results: Vec<ResourceSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub active_node: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectUpdateStarted {
    project_update: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AapServiceError {
    #[error("Cannot instantiate the controller client: {raw_error_message}")]
    CannotInstantiateClient { raw_error_message: String },
    #[error("Invalid controller URL `{url}`: {raw_error_message}")]
    InvalidUrl { url: String, raw_error_message: String },
    #[error("Controller unreachable at `{url}`: {raw_error_message}")]
    Unreachable { url: String, raw_error_message: String },
    #[error("Controller answered `{url}` with HTTP status {status}.")]
    HttpStatus { url: String, status: u16, body: String },
    #[error("Resource already exists: `{url}` answered {body}")]
    AlreadyExists { url: String, body: String },
    #[error("Invalid controller response from `{url}`: {raw_error_message}")]
    InvalidResponse { url: String, raw_error_message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AapConnection {
    pub url: Url,
    pub auth: ControllerAuth,
    pub verify_ssl: bool,
}

/// Blocking client of the controller REST API.
#[cfg_attr(test, faux::create)]
pub struct AapService {
    api_root: Url,
    http_client: Client,
}

#[cfg_attr(test, faux::methods)]
impl AapService {
    pub fn new(connection: &AapConnection) -> Result<Self, AapServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth_header = HeaderValue::from_str(&authorization_value(&connection.auth)).map_err(|e| {
            AapServiceError::CannotInstantiateClient {
                raw_error_message: format!("Cannot create auth header: {e}"),
            }
        })?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        if !connection.verify_ssl {
            warn!("TLS certificate verification is disabled for {}", connection.url);
        }
        let http_client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!connection.verify_ssl)
            .user_agent("workshop-engine")
            .build()
            .map_err(|e| AapServiceError::CannotInstantiateClient {
                raw_error_message: format!("Cannot create http client: {e}"),
            })?;

        Ok(AapService {
            api_root: api_root(&connection.url)?,
            http_client,
        })
    }

    pub fn ping(&self) -> Result<PingResponse, AapServiceError> {
        let url = join_url(&self.api_root, "ping/")?;
        send_json(self.http_client.get(url.clone()), &url)
    }

    /// Lists `kind` resources matching every `filters` pair, `name` included.
    pub fn find(&self, kind: ResourceKind, filters: Vec<(String, String)>) -> Result<ResourceList, AapServiceError> {
        let url = collection_url(&self.api_root, kind, &filters)?;
        send_json(self.http_client.get(url.clone()), &url)
    }

    pub fn get(&self, kind: ResourceKind, id: u64) -> Result<ResourceSummary, AapServiceError> {
        let url = join_url(&self.api_root, &format!("{}/{}/", kind.api_path(), id))?;
        send_json(self.http_client.get(url.clone()), &url)
    }

    pub fn create(&self, kind: ResourceKind, payload: serde_json::Value) -> Result<ResourceSummary, AapServiceError> {
        let url = collection_url(&self.api_root, kind, &[])?;
        send_json(self.http_client.post(url.clone()).json(&payload), &url)
    }

    /// Lists the resources attached to `kind/id` under `related`, e.g. the credentials of a job template.
    pub fn list_related(&self, kind: ResourceKind, id: u64, related: String) -> Result<ResourceList, AapServiceError> {
        let url = join_url(&self.api_root, &format!("{}/{}/{}/", kind.api_path(), id, related))?;
        send_json(self.http_client.get(url.clone()), &url)
    }

    pub fn associate(
        &self,
        kind: ResourceKind,
        id: u64,
        related: String,
        related_id: u64,
    ) -> Result<(), AapServiceError> {
        let url = join_url(&self.api_root, &format!("{}/{}/{}/", kind.api_path(), id, related))?;
        send(
            self.http_client
                .post(url.clone())
                .json(&serde_json::json!({ "id": related_id })),
            &url,
        )
        .map(|_| ())
    }

    /// Starts a project synchronization, returns the id of the project update job.
    pub fn trigger_project_update(&self, project_id: u64) -> Result<u64, AapServiceError> {
        let url = join_url(&self.api_root, &format!("projects/{project_id}/update/"))?;
        let update: ProjectUpdateStarted = send_json(self.http_client.post(url.clone()), &url)?;
        Ok(update.project_update)
    }

    pub fn get_project_update(&self, update_id: u64) -> Result<ResourceSummary, AapServiceError> {
        let url = join_url(&self.api_root, &format!("project_updates/{update_id}/"))?;
        send_json(self.http_client.get(url.clone()), &url)
    }
}

fn authorization_value(auth: &ControllerAuth) -> String {
    use base64::Engine;
    match auth {
        ControllerAuth::Token(token) => format!("Bearer {token}"),
        ControllerAuth::Basic { username, password } => format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"))
        ),
    }
}

fn api_root(controller_url: &Url) -> Result<Url, AapServiceError> {
    let root = format!(
        "{}{}/",
        controller_url.as_str().trim_end_matches('/'),
        AAP_API_PREFIX
    );
    Url::parse(&root).map_err(|e| AapServiceError::InvalidUrl {
        url: root,
        raw_error_message: e.to_string(),
    })
}

fn join_url(api_root: &Url, path: &str) -> Result<Url, AapServiceError> {
    api_root.join(path).map_err(|e| AapServiceError::InvalidUrl {
        url: format!("{api_root}{path}"),
        raw_error_message: e.to_string(),
    })
}

fn collection_url(api_root: &Url, kind: ResourceKind, filters: &[(String, String)]) -> Result<Url, AapServiceError> {
    let mut url = join_url(api_root, &format!("{}/", kind.api_path()))?;
    if !filters.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(filters.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    Ok(url)
}

fn send(request: RequestBuilder, url: &Url) -> Result<String, AapServiceError> {
    let response = request.send().map_err(|e| AapServiceError::Unreachable {
        url: url.to_string(),
        raw_error_message: e.to_string(),
    })?;

    let status = response.status();
    let body = response.text().map_err(|e| AapServiceError::InvalidResponse {
        url: url.to_string(),
        raw_error_message: e.to_string(),
    })?;

    match status {
        s if s.is_success() => Ok(body),
        s if s == reqwest::StatusCode::BAD_REQUEST && is_already_exists(&body) => Err(AapServiceError::AlreadyExists {
            url: url.to_string(),
            body,
        }),
        s => {
            debug!("{} answered {}: {}", url, s, body);
            Err(AapServiceError::HttpStatus {
                url: url.to_string(),
                status: s.as_u16(),
                body,
            })
        }
    }
}

fn send_json<T>(request: RequestBuilder, url: &Url) -> Result<T, AapServiceError>
where
    T: DeserializeOwned,
{
    let body = send(request, url)?;
    parse_body(&body, url)
}

fn parse_body<T>(body: &str, url: &Url) -> Result<T, AapServiceError>
where
    T: DeserializeOwned,
{
    serde_json::from_str::<T>(body).map_err(|e| {
        error!(
            "json parsing error on {:?} for {}: {:?}",
            std::any::type_name::<T>(),
            url,
            e
        );
        AapServiceError::InvalidResponse {
            url: url.to_string(),
            raw_error_message: e.to_string(),
        }
    })
}

// uniqueness violations come back as a 400 with a field or `__all__` message
fn is_already_exists(body: &str) -> bool {
    body.contains("already exists")
}
