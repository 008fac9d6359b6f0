use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::cmd::oc::ClusterAuth;
use crate::constants::{
    AAP_PASSWORD, AAP_TOKEN, AAP_URL, AAP_USERNAME, MAINFRAME_HOST, OCP_API_URL, OCP_CONSOLE_URL, OCP_PASSWORD,
    OCP_TOKEN, OCP_USERNAME, WORKSHOP_GUID, WORKSHOP_NAMESPACE,
};
use crate::io_models::env_file::EnvFile;
use crate::services::aap::ControllerAuth;

static CLUSTER_GUID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\.)cluster-([a-z0-9]+)\.").expect("cluster guid regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum DetailsField {
    #[strum(serialize = "OpenShift API URL")]
    OcpApiUrl,
    #[strum(serialize = "OpenShift Console URL")]
    OcpConsoleUrl,
    #[strum(serialize = "OpenShift Username")]
    OcpUsername,
    #[strum(serialize = "OpenShift Password")]
    OcpPassword,
    #[strum(serialize = "OpenShift Token")]
    OcpToken,
    #[strum(serialize = "Automation Controller URL")]
    AapUrl,
    #[strum(serialize = "Automation Controller Username")]
    AapUsername,
    #[strum(serialize = "Automation Controller Password")]
    AapPassword,
    #[strum(serialize = "Automation Controller Token")]
    AapToken,
    #[strum(serialize = "GUID")]
    Guid,
    #[strum(serialize = "Mainframe Host")]
    MainframeHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    OpenShift,
    Controller,
    Mainframe,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetailsError {
    #[error("Cannot read details file `{path}`: {raw_error_message}")]
    CannotRead { path: String, raw_error_message: String },
    #[error("Label `{label}` at line {line} has no value.")]
    MissingValue { label: String, line: usize },
    #[error("Missing required field `{field}` in details file.")]
    MissingField { field: DetailsField },
    #[error("Missing credentials for {target}: a token or a username and a password are required.")]
    MissingCredentials { target: String },
    #[error("Invalid URL `{value}` for `{field}`: {raw_error_message}")]
    InvalidUrl {
        field: DetailsField,
        value: String,
        raw_error_message: String,
    },
    #[error("Cannot determine the workshop GUID: no `GUID` field and no `cluster-<guid>` in the cluster URLs.")]
    MissingGuid,
}

/// Values found in a details file, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDetails {
    values: HashMap<DetailsField, String>,
}

impl RawDetails {
    pub fn get(&self, field: DetailsField) -> Option<&str> {
        self.values.get(&field).map(|v| v.as_str())
    }

    fn insert(&mut self, field: DetailsField, value: &str, line: usize) {
        if self.values.contains_key(&field) {
            warn!("Field `{}` is defined twice, ignoring the value at line {}", field, line);
            return;
        }
        self.values.insert(field, value.to_string());
    }
}

fn normalize(label: &str) -> String {
    label
        .trim()
        .trim_end_matches(':')
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn section_of(normalized: &str) -> Option<Section> {
    match normalized {
        "openshift" | "openshift cluster" | "ocp" | "openshift container platform" => Some(Section::OpenShift),
        "automation controller" | "ansible automation platform" | "aap" | "controller" | "aap controller" => {
            Some(Section::Controller)
        }
        "mainframe" | "z/os" | "zos" => Some(Section::Mainframe),
        _ => None,
    }
}

fn field_in_section(section: Section, label: &str) -> Option<DetailsField> {
    match (section, label) {
        (Section::OpenShift, "url" | "api url" | "api" | "api for command line 'oc' client") => {
            Some(DetailsField::OcpApiUrl)
        }
        (Section::OpenShift, "console url" | "console" | "web console") => Some(DetailsField::OcpConsoleUrl),
        (Section::OpenShift, "username" | "user" | "admin user") => Some(DetailsField::OcpUsername),
        (Section::OpenShift, "password" | "admin password") => Some(DetailsField::OcpPassword),
        (Section::OpenShift, "token" | "api token") => Some(DetailsField::OcpToken),
        (Section::Controller, "url" | "web ui" | "console url" | "console") => Some(DetailsField::AapUrl),
        (Section::Controller, "username" | "user" | "admin user") => Some(DetailsField::AapUsername),
        (Section::Controller, "password" | "admin password") => Some(DetailsField::AapPassword),
        (Section::Controller, "token" | "api token" | "oauth token") => Some(DetailsField::AapToken),
        (Section::Mainframe, "host" | "hostname" | "url" | "address") => Some(DetailsField::MainframeHost),
        _ => None,
    }
}

/// Maps a label to a field. An explicit prefix (`OpenShift ...`, `AAP ...`) wins over the
/// section the label appears in, generic labels outside any section belong to the cluster.
fn resolve_label(label: &str, current_section: Option<Section>) -> Option<DetailsField> {
    let normalized = normalize(label);
    if normalized == "guid" || normalized == "workshop guid" {
        return Some(DetailsField::Guid);
    }

    const PREFIXES: [(&str, Section); 7] = [
        ("openshift ", Section::OpenShift),
        ("ocp ", Section::OpenShift),
        ("automation controller ", Section::Controller),
        ("aap controller ", Section::Controller),
        ("aap ", Section::Controller),
        ("controller ", Section::Controller),
        ("mainframe ", Section::Mainframe),
    ];
    for (prefix, section) in PREFIXES {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            if let Some(field) = field_in_section(section, rest) {
                return Some(field);
            }
        }
    }

    field_in_section(current_section.unwrap_or(Section::OpenShift), &normalized)
}

/// Parses the `Label:` / value-on-next-line format. `Label: value` on one line is accepted too.
pub fn parse_details(content: &str) -> Result<RawDetails, DetailsError> {
    let mut details = RawDetails::default();
    let mut section: Option<Section> = None;
    let mut pending_label: Option<(String, usize)> = None;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_number = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        // a value following its label is taken as is, generated passwords may start with `#`
        if let Some((label, label_line)) = pending_label.take() {
            match resolve_label(&label, section) {
                Some(field) => details.insert(field, line, label_line),
                None => debug!("Ignoring unknown label `{}` at line {}", label, label_line),
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if let Some(label) = line.strip_suffix(':') {
            match section_of(&normalize(label)) {
                Some(s) => section = Some(s),
                None => pending_label = Some((label.to_string(), line_number)),
            }
            continue;
        }

        if let Some((label, value)) = line.split_once(": ") {
            if let Some(field) = resolve_label(label, section) {
                details.insert(field, value.trim(), line_number);
                continue;
            }
        }

        match section_of(&normalize(line)) {
            Some(s) => section = Some(s),
            None => debug!("Ignoring line {} of details file", line_number),
        }
    }

    if let Some((label, line)) = pending_label {
        return Err(DetailsError::MissingValue { label, line });
    }

    Ok(details)
}

pub fn guid_from_cluster_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    CLUSTER_GUID_RE
        .captures(host)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterDetails {
    pub api_url: Url,
    pub console_url: Option<Url>,
    pub auth: ClusterAuth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerDetails {
    pub url: Url,
    pub auth: ControllerAuth,
}

/// Validated workshop credentials, from a details file or from a `.env` file.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkshopDetails {
    pub guid: String,
    pub cluster: ClusterDetails,
    pub controller: ControllerDetails,
    pub mainframe_host: Option<String>,
}

impl fmt::Display for WorkshopDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workshop {} (cluster {}, controller {})",
            self.guid, self.cluster.api_url, self.controller.url
        )
    }
}

fn parse_url(field: DetailsField, value: &str) -> Result<Url, DetailsError> {
    Url::parse(value).map_err(|e| DetailsError::InvalidUrl {
        field,
        value: value.to_string(),
        raw_error_message: e.to_string(),
    })
}

impl WorkshopDetails {
    pub fn from_file(path: &Path) -> Result<Self, DetailsError> {
        let content = std::fs::read_to_string(path).map_err(|e| DetailsError::CannotRead {
            path: path.display().to_string(),
            raw_error_message: e.to_string(),
        })?;

        Self::from_raw(&parse_details(&content)?)
    }

    pub fn from_raw(raw: &RawDetails) -> Result<Self, DetailsError> {
        Self::from_lookup(&|field| raw.get(field).map(|v| v.to_string()))
    }

    /// Rebuilds the details from the values written at init.
    pub fn from_env_file(env_file: &EnvFile) -> Result<Self, DetailsError> {
        let key = |field: DetailsField| match field {
            DetailsField::OcpApiUrl => OCP_API_URL,
            DetailsField::OcpConsoleUrl => OCP_CONSOLE_URL,
            DetailsField::OcpUsername => OCP_USERNAME,
            DetailsField::OcpPassword => OCP_PASSWORD,
            DetailsField::OcpToken => OCP_TOKEN,
            DetailsField::AapUrl => AAP_URL,
            DetailsField::AapUsername => AAP_USERNAME,
            DetailsField::AapPassword => AAP_PASSWORD,
            DetailsField::AapToken => AAP_TOKEN,
            DetailsField::Guid => WORKSHOP_GUID,
            DetailsField::MainframeHost => MAINFRAME_HOST,
        };

        Self::from_lookup(&|field| env_file.get(key(field)).map(|v| v.to_string()))
    }

    fn from_lookup(lookup: &dyn Fn(DetailsField) -> Option<String>) -> Result<Self, DetailsError> {
        let get = |field: DetailsField| lookup(field).filter(|v| !v.trim().is_empty());

        let api_url = get(DetailsField::OcpApiUrl).ok_or(DetailsError::MissingField {
            field: DetailsField::OcpApiUrl,
        })?;
        let api_url = parse_url(DetailsField::OcpApiUrl, &api_url)?;
        let console_url = get(DetailsField::OcpConsoleUrl)
            .map(|v| parse_url(DetailsField::OcpConsoleUrl, &v))
            .transpose()?;
        let cluster_auth = match (
            get(DetailsField::OcpToken),
            get(DetailsField::OcpUsername),
            get(DetailsField::OcpPassword),
        ) {
            (Some(token), _, _) => ClusterAuth::Token(token),
            (None, Some(username), Some(password)) => ClusterAuth::Password { username, password },
            _ => {
                return Err(DetailsError::MissingCredentials {
                    target: "the OpenShift cluster".to_string(),
                });
            }
        };

        let controller_url = get(DetailsField::AapUrl).ok_or(DetailsError::MissingField {
            field: DetailsField::AapUrl,
        })?;
        let controller_url = parse_url(DetailsField::AapUrl, &controller_url)?;
        let controller_auth = match (
            get(DetailsField::AapToken),
            get(DetailsField::AapUsername),
            get(DetailsField::AapPassword),
        ) {
            (Some(token), _, _) => ControllerAuth::Token(token),
            (None, Some(username), Some(password)) => ControllerAuth::Basic { username, password },
            _ => {
                return Err(DetailsError::MissingCredentials {
                    target: "the Automation Controller".to_string(),
                });
            }
        };

        let guid = get(DetailsField::Guid)
            .map(|g| g.trim().to_lowercase())
            .or_else(|| guid_from_cluster_url(&api_url))
            .or_else(|| console_url.as_ref().and_then(guid_from_cluster_url))
            .ok_or(DetailsError::MissingGuid)?;

        Ok(WorkshopDetails {
            guid,
            cluster: ClusterDetails {
                api_url,
                console_url,
                auth: cluster_auth,
            },
            controller: ControllerDetails {
                url: controller_url,
                auth: controller_auth,
            },
            mainframe_host: get(DetailsField::MainframeHost),
        })
    }

    /// Key/value pairs written to the `.env` file at init. Absent optional values are omitted.
    pub fn env_entries(&self, workshop_namespace: &str) -> Vec<(&'static str, String)> {
        let mut entries = vec![(OCP_API_URL, url_to_string(&self.cluster.api_url))];
        if let Some(console_url) = &self.cluster.console_url {
            entries.push((OCP_CONSOLE_URL, url_to_string(console_url)));
        }
        match &self.cluster.auth {
            ClusterAuth::Token(token) => entries.push((OCP_TOKEN, token.to_string())),
            ClusterAuth::Password { username, password } => {
                entries.push((OCP_USERNAME, username.to_string()));
                entries.push((OCP_PASSWORD, password.to_string()));
            }
        }

        entries.push((AAP_URL, url_to_string(&self.controller.url)));
        match &self.controller.auth {
            ControllerAuth::Token(token) => entries.push((AAP_TOKEN, token.to_string())),
            ControllerAuth::Basic { username, password } => {
                entries.push((AAP_USERNAME, username.to_string()));
                entries.push((AAP_PASSWORD, password.to_string()));
            }
        }

        entries.push((WORKSHOP_GUID, self.guid.to_string()));
        entries.push((WORKSHOP_NAMESPACE, workshop_namespace.to_string()));
        if let Some(host) = &self.mainframe_host {
            entries.push((MAINFRAME_HOST, host.to_string()));
        }

        entries
    }
}

/// `host`, `host:port` or URL, as given for the mainframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub host: String,
    pub port: Option<u16>,
}

impl HostAddress {
    pub fn parse(value: &str) -> HostAddress {
        let value = value.trim();
        if let Some(url) = Url::parse(value).ok().filter(|_| value.contains("://")) {
            if let Some(host) = url.host_str() {
                return HostAddress {
                    host: host.to_string(),
                    port: url.port(),
                };
            }
        }

        match value.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse::<u16>() {
                Ok(port) => HostAddress {
                    host: host.to_string(),
                    port: Some(port),
                },
                Err(_) => HostAddress {
                    host: value.to_string(),
                    port: None,
                },
            },
            _ => HostAddress {
                host: value.to_string(),
                port: None,
            },
        }
    }
}

// Url::to_string always adds a trailing slash on empty paths, strip it to keep user input as is
fn url_to_string(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
