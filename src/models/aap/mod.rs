pub mod resources;

use std::time::Duration;

use retry::OperationResult;
use retry::delay::Fixed;

use crate::services::aap::{AapService, AapServiceError, ResourceSummary};

pub use crate::services::aap::ResourceKind;
pub use resources::ResourceSpec;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const SYNC_SUCCESS_STATUSES: [&str; 2] = ["successful", "ok"];
const SYNC_FAILURE_STATUSES: [&str; 3] = ["failed", "error", "canceled"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EnsureError {
    #[error("Cannot look up {kind} `{name}`: {source}")]
    Lookup {
        kind: ResourceKind,
        name: String,
        source: AapServiceError,
    },
    #[error("Cannot create {kind} `{name}`: {source}")]
    Create {
        kind: ResourceKind,
        name: String,
        source: AapServiceError,
    },
    #[error("{kind} `{name}` does not exist.")]
    NotFound { kind: ResourceKind, name: String },
    #[error("Cannot attach {related} {related_id} to {kind} {id}: {source}")]
    Association {
        kind: ResourceKind,
        id: u64,
        related: String,
        related_id: u64,
        source: AapServiceError,
    },
    #[error("Cannot prepare {kind} `{name}`: {raw_error_message}")]
    Dependency {
        kind: ResourceKind,
        name: String,
        raw_error_message: String,
    },
    #[error("Project `{name}` synchronization ended with status `{status}`.")]
    ProjectSyncFailed { name: String, status: String },
    #[error("Project `{name}` synchronization did not complete within {timeout:?}.")]
    ProjectSyncTimeout { name: String, timeout: Duration },
}

impl EnsureError {
    pub fn kind(&self) -> ResourceKind {
        match self {
            EnsureError::Lookup { kind, .. }
            | EnsureError::Create { kind, .. }
            | EnsureError::NotFound { kind, .. }
            | EnsureError::Association { kind, .. }
            | EnsureError::Dependency { kind, .. } => *kind,
            EnsureError::ProjectSyncFailed { .. } | EnsureError::ProjectSyncTimeout { .. } => ResourceKind::Project,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_derive::Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EnsureOutcome {
    Created,
    Reused,
}

/// Resource known to exist in the controller after an `ensure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub kind: ResourceKind,
    pub name: String,
    pub id: u64,
    pub outcome: EnsureOutcome,
    pub status: Option<String>,
}

impl Ensured {
    fn new(kind: ResourceKind, summary: ResourceSummary, outcome: EnsureOutcome) -> Self {
        Ensured {
            kind,
            name: summary.name,
            id: summary.id,
            outcome,
            status: summary.status,
        }
    }
}

/// Create-if-absent over the controller collections: one lookup by name, one creation when
/// nothing matches, never a creation when something does.
pub struct ResourceEnsurer {
    service: AapService,
    poll_interval: Duration,
}

impl ResourceEnsurer {
    pub fn new(service: AapService) -> Self {
        ResourceEnsurer {
            service,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn service(&self) -> &AapService {
        &self.service
    }

    /// First resource named `name`, duplicates are reported and ignored.
    pub fn find_one(
        &self,
        kind: ResourceKind,
        name: &str,
        filters: &[(String, String)],
    ) -> Result<Option<ResourceSummary>, EnsureError> {
        let mut query = vec![("name".to_string(), name.to_string())];
        query.extend(filters.iter().cloned());

        let list = self.service.find(kind, query).map_err(|source| EnsureError::Lookup {
            kind,
            name: name.to_string(),
            source,
        })?;

        if list.count > 1 || list.results.len() > 1 {
            warn!(
                "{} {} named `{}` found, using the first one (id {})",
                list.count,
                kind,
                name,
                list.results.first().map(|r| r.id.to_string()).unwrap_or_default()
            );
        }

        Ok(list.results.into_iter().next())
    }

    /// Lookup of a resource the workshop never creates, its absence is an error.
    pub fn lookup(
        &self,
        kind: ResourceKind,
        name: &str,
        filters: &[(String, String)],
    ) -> Result<ResourceSummary, EnsureError> {
        self.find_one(kind, name, filters)?.ok_or_else(|| EnsureError::NotFound {
            kind,
            name: name.to_string(),
        })
    }

    pub fn ensure(&self, spec: &ResourceSpec) -> Result<Ensured, EnsureError> {
        if let Some(existing) = self.find_one(spec.kind, &spec.name, &spec.filters)? {
            info!("{} `{}` already exists with id {}", spec.kind, spec.name, existing.id);
            return Ok(Ensured::new(spec.kind, existing, EnsureOutcome::Reused));
        }

        info!("Creating {} `{}`", spec.kind, spec.name);
        match self.service.create(spec.kind, spec.payload.clone()) {
            Ok(created) => {
                info!("{} `{}` created with id {}", spec.kind, spec.name, created.id);
                Ok(Ensured::new(spec.kind, created, EnsureOutcome::Created))
            }
            Err(AapServiceError::AlreadyExists { .. }) => {
                warn!("{} `{}` was created meanwhile, looking it up again", spec.kind, spec.name);
                self.find_one(spec.kind, &spec.name, &spec.filters)?
                    .map(|existing| Ensured::new(spec.kind, existing, EnsureOutcome::Reused))
                    .ok_or_else(|| EnsureError::NotFound {
                        kind: spec.kind,
                        name: spec.name.to_string(),
                    })
            }
            Err(source) => Err(EnsureError::Create {
                kind: spec.kind,
                name: spec.name.to_string(),
                source,
            }),
        }
    }

    /// Attaches `related_id` to `kind/id` under `related` unless already attached.
    /// Returns whether an association was made.
    pub fn ensure_association(
        &self,
        kind: ResourceKind,
        id: u64,
        related: &str,
        related_id: u64,
    ) -> Result<bool, EnsureError> {
        let to_error = |source| EnsureError::Association {
            kind,
            id,
            related: related.to_string(),
            related_id,
            source,
        };

        let attached = self
            .service
            .list_related(kind, id, related.to_string())
            .map_err(to_error)?;
        if attached.results.iter().any(|r| r.id == related_id) {
            debug!("{} {} already attached to {} {}", related, related_id, kind, id);
            return Ok(false);
        }

        self.service
            .associate(kind, id, related.to_string(), related_id)
            .map_err(to_error)?;
        info!("{} {} attached to {} {}", related, related_id, kind, id);
        Ok(true)
    }

    /// Waits until the project content is available. A reused project whose last
    /// synchronization failed gets a new one first.
    pub fn ensure_project_synced(&self, project: &Ensured, timeout: Duration) -> Result<(), EnsureError> {
        let failed_before = project.outcome == EnsureOutcome::Reused
            && project
                .status
                .as_deref()
                .is_some_and(|s| SYNC_FAILURE_STATUSES.contains(&s));

        if !failed_before {
            return self.wait_for_sync(&project.name, timeout, || {
                self.service
                    .get(ResourceKind::Project, project.id)
                    .map(|p| p.status)
            });
        }

        warn!(
            "Last synchronization of project `{}` failed, starting a new one",
            project.name
        );
        let update_id = self
            .service
            .trigger_project_update(project.id)
            .map_err(|source| EnsureError::Create {
                kind: ResourceKind::Project,
                name: project.name.to_string(),
                source,
            })?;
        self.wait_for_sync(&project.name, timeout, || {
            self.service.get_project_update(update_id).map(|u| u.status)
        })
    }

    fn wait_for_sync<F>(&self, name: &str, timeout: Duration, fetch_status: F) -> Result<(), EnsureError>
    where
        F: Fn() -> Result<Option<String>, AapServiceError>,
    {
        let attempts = (timeout.as_millis() / self.poll_interval.as_millis().max(1)).max(1) as usize;
        let result = retry::retry(Fixed::from(self.poll_interval).take(attempts), || match fetch_status() {
            Ok(Some(status)) if SYNC_SUCCESS_STATUSES.contains(&status.as_str()) => OperationResult::Ok(()),
            Ok(Some(status)) if SYNC_FAILURE_STATUSES.contains(&status.as_str()) => {
                OperationResult::Err(EnsureError::ProjectSyncFailed {
                    name: name.to_string(),
                    status,
                })
            }
            Ok(status) => {
                debug!(
                    "Project `{}` synchronization status is {}, waiting",
                    name,
                    status.unwrap_or_else(|| "unknown".to_string())
                );
                OperationResult::Retry(EnsureError::ProjectSyncTimeout {
                    name: name.to_string(),
                    timeout,
                })
            }
            Err(err) => {
                warn!("Cannot read project `{}` synchronization status: {}", name, err);
                OperationResult::Retry(EnsureError::ProjectSyncTimeout {
                    name: name.to_string(),
                    timeout,
                })
            }
        });

        match result {
            Ok(_) => {
                info!("Project `{}` is synchronized", name);
                Ok(())
            }
            Err(retry::Error { error, .. }) => Err(error),
        }
    }
}
