//! Persisted entities
//!
//! The resource store owns these records; callers only ever hold a snapshot
//! carrying the version tag that was current when it was read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{
    AggregatedDepositStatus, CopyStatus, DepositStatus, FileRole, IntegrationType,
    SubmissionSource,
};
use super::ResourceId;

/// Relation names used for inverse-reference lookups
pub mod relation {
    pub const SUBMISSION: &str = "submission";
    pub const REPOSITORY: &str = "repository";
    pub const REPOSITORIES: &str = "repositories";
    pub const REPOSITORY_COPY: &str = "repositoryCopy";
    pub const PUBLICATION: &str = "publication";
    pub const SUBMITTER: &str = "submitter";
    pub const GRANTS: &str = "grants";
    pub const JOURNAL: &str = "journal";
    pub const PI: &str = "pi";
    pub const CO_PIS: &str = "coPis";
    pub const PRIMARY_FUNDER: &str = "primaryFunder";
}

type Links = Vec<(&'static str, ResourceId)>;

fn push_opt(links: &mut Links, relation: &'static str, target: &Option<ResourceId>) {
    if let Some(id) = target {
        links.push((relation, id.clone()));
    }
}

fn push_all(links: &mut Links, relation: &'static str, targets: &[ResourceId]) {
    links.extend(targets.iter().map(|id| (relation, id.clone())));
}

/// One user-initiated transfer request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Submission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_deposit_status: Option<AggregatedDepositStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SubmissionSource>,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<DateTime<Utc>>,
    /// Free-form JSON metadata captured at submission time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<ResourceId>,
    pub repositories: Vec<ResourceId>,
    pub grants: Vec<ResourceId>,
}

impl Submission {
    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::SUBMITTER, &self.submitter);
        push_opt(&mut links, relation::PUBLICATION, &self.publication);
        push_all(&mut links, relation::REPOSITORIES, &self.repositories);
        push_all(&mut links, relation::GRANTS, &self.grants);
        links
    }
}

/// One [Submission, Repository] transfer attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deposit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_status: Option<DepositStatus>,
    /// Opaque pointer to the remote status document (e.g. a statement URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_status_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_copy: Option<ResourceId>,
}

impl Deposit {
    /// New deposit with an unset status, linked to its submission and repository
    pub fn new(submission: ResourceId, repository: ResourceId) -> Self {
        Self {
            submission: Some(submission),
            repository: Some(repository),
            ..Default::default()
        }
    }

    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::SUBMISSION, &self.submission);
        push_opt(&mut links, relation::REPOSITORY, &self.repository);
        push_opt(&mut links, relation::REPOSITORY_COPY, &self.repository_copy);
        links
    }
}

/// Durable record of where content landed in a remote repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryCopy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_status: Option<CopyStatus>,
    pub external_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<ResourceId>,
}

impl RepositoryCopy {
    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::REPOSITORY, &self.repository);
        push_opt(&mut links, relation::PUBLICATION, &self.publication);
        links
    }
}

/// A downstream archival repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Repository {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_type: Option<IntegrationType>,
}

impl Repository {
    pub fn references(&self) -> Links {
        Vec::new()
    }
}

/// Custodial content attached to a submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct File {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub name: String,
    /// Location of the file's bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_role: Option<FileRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<ResourceId>,
}

impl File {
    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::SUBMISSION, &self.submission);
        links
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid_id: Option<String>,
}

impl User {
    pub fn references(&self) -> Links {
        Vec::new()
    }

    /// Display name, falling back to "first last"
    pub fn full_name(&self) -> Option<String> {
        if let Some(name) = &self.display_name {
            return Some(name.clone());
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Grant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub award_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_funder: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pi: Option<ResourceId>,
    pub co_pis: Vec<ResourceId>,
}

impl Grant {
    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::PRIMARY_FUNDER, &self.primary_funder);
        push_opt(&mut links, relation::PI, &self.pi);
        push_all(&mut links, relation::CO_PIS, &self.co_pis);
        links
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Funder {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_key: Option<String>,
}

impl Funder {
    pub fn references(&self) -> Links {
        Vec::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Publication {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub publication_abstract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<ResourceId>,
}

impl Publication {
    pub fn references(&self) -> Links {
        let mut links = Vec::new();
        push_opt(&mut links, relation::JOURNAL, &self.journal);
        links
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Journal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub journal_name: String,
    pub issns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlmta: Option<String>,
}

impl Journal {
    pub fn references(&self) -> Links {
        Vec::new()
    }
}
