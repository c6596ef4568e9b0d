//! Working model handed to assemblers
//!
//! A `DepositSubmission` is built fresh for every processing pass from a
//! Submission and the entities around it, and discarded once the package
//! stream has been produced. It is never persisted.

use chrono::{DateTime, Utc};
use deposit_common::model::FileRole;
use deposit_common::ResourceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositSubmission {
    /// Identity of the Submission this model was built from
    pub id: Option<ResourceId>,
    /// Human readable name, usually the manuscript title
    pub name: String,
    pub submission_date: Option<DateTime<Utc>>,
    pub metadata: DepositMetadata,
    pub files: Vec<DepositFile>,
}

impl DepositSubmission {
    /// Files without a content location
    pub fn files_missing_location(&self) -> Vec<&DepositFile> {
        self.files
            .iter()
            .filter(|f| f.location.as_deref().map_or(true, |l| l.trim().is_empty()))
            .collect()
    }
}

/// One file to be packaged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositFile {
    pub name: String,
    /// Where the content bytes can be fetched from
    pub location: Option<String>,
    pub role: Option<FileRole>,
    pub mime_type: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMetadata {
    pub manuscript: ManuscriptMetadata,
    pub article: ArticleMetadata,
    pub journal: JournalMetadata,
    pub persons: Vec<Person>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManuscriptMetadata {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub manuscript_abstract: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalMetadata {
    pub title: Option<String>,
    pub issns: Vec<String>,
    pub nlmta: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersonRole {
    Submitter,
    Author,
    Pi,
    CoPi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub full_name: String,
    pub email: Option<String>,
    pub orcid: Option<String>,
    pub role: PersonRole,
}
