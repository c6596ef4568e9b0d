//! Builds the `DepositSubmission` working model from the stored entity graph

use async_trait::async_trait;
use deposit_common::model::{relation, Grant, Journal, Publication, Submission, User};
use deposit_common::{Error, Resource, ResourceId, ResourceStore, ResourceStoreExt, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::model::{DepositFile, DepositSubmission, Person, PersonRole};

#[async_trait]
pub trait SubmissionBuilder: Send + Sync {
    /// Build the working model for the submission at `submission_locator`
    ///
    /// Fails with `Error::InvalidModel` when the submission graph is malformed.
    async fn build(&self, submission_locator: &str) -> Result<DepositSubmission>;
}

/// Builder reading the submission graph from a resource store
pub struct StoreSubmissionBuilder {
    store: Arc<dyn ResourceStore>,
}

/// Subset of the submission's free-form metadata blob that feeds the model
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmissionMetadata {
    title: Option<String>,
    #[serde(rename = "abstract")]
    manuscript_abstract: Option<String>,
    doi: Option<String>,
    volume: Option<String>,
    issue: Option<String>,
    #[serde(rename = "journal-title")]
    journal_title: Option<String>,
    authors: Vec<MetadataAuthor>,
}

#[derive(Debug, Deserialize)]
struct MetadataAuthor {
    author: String,
    orcid: Option<String>,
}

impl StoreSubmissionBuilder {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    async fn person(&self, id: &ResourceId, role: PersonRole) -> Result<Person> {
        let user: User = self.store.read_entity(id).await?;
        let full_name = user
            .full_name()
            .ok_or_else(|| Error::InvalidModel(format!("User {} has no name", id)))?;
        Ok(Person {
            full_name,
            email: user.email,
            orcid: user.orcid_id,
            role,
        })
    }

    async fn files(&self, submission_id: &ResourceId) -> Result<Vec<DepositFile>> {
        let mut files = Vec::new();
        for id in self.store.incoming_by(submission_id, relation::SUBMISSION).await? {
            // Deposits also refer to their submission
            if let Resource::File(file) = self.store.read(&id).await? {
                files.push(DepositFile {
                    name: file.name,
                    location: file.uri,
                    role: file.file_role,
                    mime_type: file.mime_type,
                    label: file.description,
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[async_trait]
impl SubmissionBuilder for StoreSubmissionBuilder {
    async fn build(&self, submission_locator: &str) -> Result<DepositSubmission> {
        let id = ResourceId::from(submission_locator);
        let submission: Submission = self.store.read_entity(&id).await?;

        let blob: SubmissionMetadata = match submission.metadata.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(json).map_err(|e| {
                Error::InvalidModel(format!("Submission {} has malformed metadata: {}", id, e))
            })?,
            _ => SubmissionMetadata::default(),
        };

        let mut model = DepositSubmission {
            id: Some(id.clone()),
            submission_date: submission.submitted_date,
            ..Default::default()
        };
        let metadata = &mut model.metadata;

        if let Some(publication_id) = &submission.publication {
            let publication: Publication = self.store.read_entity(publication_id).await?;
            metadata.manuscript.title = publication.title;
            metadata.manuscript.manuscript_abstract = publication.publication_abstract;
            metadata.article.doi = publication.doi;
            metadata.article.pmid = publication.pmid;
            metadata.article.volume = publication.volume;
            metadata.article.issue = publication.issue;

            if let Some(journal_id) = &publication.journal {
                let journal: Journal = self.store.read_entity(journal_id).await?;
                metadata.journal.title = Some(journal.journal_name);
                metadata.journal.issns = journal.issns;
                metadata.journal.nlmta = journal.nlmta;
            }
        }

        // Values captured at submission time win over the publication record
        metadata.manuscript.title = blob.title.or(metadata.manuscript.title.take());
        metadata.manuscript.manuscript_abstract = blob
            .manuscript_abstract
            .or(metadata.manuscript.manuscript_abstract.take());
        metadata.article.doi = blob.doi.or(metadata.article.doi.take());
        metadata.article.volume = blob.volume.or(metadata.article.volume.take());
        metadata.article.issue = blob.issue.or(metadata.article.issue.take());
        metadata.journal.title = blob.journal_title.or(metadata.journal.title.take());

        if let Some(submitter) = &submission.submitter {
            metadata
                .persons
                .push(self.person(submitter, PersonRole::Submitter).await?);
        }
        for author in blob.authors {
            metadata.persons.push(Person {
                full_name: author.author,
                email: None,
                orcid: author.orcid,
                role: PersonRole::Author,
            });
        }

        let mut seen = HashSet::new();
        for grant_id in &submission.grants {
            let grant: Grant = self.store.read_entity(grant_id).await?;
            if let Some(pi) = grant.pi.as_ref().filter(|pi| seen.insert((*pi).clone())) {
                metadata.persons.push(self.person(pi, PersonRole::Pi).await?);
            }
            for co_pi in grant.co_pis.iter().filter(|c| seen.insert((*c).clone())) {
                metadata.persons.push(self.person(co_pi, PersonRole::CoPi).await?);
            }
        }

        model.name = model
            .metadata
            .manuscript
            .title
            .clone()
            .unwrap_or_else(|| id.to_string());
        model.files = self.files(&id).await?;

        debug!(
            submission = %id,
            files = model.files.len(),
            persons = model.metadata.persons.len(),
            "Built deposit submission"
        );
        Ok(model)
    }
}
