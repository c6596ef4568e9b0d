//! Seeded resource graphs

use deposit_common::config::{
    AssemblerConfig, RepositoryConfig, StatusMappingConfig, TransportBinding, TransportConfig,
};
use deposit_common::model::{
    Deposit, DepositStatus, File, FileRole, IntegrationType, Repository, Submission, SubmissionSource,
};
use deposit_common::store::InMemoryResourceStore;
use deposit_common::{PassEntity, Resource, ResourceId, ResourceKind, ResourceStore, ResourceStoreExt};
use deposit_services::model::{DepositFile, DepositSubmission};
use deposit_services::packager::{JsonAssembler, Packager, Transport};
use deposit_services::CriticalRepositoryInteraction;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<InMemoryResourceStore>,
    pub cri: CriticalRepositoryInteraction,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryResourceStore::new()))
    }

    pub fn with_store(store: Arc<InMemoryResourceStore>) -> Self {
        let cri = CriticalRepositoryInteraction::new(Arc::clone(&store) as Arc<dyn ResourceStore>);
        Self { store, cri }
    }

    pub async fn repository(&self, key: &str, integration_type: IntegrationType) -> Repository {
        self.store
            .create_and_read(Repository {
                name: format!("{} repository", key),
                repository_key: Some(key.to_string()),
                integration_type: Some(integration_type),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    /// A user-submitted Submission targeting `repositories`, with one File per
    /// `(name, uri)` pair
    pub async fn submission(&self, repositories: &[&Repository], files: &[(&str, Option<&str>)]) -> Submission {
        let submission = self
            .store
            .create_and_read(Submission {
                source: Some(SubmissionSource::Pass),
                submitted: true,
                metadata: Some(r#"{"title":"Deposit engines","doi":"10.1000/xyz"}"#.to_string()),
                repositories: repositories.iter().filter_map(|r| r.id.clone()).collect(),
                ..Default::default()
            })
            .await
            .unwrap();

        for (name, uri) in files {
            self.store
                .create_entity(File {
                    name: name.to_string(),
                    uri: uri.map(str::to_string),
                    mime_type: Some("application/pdf".to_string()),
                    file_role: Some(FileRole::Manuscript),
                    submission: submission.id.clone(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        submission
    }

    pub async fn deposit(
        &self,
        submission: &Submission,
        repository: &Repository,
        status: Option<DepositStatus>,
    ) -> Deposit {
        self.store
            .create_and_read(Deposit {
                deposit_status: status,
                ..Deposit::new(submission.id.clone().unwrap(), repository.id.clone().unwrap())
            })
            .await
            .unwrap()
    }

    pub async fn read<T: PassEntity>(&self, id: &ResourceId) -> T {
        self.store.read_entity(id).await.unwrap()
    }

    /// Every stored Deposit, sorted by identity
    pub fn deposits(&self) -> Vec<Deposit> {
        self.store
            .list(ResourceKind::Deposit)
            .into_iter()
            .filter_map(|r| match r {
                Resource::Deposit(d) => Some(d),
                _ => None,
            })
            .collect()
    }
}

pub fn repository_config(key: &str, protocol: TransportBinding, properties: &[(&str, &str)]) -> RepositoryConfig {
    RepositoryConfig {
        key: key.to_string(),
        transport: TransportConfig {
            protocol,
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        },
        assembler: AssemblerConfig::default(),
        status_mapping: StatusMappingConfig::default(),
    }
}

pub fn packager(key: &str, transport: Arc<dyn Transport>) -> Packager {
    let config = repository_config(key, transport.binding(), &[]);
    Packager::new(key, Arc::new(JsonAssembler), transport, Arc::new(config))
}

pub fn deposit_submission(id: &ResourceId) -> DepositSubmission {
    DepositSubmission {
        id: Some(id.clone()),
        name: "Deposit engines".to_string(),
        files: vec![DepositFile {
            name: "manuscript.pdf".to_string(),
            location: Some("http://localhost/files/manuscript.pdf".to_string()),
            role: Some(FileRole::Manuscript),
            mime_type: Some("application/pdf".to_string()),
            label: None,
        }],
        ..Default::default()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until<F, Fut>(what: &str, condition: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
