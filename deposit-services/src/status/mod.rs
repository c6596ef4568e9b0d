//! Remote deposit status resolution
//!
//! Repositories report the fate of a deposit in protocol-specific status
//! documents. A `DepositStatusResolver` reads such a document and returns the
//! status URI it carries; the repository's `StatusMapping` turns that URI into
//! a `DepositStatus`.

mod refresher;

pub use refresher::DepositStatusRefresher;

use anyhow::Context;
use async_trait::async_trait;
use deposit_common::config::{RepositoryConfig, StatusMappingConfig, TransportBinding};
use deposit_common::model::{Deposit, DepositStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait DepositStatusResolver: Send + Sync {
    /// Status URI found in the document at `status_ref`, if any
    async fn resolve(
        &self,
        status_ref: &str,
        repository: &RepositoryConfig,
    ) -> anyhow::Result<Option<String>>;
}

/// Maps remote status URIs to deposit statuses
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusMapping {
    default: Option<DepositStatus>,
    statuses: HashMap<String, DepositStatus>,
}

impl StatusMapping {
    pub fn new(default: Option<DepositStatus>, statuses: HashMap<String, DepositStatus>) -> Self {
        Self { default, statuses }
    }

    /// Status for `status_uri`, falling back to the default for unknown URIs
    pub fn map(&self, status_uri: &str) -> Option<DepositStatus> {
        self.statuses.get(status_uri).copied().or(self.default)
    }
}

impl From<&StatusMappingConfig> for StatusMapping {
    fn from(config: &StatusMappingConfig) -> Self {
        Self::new(config.default, config.statuses.clone())
    }
}

/// Resolves a deposit's remote status with the resolver for its protocol
#[derive(Default)]
pub struct DepositStatusProcessor {
    resolvers: HashMap<TransportBinding, Arc<dyn DepositStatusResolver>>,
}

impl DepositStatusProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(
        mut self,
        binding: TransportBinding,
        resolver: Arc<dyn DepositStatusResolver>,
    ) -> Self {
        self.resolvers.insert(binding, resolver);
        self
    }

    /// Current remote status of `deposit`
    ///
    /// `None` when the deposit has no status reference, the document carries
    /// no status, or the status URI is unmapped without a default.
    pub async fn process(
        &self,
        deposit: &Deposit,
        repository: &RepositoryConfig,
    ) -> anyhow::Result<Option<DepositStatus>> {
        let Some(status_ref) = deposit.deposit_status_ref.as_deref() else {
            return Ok(None);
        };

        let binding = repository.transport.protocol;
        let resolver = self
            .resolvers
            .get(&binding)
            .with_context(|| format!("No deposit status resolver for protocol {}", binding))?;

        let status_uri = resolver
            .resolve(status_ref, repository)
            .await
            .with_context(|| format!("Failed to resolve deposit status from {}", status_ref))?;

        let Some(status_uri) = status_uri else {
            debug!(status_ref = %status_ref, "Status document carries no status");
            return Ok(None);
        };

        let status = StatusMapping::from(&repository.status_mapping).map(&status_uri);
        if status.is_none() {
            warn!(
                repository = %repository.key,
                status_uri = %status_uri,
                "Unmapped remote status and no default configured"
            );
        }
        Ok(status)
    }
}
