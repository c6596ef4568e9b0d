//! Packagers: assembler plus transport plus configuration, per repository

mod assembler;
mod filesystem;
mod transport;

pub use assembler::{Assembler, JsonAssembler, PackageDigest, PackageMetadata, PackageStream};
pub use filesystem::{FilesystemResponse, FilesystemTransport, DIRECTORY_PROPERTY};
pub use transport::{
    send_package, BasicTransportResponse, DepositReceipt, SuccessContext, SwordDepositResponse,
    Transport, TransportError, TransportResponse, TransportSession,
};

use deposit_common::config::{DepositServicesConfig, RepositoryConfig, TransportBinding};
use deposit_common::model::Repository;
use deposit_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything needed to deliver packages to one repository
pub struct Packager {
    name: String,
    assembler: Arc<dyn Assembler>,
    transport: Arc<dyn Transport>,
    config: Arc<RepositoryConfig>,
}

impl Packager {
    pub fn new(
        name: impl Into<String>,
        assembler: Arc<dyn Assembler>,
        transport: Arc<dyn Transport>,
        config: Arc<RepositoryConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            assembler,
            transport,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assembler(&self) -> &dyn Assembler {
        self.assembler.as_ref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Flat transport configuration
    pub fn configuration(&self) -> &HashMap<String, String> {
        &self.config.transport.properties
    }

    pub fn assembler_options(&self) -> &HashMap<String, String> {
        &self.config.assembler.options
    }

    pub fn repository_config(&self) -> &RepositoryConfig {
        &self.config
    }
}

/// Packagers keyed by lookup string
#[derive(Default)]
pub struct PackagerRegistry {
    packagers: HashMap<String, Arc<Packager>>,
}

impl PackagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one packager per configured repository
    pub fn from_config(
        config: &DepositServicesConfig,
        transports: &HashMap<TransportBinding, Arc<dyn Transport>>,
        assemblers: &HashMap<String, Arc<dyn Assembler>>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for repository in &config.repositories {
            let transport = transports.get(&repository.transport.protocol).ok_or_else(|| {
                Error::Config(format!(
                    "Repository '{}': no transport registered for protocol {}",
                    repository.key, repository.transport.protocol
                ))
            })?;
            let assembler = assemblers.get(&repository.assembler.spec).ok_or_else(|| {
                Error::Config(format!(
                    "Repository '{}': no assembler registered for spec '{}'",
                    repository.key, repository.assembler.spec
                ))
            })?;

            registry.register(
                repository.key.clone(),
                Packager::new(
                    repository.key.clone(),
                    Arc::clone(assembler),
                    Arc::clone(transport),
                    Arc::new(repository.clone()),
                ),
            );
        }
        info!("Registered {} packager(s)", registry.len());
        Ok(registry)
    }

    pub fn register(&mut self, key: impl Into<String>, packager: Packager) {
        self.packagers.insert(key.into(), Arc::new(packager));
    }

    pub fn get(&self, key: &str) -> Option<Arc<Packager>> {
        self.packagers.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.packagers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packagers.is_empty()
    }

    /// Find the packager for a repository; the first matching lookup key wins
    pub fn resolve(&self, repository: &Repository) -> Option<Arc<Packager>> {
        let found = lookup_keys(repository)
            .into_iter()
            .find_map(|key| self.get(&key).map(|p| (key, p)));
        if let Some((key, packager)) = &found {
            debug!(packager = %packager.name(), key = %key, "Resolved packager");
        }
        found.map(|(_, packager)| packager)
    }
}

/// Lookup keys for a repository, most specific first: repository key, name,
/// identity URI, then path suffixes of the URI of decreasing specificity
pub fn lookup_keys(repository: &Repository) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(key) = &repository.repository_key {
        keys.push(key.clone());
    }
    if !repository.name.is_empty() {
        keys.push(repository.name.clone());
    }
    if let Some(id) = &repository.id {
        keys.push(id.to_string());
        keys.extend(path_suffixes(id.as_str()));
    }
    keys.retain(|k| !k.is_empty());
    keys.dedup();
    keys
}

/// `http://host/a/b/c` -> `a/b/c`, `b/c`, `c`
fn path_suffixes(uri: &str) -> Vec<String> {
    let path = match uri.find("://") {
        Some(scheme_end) => {
            let rest = &uri[scheme_end + 3..];
            rest.find('/').map_or("", |host_end| &rest[host_end..])
        }
        None => uri,
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    (0..segments.len()).map(|i| segments[i..].join("/")).collect()
}
