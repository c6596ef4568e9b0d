//! Transport writing packages into a local directory
//!
//! Useful for local deployments and as a drop-box for repositories that
//! ingest from a shared volume. A package written to disk counts as accepted.

use anyhow::Context;
use async_trait::async_trait;
use deposit_common::config::TransportBinding;
use deposit_common::model::{CopyStatus, Deposit, DepositStatus, RepositoryCopy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::assembler::{PackageDigest, PackageStream};
use super::transport::{
    SuccessContext, Transport, TransportError, TransportResponse, TransportSession,
};
use crate::cri::ConditionViolation;
use crate::error::DepositServiceError;
use crate::policy::is_intermediate_deposit_status;

/// Property naming the target directory
pub const DIRECTORY_PROPERTY: &str = "directory";

#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemTransport;

#[async_trait]
impl Transport for FilesystemTransport {
    fn binding(&self) -> TransportBinding {
        TransportBinding::Filesystem
    }

    async fn open(&self, properties: &HashMap<String, String>) -> anyhow::Result<Box<dyn TransportSession>> {
        let directory = properties
            .get(DIRECTORY_PROPERTY)
            .map(PathBuf::from)
            .with_context(|| format!("Missing '{}' transport property", DIRECTORY_PROPERTY))?;
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Cannot create {}", directory.display()))?;
        Ok(Box::new(FilesystemSession { directory }))
    }
}

struct FilesystemSession {
    directory: PathBuf,
}

impl FilesystemSession {
    async fn write(&self, mut package: PackageStream) -> anyhow::Result<(PathBuf, Option<PackageDigest>)> {
        let path = self.directory.join(&package.metadata().name);
        let mut file = tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Cannot create {}", path.display()))?;
        tokio::io::copy(package.reader(), &mut file)
            .await
            .with_context(|| format!("Cannot write {}", path.display()))?;
        file.flush().await?;
        file.sync_all().await?;

        let digest = package.finish().await?;
        Ok((path, digest))
    }
}

#[async_trait]
impl TransportSession for FilesystemSession {
    async fn send(
        &mut self,
        package: PackageStream,
        _properties: &HashMap<String, String>,
    ) -> Box<dyn TransportResponse> {
        match self.write(package).await {
            Ok((path, digest)) => Box::new(FilesystemResponse {
                path: Some(path),
                digest,
                error: None,
            }),
            Err(e) => Box::new(FilesystemResponse {
                path: None,
                digest: None,
                error: Some(TransportError::from_error(&e)),
            }),
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FilesystemResponse {
    path: Option<PathBuf>,
    digest: Option<PackageDigest>,
    error: Option<TransportError>,
}

impl FilesystemResponse {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn digest(&self) -> Option<&PackageDigest> {
        self.digest.as_ref()
    }
}

#[async_trait]
impl TransportResponse for FilesystemResponse {
    fn success(&self) -> bool {
        self.error.is_none()
    }

    fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    /// Records the written file on the repository copy and accepts the deposit
    async fn on_success(&self, context: SuccessContext<'_>) -> anyhow::Result<()> {
        let path = self.path().context("Filesystem response has no path")?;
        let location = path.display().to_string();
        let access_url = format!("file://{}", location);

        let copy_id = context
            .repository_copy
            .id
            .clone()
            .context("Repository copy has no identity")?;
        let result = context
            .cri
            .perform_critical(
                &copy_id,
                |_: &RepositoryCopy| true,
                |copy: &RepositoryCopy, _: &()| {
                    ConditionViolation::ensure(
                        copy.copy_status == Some(CopyStatus::Complete),
                        "repository copy is not complete",
                    )
                },
                |mut copy: RepositoryCopy| {
                    let (location, access_url) = (location.clone(), access_url.clone());
                    async move {
                        copy.copy_status = Some(CopyStatus::Complete);
                        copy.access_url = Some(access_url);
                        if !copy.external_ids.contains(&location) {
                            copy.external_ids.push(location);
                        }
                        Ok((copy, ()))
                    }
                },
            )
            .await;
        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to complete repository copy {}", copy_id),
                result,
            )
            .into());
        }

        let deposit_id = context.deposit.id.clone().context("Deposit has no identity")?;
        let result = context
            .cri
            .perform_critical(
                &deposit_id,
                |d: &Deposit| is_intermediate_deposit_status(d.deposit_status),
                |d: &Deposit, _: &()| {
                    ConditionViolation::ensure(
                        d.deposit_status == Some(DepositStatus::Accepted),
                        "deposit is not accepted",
                    )
                },
                |mut d: Deposit| async move {
                    d.deposit_status = Some(DepositStatus::Accepted);
                    Ok((d, ()))
                },
            )
            .await;
        if !result.success() {
            return Err(DepositServiceError::from_critical(
                format!("Failed to accept deposit {}", deposit_id),
                result,
            )
            .into());
        }

        info!(deposit = %deposit_id, path = %location, "Package stored on filesystem, deposit accepted");
        Ok(())
    }
}
