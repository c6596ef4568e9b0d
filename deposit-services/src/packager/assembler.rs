//! Package assembly
//!
//! An assembler turns a `DepositSubmission` into a `PackageStream`. Bytes are
//! produced by a spawned task writing into an in-memory pipe while the
//! transport reads the other end; the producer's digest (or failure) is
//! collected with `PackageStream::finish` once the transport is done reading.

use anyhow::Context;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::model::DepositSubmission;

/// Pipe buffer between producer and transport
const PIPE_CAPACITY: usize = 64 * 1024;

/// Descriptive data about an assembled package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// File name the package should be stored under
    pub name: String,
    /// Package specification (e.g. "json" or a SWORD packaging URI)
    pub spec: String,
    pub mime_type: String,
}

/// Size and checksum of the bytes a producer wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDigest {
    pub size: u64,
    /// Lowercase hex SHA-256
    pub sha256: String,
}

/// A package as a byte stream plus the task producing it
pub struct PackageStream {
    metadata: PackageMetadata,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    producer: Option<JoinHandle<std::io::Result<PackageDigest>>>,
}

impl fmt::Debug for PackageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageStream")
            .field("metadata", &self.metadata)
            .field("streaming", &self.producer.is_some())
            .finish()
    }
}

impl PackageStream {
    pub fn new(metadata: PackageMetadata, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            metadata,
            reader: Box::new(reader),
            producer: None,
        }
    }

    /// Attach the task writing into the other end of `reader`
    pub fn with_producer(mut self, producer: JoinHandle<std::io::Result<PackageDigest>>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn reader(&mut self) -> &mut (dyn AsyncRead + Send + Unpin) {
        self.reader.as_mut()
    }

    /// Wait for the producer and report what it wrote
    ///
    /// Returns `None` for streams without a producer task. Producer failures
    /// (including a panic) surface here.
    pub async fn finish(self) -> anyhow::Result<Option<PackageDigest>> {
        let PackageStream { reader, producer, .. } = self;
        // Drop our end first so a producer blocked on a full pipe fails fast
        drop(reader);
        match producer {
            Some(producer) => {
                let digest = producer
                    .await
                    .context("Package producer task failed")?
                    .context("Package producer could not write the package")?;
                Ok(Some(digest))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
pub trait Assembler: Send + Sync {
    /// Package specification this assembler produces
    fn spec(&self) -> &str;

    async fn assemble(
        &self,
        submission: &DepositSubmission,
        options: &HashMap<String, String>,
    ) -> anyhow::Result<PackageStream>;
}

/// Assembles the working model as a single JSON document
///
/// Option `pretty = "true"` produces indented output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAssembler;

impl JsonAssembler {
    pub const SPEC: &'static str = "json";
}

#[async_trait]
impl Assembler for JsonAssembler {
    fn spec(&self) -> &str {
        Self::SPEC
    }

    async fn assemble(
        &self,
        submission: &DepositSubmission,
        options: &HashMap<String, String>,
    ) -> anyhow::Result<PackageStream> {
        let pretty = options.get("pretty").is_some_and(|v| v == "true");
        let body = if pretty {
            serde_json::to_vec_pretty(submission)
        } else {
            serde_json::to_vec(submission)
        }
        .context("Failed to serialize deposit submission")?;

        let metadata = PackageMetadata {
            name: format!("{}.json", package_base_name(submission)),
            spec: Self::SPEC.to_string(),
            mime_type: "application/json".to_string(),
        };
        debug!(package = %metadata.name, bytes = body.len(), "Assembling JSON package");

        let (reader, mut writer) = tokio::io::duplex(PIPE_CAPACITY);
        let producer = tokio::spawn(async move {
            let mut hasher = Sha256::new();
            for chunk in body.chunks(8 * 1024) {
                writer.write_all(chunk).await?;
                hasher.update(chunk);
            }
            writer.shutdown().await?;
            Ok::<_, std::io::Error>(PackageDigest {
                size: body.len() as u64,
                sha256: format!("{:x}", hasher.finalize()),
            })
        });

        Ok(PackageStream::new(metadata, reader).with_producer(producer))
    }
}

/// File-system safe base name derived from the submission identity
fn package_base_name(submission: &DepositSubmission) -> String {
    let source = submission
        .id
        .as_ref()
        .and_then(|id| id.as_str().rsplit('/').find(|s| !s.is_empty()))
        .unwrap_or("package");
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
