//! Transport contracts
//!
//! A transport opens sessions to a remote repository. Sessions are scoped:
//! use [`send_package`], which closes the session on every path once it has
//! been opened. Failures to transfer are reported as data in the
//! `TransportResponse`, not as errors.

use anyhow::Context;
use async_trait::async_trait;
use deposit_common::config::TransportBinding;
use deposit_common::model::{Deposit, RepositoryCopy, Submission};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use super::assembler::PackageStream;
use crate::cri::CriticalRepositoryInteraction;

/// Transport failure carried by a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Capture an error and all of its causes as one message
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receipt returned by repositories that acknowledge a deposit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositReceipt {
    /// Remote status document (e.g. a SWORD statement)
    pub status_ref: Option<String>,
    /// Remote identity of the deposited item
    pub item_url: Option<String>,
    /// Human facing landing page of the item
    pub splash_url: Option<String>,
}

/// Everything `TransportResponse::on_success` may need
pub struct SuccessContext<'a> {
    pub cri: &'a CriticalRepositoryInteraction,
    pub submission: &'a Submission,
    pub deposit: &'a Deposit,
    pub repository_copy: &'a RepositoryCopy,
}

#[async_trait]
pub trait TransportResponse: Send + Sync + fmt::Debug {
    /// True when the package bytes reached the remote endpoint
    fn success(&self) -> bool;

    fn error(&self) -> Option<&TransportError>;

    /// Receipt data for protocols that return one
    fn deposit_receipt(&self) -> Option<&DepositReceipt> {
        None
    }

    /// Called once the deposit and its repository copy are recorded
    async fn on_success(&self, _context: SuccessContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Response of protocols without receipts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicTransportResponse {
    error: Option<TransportError>,
}

impl BasicTransportResponse {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(error: TransportError) -> Self {
        Self { error: Some(error) }
    }
}

#[async_trait]
impl TransportResponse for BasicTransportResponse {
    fn success(&self) -> bool {
        self.error.is_none()
    }

    fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }
}

/// Response of a SWORDv2 deposit, carrying the deposit receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwordDepositResponse {
    receipt: Option<DepositReceipt>,
    error: Option<TransportError>,
}

impl SwordDepositResponse {
    pub fn accepted(receipt: DepositReceipt) -> Self {
        Self {
            receipt: Some(receipt),
            error: None,
        }
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            receipt: None,
            error: Some(error),
        }
    }
}

#[async_trait]
impl TransportResponse for SwordDepositResponse {
    fn success(&self) -> bool {
        self.error.is_none()
    }

    fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    fn deposit_receipt(&self) -> Option<&DepositReceipt> {
        self.receipt.as_ref()
    }
}

#[async_trait]
pub trait TransportSession: Send {
    async fn send(
        &mut self,
        package: PackageStream,
        properties: &HashMap<String, String>,
    ) -> Box<dyn TransportResponse>;

    /// Release the session. Implementations must also release their
    /// resources when dropped without being closed.
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn binding(&self) -> TransportBinding;

    async fn open(&self, properties: &HashMap<String, String>) -> anyhow::Result<Box<dyn TransportSession>>;
}

/// Open a session, send one package and close the session
///
/// Errors opening or closing the session are returned as errors; transfer
/// failures are in the response.
pub async fn send_package(
    transport: &dyn Transport,
    package: PackageStream,
    properties: &HashMap<String, String>,
) -> anyhow::Result<Box<dyn TransportResponse>> {
    let binding = transport.binding();
    let package_name = package.metadata().name.clone();

    let mut session = transport
        .open(properties)
        .await
        .with_context(|| format!("Failed to open {} transport session", binding))?;

    let response = session.send(package, properties).await;
    if let Some(error) = response.error() {
        warn!(transport = %binding, package = %package_name, error = %error, "Package transfer failed");
    } else {
        debug!(transport = %binding, package = %package_name, "Package sent");
    }

    session
        .close()
        .await
        .with_context(|| format!("Failed to close {} transport session", binding))?;
    Ok(response)
}
