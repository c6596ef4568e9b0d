//! Test helper modules for deposit-services integration tests
//!
//! - Fixture: seeded in-memory store plus a critical-interaction executor
//! - Fakes: scripted transport, recording executor and error handler,
//!   conflict-injecting store, fixed status resolver
//! - LogCapture: tracing capture for log assertions

#![allow(dead_code)]

pub mod fakes;
pub mod fixtures;
pub mod log_capture;

pub use fakes::{
    ConflictingStore, FakeOutcome, FakeTransport, FixedResolver, RecordingErrorHandler,
    RecordingExecutor,
};
pub use fixtures::{deposit_submission, packager, repository_config, wait_until, Fixture};
pub use log_capture::{capture_logs, LogCapture};
