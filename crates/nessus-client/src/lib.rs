#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::redundant_pub_crate, clippy::module_name_repetitions)]

//! Client for the Nessus scanner API.
//!
//! Layout:
//! - `retry.rs`: bounded fixed-delay polling with injected progress output
//! - `transport.rs`: typed JSON and raw-byte request operations, reqwest backend
//! - `export.rs`: export, readiness polling, download and size verification
//! - `config.rs`: connection settings and credentials
//! - `error.rs`: error taxonomy shared by every operation

mod config;
mod error;
mod export;
mod retry;
mod transport;

pub use config::{ClientConfig, Credentials, HEADER_API_KEYS, HEADER_COOKIE};
pub use error::{ClientError, ClientResult};
pub use export::{
    DEFAULT_CHAPTERS, DownloadedArtifact, ExportFormat, ExportJob, ExportParams, ExportRequest,
    ExportWorkflow, PollSettings,
};
pub use retry::{
    DEFAULT_RETRY_DELAY, DEFAULT_RETRY_TIMEOUT, ProgressSink, RetryConfig, RetryLoop,
    RetryOutcome, RetryTimeout, TracingProgress, WriterProgress,
};
pub use transport::{HEADER_REQUEST_ID, Query, RawResponse, ReqwestTransport, Transport};
