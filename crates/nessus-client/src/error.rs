//! # Design
//!
//! - One error enum for every failure the export workflow can surface.
//! - The five workflow kinds (format, server contract, timeout, download
//!   response, integrity) are distinct variants so callers can match on them.
//! - Transport, decoding and IO failures keep their source error and the
//!   request or path that triggered them.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryTimeout;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors produced by the Nessus client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Requested export format is not one of csv, db, html or pdf.
    #[error("invalid export format '{format}' (expected one of csv, db, html, pdf)")]
    InvalidFormat {
        /// Format string supplied by the caller.
        format: String,
    },
    /// The server answered with a payload that violates the API contract.
    #[error("invalid response from server: {message}")]
    InvalidServerResponse {
        /// What was missing or malformed.
        message: String,
    },
    /// Readiness polling ran out of time.
    #[error(
        "timed out after {timeout:?} waiting for {label} ({attempts} attempts, {elapsed:?} elapsed)"
    )]
    Timeout {
        /// Description of the awaited condition.
        label: String,
        /// Attempts performed before giving up.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
        /// Configured deadline.
        timeout: Duration,
    },
    /// The download response lacks a usable disposition or length header.
    #[error("invalid download response: {message}")]
    InvalidDownloadResponse {
        /// What was missing or malformed.
        message: String,
    },
    /// Bytes written to disk disagree with the declared content length.
    #[error(
        "file {} has wrong number of bytes: expected {expected}, wrote {actual}",
        .path.display()
    )]
    IntegrityMismatch {
        /// Target file.
        path: PathBuf,
        /// Length declared by the server.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },
    /// The server returned a non-success status code.
    #[error("{method} {path} failed with status {status}: {message}")]
    Http {
        /// HTTP method of the failed request.
        method: &'static str,
        /// Request path.
        path: String,
        /// Status code returned by the server.
        status: u16,
        /// Server-provided error message or body excerpt.
        message: String,
    },
    /// The request could not be sent or its body could not be read.
    #[error("{method} {path} request failed")]
    Request {
        /// HTTP method of the failed request.
        method: &'static str,
        /// Request path.
        path: String,
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
    /// A JSON body could not be decoded into the expected shape.
    #[error("failed to decode response from {path}")]
    Decode {
        /// Request path.
        path: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Filesystem failure while storing a download.
    #[error("failed to {operation} {}", .path.display())]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A base URL or request path could not be turned into a URL.
    #[error("invalid URL '{input}'")]
    InvalidUrl {
        /// Offending input.
        input: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// A configured value cannot be encoded as an HTTP header.
    #[error("value for header '{name}' contains invalid characters")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
    },
    /// A built-in response pattern failed to compile.
    #[error("failed to compile response pattern")]
    Pattern {
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    ClientBuild {
        /// Underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Whether the failure means the export was still processing when the
    /// deadline passed, as opposed to something being broken.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<RetryTimeout> for ClientError {
    fn from(timeout: RetryTimeout) -> Self {
        Self::Timeout {
            label: timeout.label,
            attempts: timeout.attempts,
            elapsed: timeout.elapsed,
            timeout: timeout.timeout,
        }
    }
}
