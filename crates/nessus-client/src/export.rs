//! Scan report export: request, poll for readiness, download, verify.
//!
//! # Design
//! - Caller parameters are merged over the defaults (`pdf`,
//!   `vuln_hosts_summary`) and validated before any request is sent.
//! - Only the readiness check is retried, through [`RetryLoop`]; every other
//!   step fails on its first error.
//! - The download goes through the raw transport path and is accepted only
//!   when the bytes on disk match the declared `content-length`.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ClientError, ClientResult};
use crate::retry::{
    DEFAULT_RETRY_DELAY, DEFAULT_RETRY_TIMEOUT, ProgressSink, RetryConfig, RetryLoop,
    RetryOutcome, TracingProgress,
};
use crate::transport::{RawResponse, Transport};

/// Chapters requested when the caller does not name any.
pub const DEFAULT_CHAPTERS: &[&str] = &["vuln_hosts_summary"];

const STATUS_READY: &str = "ready";
const HEADER_CONTENT_DISPOSITION: &str = "content-disposition";
const HEADER_CONTENT_LENGTH: &str = "content-length";

static DISPOSITION_PATTERN: OnceCell<Regex> = OnceCell::new();

/// Report formats the export endpoint accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated values.
    Csv,
    /// Encrypted Nessus database; pairs with a password.
    Db,
    /// HTML report.
    Html,
    /// PDF report.
    #[default]
    Pdf,
}

impl ExportFormat {
    /// Wire name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Db => "db",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "csv" => Ok(Self::Csv),
            "db" => Ok(Self::Db),
            "html" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            other => Err(ClientError::InvalidFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Caller overrides for an export. Unset fields fall back to the defaults;
/// set fields always win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportParams {
    /// Format name; validated when the request is built.
    pub format: Option<String>,
    /// Report chapters, in order.
    pub chapters: Option<Vec<String>>,
    /// Password protecting `db` exports.
    pub password: Option<String>,
    /// Scan run to export instead of the most recent one.
    pub history_id: Option<u64>,
}

impl ExportParams {
    /// Empty overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Override the chapter list.
    #[must_use]
    pub fn with_chapters<I, S>(mut self, chapters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chapters = Some(chapters.into_iter().map(Into::into).collect());
        self
    }

    /// Set the export password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Export a specific scan run.
    #[must_use]
    pub const fn with_history_id(mut self, history_id: u64) -> Self {
        self.history_id = Some(history_id);
        self
    }
}

/// Validated export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Scan to export.
    pub scan_id: u64,
    /// Report format.
    pub format: ExportFormat,
    /// Report chapters, in order.
    pub chapters: Vec<String>,
    /// Password protecting `db` exports.
    pub password: Option<String>,
    /// Scan run to export; the latest when unset.
    pub history_id: Option<u64>,
}

impl ExportRequest {
    /// Merge `params` over the defaults and validate the format.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidFormat`] for formats other than csv,
    /// db, html and pdf.
    pub fn new(scan_id: u64, params: ExportParams) -> ClientResult<Self> {
        let format = match params.format.as_deref() {
            Some(format) => format.parse()?,
            None => ExportFormat::default(),
        };
        let chapters = params.chapters.unwrap_or_else(|| {
            DEFAULT_CHAPTERS
                .iter()
                .map(|chapter| (*chapter).to_string())
                .collect()
        });

        Ok(Self {
            scan_id,
            format,
            chapters,
            password: params.password,
            history_id: params.history_id,
        })
    }

    fn path(&self) -> String {
        format!("/scans/{}/export", self.scan_id)
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        self.history_id
            .map(|id| vec![("history_id", id.to_string())])
            .unwrap_or_default()
    }

    fn body(&self) -> ExportBody<'_> {
        ExportBody {
            format: self.format,
            chapters: &self.chapters,
            password: self.password.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportBody<'a> {
    format: ExportFormat,
    chapters: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportResponse {
    #[serde(default)]
    file: Option<FileHandle>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileHandle {
    Text(String),
    Number(u64),
}

impl FileHandle {
    fn into_id(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Server-side export job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    /// Scan the job belongs to.
    pub scan_id: u64,
    /// Opaque file handle assigned by the server.
    pub file_id: String,
}

impl ExportJob {
    fn status_path(&self) -> String {
        format!("/scans/{}/export/{}/status", self.scan_id, self.file_id)
    }

    fn download_path(&self) -> String {
        format!("/scans/{}/export/{}/download", self.scan_id, self.file_id)
    }
}

/// A downloaded report whose size matched the server's declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    /// File name taken from the `content-disposition` header.
    pub filename: String,
    /// Location of the written file.
    pub path: PathBuf,
    /// Bytes written, equal to the declared `content-length`.
    pub byte_length: u64,
}

/// Readiness polling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between status checks. Defaults to 2 seconds.
    pub delay: Duration,
    /// Give up after this long. Defaults to 30 seconds.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_RETRY_TIMEOUT,
        }
    }
}

/// Export-then-download workflow over a [`Transport`].
///
/// Each instance is independent; run several concurrently for parallel
/// exports.
pub struct ExportWorkflow<'a, T> {
    transport: &'a T,
    poll: PollSettings,
    progress: Arc<dyn ProgressSink>,
}

impl<'a, T: Transport> ExportWorkflow<'a, T> {
    /// Workflow with default polling and `tracing` progress output.
    #[must_use]
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            poll: PollSettings::default(),
            progress: Arc::new(TracingProgress),
        }
    }

    /// Override the polling delay and deadline.
    #[must_use]
    pub const fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Send readiness progress to another sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Export scan `scan_id`, wait for the report, and store it in
    /// `download_dir` under the server-assigned name.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidFormat` before any request, `InvalidServerResponse`
    /// when the export reply has no file handle, `Timeout` when the report is
    /// not ready in time, `InvalidDownloadResponse` for unusable download
    /// headers, `IntegrityMismatch` when the written size differs from the
    /// declared one, and transport or IO errors as they occur.
    #[instrument(name = "export.download", skip(self, params, download_dir))]
    pub async fn export_and_download(
        &self,
        scan_id: u64,
        params: ExportParams,
        download_dir: &Path,
    ) -> ClientResult<DownloadedArtifact> {
        let request = ExportRequest::new(scan_id, params)?;
        let job = self.request_export(&request).await?;
        self.wait_until_ready(&job).await?;
        self.download(&job, download_dir).await
    }

    /// Ask the server to start rendering the report.
    ///
    /// # Errors
    ///
    /// Returns `InvalidServerResponse` when the reply carries no usable file
    /// handle.
    pub async fn request_export(&self, request: &ExportRequest) -> ClientResult<ExportJob> {
        let reply: Option<ExportResponse> = self
            .transport
            .post_json(&request.path(), &request.query(), &request.body())
            .await?;

        let file_id = reply
            .and_then(|reply| reply.file)
            .map(FileHandle::into_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ClientError::InvalidServerResponse {
                message: format!(
                    "export of scan {} returned no file identifier",
                    request.scan_id
                ),
            })?;

        tracing::info!(
            scan_id = request.scan_id,
            file_id = %file_id,
            format = %request.format,
            "export requested"
        );
        Ok(ExportJob {
            scan_id: request.scan_id,
            file_id,
        })
    }

    /// Poll the export status until it reports `ready`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes, or the first transport
    /// error raised by a status check.
    pub async fn wait_until_ready(&self, job: &ExportJob) -> ClientResult<RetryOutcome> {
        let config = RetryConfig::new()
            .with_delay(self.poll.delay)
            .with_timeout(self.poll.timeout)
            .with_label(format!(
                "export {} of scan {}",
                job.file_id, job.scan_id
            ));
        let path = job.status_path();

        let outcome = RetryLoop::new(config)
            .with_progress(Arc::clone(&self.progress))
            .run(|attempt| {
                let path = path.as_str();
                async move {
                    let reply: Option<StatusResponse> =
                        self.transport.get_json(path, &[]).await?;
                    let status = reply.and_then(|reply| reply.status);
                    tracing::debug!(attempt, status = ?status, "export status checked");
                    Ok::<_, ClientError>(status.as_deref() == Some(STATUS_READY))
                }
            })
            .await?;

        tracing::info!(
            file_id = %job.file_id,
            attempts = outcome.attempts,
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "export ready"
        );
        Ok(outcome)
    }

    /// Download a ready export into `download_dir` and verify its size.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDownloadResponse` for missing or malformed headers,
    /// `IntegrityMismatch` when the written size is wrong, and IO errors
    /// from writing the file.
    pub async fn download(
        &self,
        job: &ExportJob,
        download_dir: &Path,
    ) -> ClientResult<DownloadedArtifact> {
        let response = self.transport.get_raw(&job.download_path(), &[]).await?;

        let filename = disposition_filename(&response)?;
        let expected = declared_length(&response)?;
        let path = download_dir.join(&filename);

        let actual = write_file(&path, &response.body).await?;
        if actual != expected {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove mismatched download");
            }
            return Err(ClientError::IntegrityMismatch {
                path,
                expected,
                actual,
            });
        }

        tracing::info!(path = %path.display(), bytes = actual, "export downloaded");
        Ok(DownloadedArtifact {
            filename,
            path,
            byte_length: actual,
        })
    }
}

fn disposition_pattern() -> ClientResult<&'static Regex> {
    DISPOSITION_PATTERN.get_or_try_init(|| {
        Regex::new(r#"attachment; filename="([^"]+)""#)
            .map_err(|source| ClientError::Pattern { source })
    })
}

/// Server-assigned file name from `content-disposition`. Names that would
/// escape the download directory are rejected.
/// Header text, distinguishing an absent header from one that is not
/// visible ASCII.
fn required_header<'r>(response: &'r RawResponse, name: &str) -> ClientResult<&'r str> {
    let value = response
        .headers
        .get(name)
        .ok_or_else(|| ClientError::InvalidDownloadResponse {
            message: format!("missing {name} header"),
        })?;
    value
        .to_str()
        .map_err(|_| ClientError::InvalidDownloadResponse {
            message: format!(
                "unreadable {name} header '{}'",
                String::from_utf8_lossy(value.as_bytes())
            ),
        })
}

fn disposition_filename(response: &RawResponse) -> ClientResult<String> {
    let header = required_header(response, HEADER_CONTENT_DISPOSITION)?;

    let filename = disposition_pattern()?
        .captures(header)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .ok_or_else(|| ClientError::InvalidDownloadResponse {
            message: format!("unrecognised content-disposition '{header}'"),
        })?;

    let mut components = Path::new(&filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(filename),
        _ => Err(ClientError::InvalidDownloadResponse {
            message: format!("unsafe file name '{filename}'"),
        }),
    }
}

fn declared_length(response: &RawResponse) -> ClientResult<u64> {
    let header = required_header(response, HEADER_CONTENT_LENGTH)?;
    header
        .trim()
        .parse()
        .map_err(|_| ClientError::InvalidDownloadResponse {
            message: format!("content-length '{header}' is not an integer"),
        })
}

/// Write `bytes` to `path` and report the size that landed on disk.
async fn write_file(path: &Path, bytes: &[u8]) -> ClientResult<u64> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| ClientError::Io {
            operation: "write",
            path: path.to_path_buf(),
            source,
        })?;
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| ClientError::Io {
            operation: "inspect",
            path: path.to_path_buf(),
            source,
        })?;
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, Credentials};
    use crate::retry::WriterProgress;
    use crate::transport::ReqwestTransport;
    use crate::transport::testing::FakeTransport;
    use httpmock::prelude::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    const EXPORT_PATH: &str = "/scans/42/export";
    const STATUS_PATH: &str = "/scans/42/export/7/status";
    const DOWNLOAD_PATH: &str = "/scans/42/export/7/download";

    fn download_reply(disposition: Option<&str>, length: Option<&str>, body: Vec<u8>) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(value) = disposition {
            headers.insert(
                HEADER_CONTENT_DISPOSITION,
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        if let Some(value) = length {
            headers.insert(
                HEADER_CONTENT_LENGTH,
                HeaderValue::from_str(value).expect("header value"),
            );
        }
        RawResponse {
            status: 200,
            headers,
            body,
        }
    }

    fn quiet<T: Transport>(workflow: ExportWorkflow<'_, T>) -> ExportWorkflow<'_, T> {
        workflow.with_progress(Arc::new(WriterProgress::new(Vec::new())))
    }

    #[test]
    fn params_merge_over_defaults() {
        let request = ExportRequest::new(1, ExportParams::new()).expect("defaults are valid");
        assert_eq!(request.format, ExportFormat::Pdf);
        assert_eq!(request.chapters, vec!["vuln_hosts_summary".to_string()]);
        assert!(request.password.is_none());

        let request = ExportRequest::new(
            1,
            ExportParams::new()
                .with_format("db")
                .with_chapters(["vuln_by_host", "remediations"])
                .with_password("hunter2")
                .with_history_id(3),
        )
        .expect("overrides are valid");
        assert_eq!(request.format, ExportFormat::Db);
        assert_eq!(request.chapters, vec!["vuln_by_host", "remediations"]);
        assert_eq!(request.password.as_deref(), Some("hunter2"));
        assert_eq!(request.query(), vec![("history_id", "3".to_string())]);
    }

    #[test]
    fn format_parsing_accepts_only_known_formats() {
        for name in ["csv", "db", "html", "pdf"] {
            let format: ExportFormat = name.parse().expect("known format");
            assert_eq!(format.as_str(), name);
        }
        for name in ["xml", "nessus", "PDF", ""] {
            assert!(matches!(
                name.parse::<ExportFormat>(),
                Err(ClientError::InvalidFormat { .. })
            ));
        }
    }

    #[test]
    fn export_body_omits_absent_password() {
        let request = ExportRequest::new(1, ExportParams::new()).expect("valid");
        let body = serde_json::to_value(request.body()).expect("serialises");
        assert_eq!(
            body,
            json!({"format": "pdf", "chapters": ["vuln_hosts_summary"]})
        );
    }

    #[test]
    fn disposition_filename_extracts_quoted_name() {
        let reply = download_reply(Some("attachment; filename=\"scan 42.html\""), None, Vec::new());
        assert_eq!(
            disposition_filename(&reply).expect("parsed"),
            "scan 42.html"
        );
    }

    #[test]
    fn non_ascii_disposition_is_unreadable_not_missing() {
        let mut reply = download_reply(None, Some("4"), Vec::new());
        reply.headers.insert(
            HEADER_CONTENT_DISPOSITION,
            HeaderValue::from_bytes("attachment; filename=\"rapport_été.pdf\"".as_bytes())
                .expect("header value"),
        );

        let message = match disposition_filename(&reply) {
            Err(ClientError::InvalidDownloadResponse { message }) => message,
            other => panic!("unexpected result: {other:?}"),
        };
        assert!(message.starts_with("unreadable content-disposition header"), "{message}");
        assert!(message.contains("rapport_été.pdf"), "{message}");

        let missing = download_reply(None, Some("4"), Vec::new());
        assert!(matches!(
            disposition_filename(&missing),
            Err(ClientError::InvalidDownloadResponse { message }) if message.contains("missing")
        ));
    }

    #[test]
    fn disposition_filename_rejects_missing_malformed_and_unsafe_names() {
        let cases = [
            None,
            Some("inline"),
            Some("attachment; filename=report.pdf"),
            Some("attachment; filename=\"../report.pdf\""),
            Some("attachment; filename=\"nested/report.pdf\""),
            Some("attachment; filename=\"..\""),
        ];
        for header in cases {
            let reply = download_reply(header, Some("0"), Vec::new());
            assert!(
                matches!(
                    disposition_filename(&reply),
                    Err(ClientError::InvalidDownloadResponse { .. })
                ),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn declared_length_requires_integer() {
        let reply = download_reply(None, Some("12"), Vec::new());
        assert_eq!(declared_length(&reply).expect("parsed"), 12);

        for header in [None, Some("twelve"), Some("-1")] {
            let reply = download_reply(None, header, Vec::new());
            assert!(matches!(
                declared_length(&reply),
                Err(ClientError::InvalidDownloadResponse { .. })
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_format_issues_no_requests() {
        let transport = FakeTransport::new();
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new().with_format("xml"), dir.path())
            .await
            .expect_err("xml rejected");

        assert!(matches!(err, ClientError::InvalidFormat { ref format } if format == "xml"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_export_reply_is_a_contract_violation() {
        let transport = FakeTransport::new().with_json("POST", EXPORT_PATH, json!({}));
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new(), dir.path())
            .await
            .expect_err("missing file id");

        assert!(matches!(err, ClientError::InvalidServerResponse { .. }));
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(transport.calls_to(STATUS_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_file_id_is_a_contract_violation() {
        let transport = FakeTransport::new().with_json("POST", EXPORT_PATH, json!({"file": ""}));
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new(), dir.path())
            .await
            .expect_err("blank file id");
        assert!(matches!(err, ClientError::InvalidServerResponse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_without_downloading() {
        let transport = FakeTransport::new()
            .with_json("POST", EXPORT_PATH, json!({"file": 7}))
            .with_json("GET", STATUS_PATH, json!({"status": "loading"}));
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport).with_poll_settings(PollSettings {
            delay: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        }))
        .export_and_download(42, ExportParams::new(), dir.path())
        .await
        .expect_err("never ready");

        assert!(err.is_timeout());
        assert!(matches!(err, ClientError::Timeout { attempts: 6, .. }));
        assert_eq!(transport.calls_to(STATUS_PATH), 6);
        assert_eq!(transport.calls_to(DOWNLOAD_PATH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_failure_is_not_retried() {
        let transport = FakeTransport::new().with_json("POST", EXPORT_PATH, json!({"file": 7}));
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new(), dir.path())
            .await
            .expect_err("status endpoint missing");

        assert!(matches!(err, ClientError::Http { status: 404, .. }));
        assert_eq!(transport.calls_to(STATUS_PATH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn short_body_fails_integrity_check() {
        let transport = FakeTransport::new()
            .with_json("POST", EXPORT_PATH, json!({"file": 7}))
            .with_json("GET", STATUS_PATH, json!({"status": "ready"}))
            .with_raw(
                DOWNLOAD_PATH,
                download_reply(
                    Some("attachment; filename=\"report.pdf\""),
                    Some("1024"),
                    vec![b'x'; 1000],
                ),
            );
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new(), dir.path())
            .await
            .expect_err("size mismatch");

        let message = err.to_string();
        assert!(message.contains("1024"));
        assert!(message.contains("1000"));
        assert!(matches!(
            err,
            ClientError::IntegrityMismatch { expected: 1024, actual: 1000, ref path }
                if path == &dir.path().join("report.pdf")
        ));
        assert!(!dir.path().join("report.pdf").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_disposition_is_rejected() {
        let transport = FakeTransport::new()
            .with_json("POST", EXPORT_PATH, json!({"file": "7"}))
            .with_json("GET", STATUS_PATH, json!({"status": "ready"}))
            .with_raw(DOWNLOAD_PATH, download_reply(None, Some("3"), vec![1, 2, 3]));
        let dir = tempfile::tempdir().expect("tempdir");

        let err = quiet(ExportWorkflow::new(&transport))
            .export_and_download(42, ExportParams::new(), dir.path())
            .await
            .expect_err("no disposition");
        assert!(matches!(err, ClientError::InvalidDownloadResponse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_downloads_verified_report() {
        let body: Vec<u8> = (0..2048_u32).map(|value| (value % 251) as u8).collect();
        let transport = FakeTransport::new()
            .with_json("POST", EXPORT_PATH, json!({"file": 7}))
            .with_json("GET", STATUS_PATH, json!({"status": "queued"}))
            .with_json("GET", STATUS_PATH, json!({"status": "queued"}))
            .with_json("GET", STATUS_PATH, json!({"status": "ready"}))
            .with_raw(
                DOWNLOAD_PATH,
                download_reply(
                    Some("attachment; filename=\"report.pdf\""),
                    Some("2048"),
                    body.clone(),
                ),
            );
        let dir = tempfile::tempdir().expect("tempdir");

        let artifact = quiet(ExportWorkflow::new(&transport).with_poll_settings(PollSettings::default()))
            .export_and_download(
                42,
                ExportParams::new().with_format("pdf").with_history_id(11),
                dir.path(),
            )
            .await
            .expect("export succeeds");

        assert_eq!(artifact.filename, "report.pdf");
        assert_eq!(artifact.byte_length, 2048);
        assert_eq!(artifact.path, dir.path().join("report.pdf"));
        assert_eq!(std::fs::read(&artifact.path).expect("file on disk"), body);
        assert_eq!(transport.calls_to(STATUS_PATH), 3);
        assert_eq!(transport.calls_to(DOWNLOAD_PATH), 1);

        let calls = transport.calls();
        let export_call = calls.first().expect("export call");
        assert_eq!(export_call.method, "POST");
        assert_eq!(
            export_call.query,
            vec![("history_id".to_string(), "11".to_string())]
        );
        assert_eq!(
            export_call.body,
            Some(json!({"format": "pdf", "chapters": ["vuln_hosts_summary"]}))
        );
    }

    #[tokio::test]
    async fn end_to_end_over_http() {
        let server = MockServer::start_async().await;
        let body = vec![b'%'; 512];
        let reply = body.clone();

        let export = server.mock(|when, then| {
            when.method(POST)
                .path("/scans/9/export")
                .header("x-apikeys", "accessKey=ak; secretKey=sk")
                .json_body(json!({
                    "format": "csv",
                    "chapters": ["vuln_by_plugin"]
                }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"file": 555}));
        });
        let status = server.mock(|when, then| {
            when.method(GET).path("/scans/9/export/555/status");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"status": "ready"}));
        });
        let download = server.mock(move |when, then| {
            when.method(GET).path("/scans/9/export/555/download");
            then.status(200)
                .header("content-type", "text/csv")
                .header("content-disposition", "attachment; filename=\"scan_9.csv\"")
                .body(reply);
        });

        let config = ClientConfig::new(&server.base_url(), Credentials::api_keys("ak", "sk"))
            .expect("valid URL");
        let transport = ReqwestTransport::new(&config).expect("transport");
        let dir = tempfile::tempdir().expect("tempdir");

        let artifact = quiet(ExportWorkflow::new(&transport).with_poll_settings(PollSettings {
            delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }))
        .export_and_download(
            9,
            ExportParams::new()
                .with_format("csv")
                .with_chapters(["vuln_by_plugin"]),
            dir.path(),
        )
        .await
        .expect("export succeeds");

        export.assert();
        status.assert();
        download.assert();
        assert_eq!(artifact.filename, "scan_9.csv");
        assert_eq!(artifact.byte_length, 512);
        assert_eq!(std::fs::read(artifact.path).expect("file on disk"), body);
    }

    #[tokio::test]
    async fn non_json_export_reply_is_a_contract_violation() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/scans/9/export");
            then.status(200).header("content-type", "text/html").body("<html/>");
        });

        let config = ClientConfig::new(&server.base_url(), Credentials::session_token("tok"))
            .expect("valid URL");
        let transport = ReqwestTransport::new(&config).expect("transport");
        let request = ExportRequest::new(9, ExportParams::new()).expect("valid");

        let err = quiet(ExportWorkflow::new(&transport))
            .request_export(&request)
            .await
            .expect_err("html reply rejected");
        assert!(matches!(err, ClientError::InvalidServerResponse { .. }));
    }
}
