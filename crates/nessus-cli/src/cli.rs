//! Command-line client for exporting and downloading Nessus scan reports.

use std::path::PathBuf;

use std::fmt;

use clap::{Args, Parser, Subcommand};
use nessus_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::Instrument;
use uuid::Uuid;

use crate::client::{AppContext, CliResult, ConnectionArgs};
use crate::commands::scan::handle_scan_download;

const DEFAULT_POLL_DELAY_SECS: u64 = 2;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Parses CLI arguments, installs logging, and executes the requested
/// command. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        level: &cli.log_level,
        format: log_format(cli.log_format.as_deref()),
        version: env!("CARGO_PKG_VERSION"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err:#}");
    }

    let trace_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!(
        "cli",
        command = command_label(&cli.command),
        trace_id = %trace_id
    );

    match dispatch(cli, &trace_id).instrument(span).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli, trace_id: &str) -> CliResult<()> {
    let ctx = AppContext::from_args(cli.connection, trace_id)?;

    match cli.command {
        Command::Scan(scan) => match scan {
            ScanCommand::Download(args) => handle_scan_download(&ctx, args).await,
        },
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Scan(ScanCommand::Download(_)) => "scan_download",
    }
}

#[derive(Parser)]
#[command(name = "nessus", about = "Command-line client for the Nessus scanner API")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[arg(long, global = true, env = "NESSUS_LOG", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(
        long,
        global = true,
        env = "NESSUS_LOG_FORMAT",
        value_parser = ["json", "pretty"],
        help = "Log output format (defaults to pretty in debug builds, json in release)"
    )]
    log_format: Option<String>,
    #[command(subcommand)]
    command: Command,
}

fn log_format(name: Option<&str>) -> LogFormat {
    name.map_or_else(LogFormat::infer, LogFormat::from_name)
}

#[derive(Subcommand)]
enum Command {
    #[command(subcommand)]
    Scan(ScanCommand),
}

#[derive(Subcommand)]
enum ScanCommand {
    /// Export a scan report and download it once the server has rendered it.
    Download(ScanDownloadArgs),
}

#[derive(Args)]
pub(crate) struct ScanDownloadArgs {
    #[arg(help = "Scan identifier")]
    pub(crate) scan_id: u64,
    #[arg(long, help = "Report format: csv, db, html or pdf (default pdf)")]
    pub(crate) format: Option<String>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Report chapters (default vuln_hosts_summary)"
    )]
    pub(crate) chapters: Vec<String>,
    #[arg(long, env = "NESSUS_EXPORT_PASSWORD", hide_env_values = true)]
    pub(crate) password: Option<String>,
    #[arg(long, help = "Export a specific run from the scan history")]
    pub(crate) history_id: Option<u64>,
    #[arg(long, default_value = ".", help = "Existing directory to write the report into")]
    pub(crate) dir: PathBuf,
    #[arg(long, default_value_t = DEFAULT_POLL_DELAY_SECS)]
    pub(crate) poll_delay_secs: u64,
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS)]
    pub(crate) poll_timeout_secs: u64,
    #[arg(long, help = "Suppress readiness progress on stderr")]
    pub(crate) quiet: bool,
}

impl fmt::Debug for ScanDownloadArgs {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ScanDownloadArgs")
            .field("scan_id", &self.scan_id)
            .field("format", &self.format)
            .field("chapters", &self.chapters)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("history_id", &self.history_id)
            .field("dir", &self.dir)
            .field("poll_delay_secs", &self.poll_delay_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("quiet", &self.quiet)
            .finish()
    }
}
