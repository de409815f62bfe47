use std::sync::Arc;
use std::time::Duration;

use nessus_client::{
    DownloadedArtifact, ExportParams, ExportWorkflow, PollSettings, ProgressSink, TracingProgress,
    Transport, WriterProgress,
};
use tracing::info;

use crate::cli::ScanDownloadArgs;
use crate::client::{AppContext, CliError, CliResult};

pub(crate) async fn handle_scan_download(ctx: &AppContext, args: ScanDownloadArgs) -> CliResult<()> {
    let artifact = export_scan(&ctx.transport, &args).await?;
    info!(
        filename = %artifact.filename,
        bytes = artifact.byte_length,
        "scan report downloaded"
    );
    println!("{}", artifact.path.display());
    Ok(())
}

async fn export_scan<T: Transport>(
    transport: &T,
    args: &ScanDownloadArgs,
) -> CliResult<DownloadedArtifact> {
    if !args.dir.is_dir() {
        return Err(CliError::validation(format!(
            "download directory {} does not exist",
            args.dir.display()
        )));
    }

    let poll = PollSettings {
        delay: Duration::from_secs(args.poll_delay_secs),
        timeout: Duration::from_secs(args.poll_timeout_secs),
    };
    let progress: Arc<dyn ProgressSink> = if args.quiet {
        Arc::new(TracingProgress)
    } else {
        Arc::new(WriterProgress::stderr())
    };

    ExportWorkflow::new(transport)
        .with_poll_settings(poll)
        .with_progress(progress)
        .export_and_download(args.scan_id, export_params(args), &args.dir)
        .await
        .map_err(CliError::from)
}

fn export_params(args: &ScanDownloadArgs) -> ExportParams {
    let mut params = ExportParams::new();
    if let Some(format) = &args.format {
        params = params.with_format(format.clone());
    }
    if !args.chapters.is_empty() {
        params = params.with_chapters(args.chapters.iter().cloned());
    }
    if let Some(password) = &args.password {
        params = params.with_password(password.clone());
    }
    if let Some(history_id) = args.history_id {
        params = params.with_history_id(history_id);
    }
    params
}
