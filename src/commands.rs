use anyhow::{bail, Context, Result};
use indicatif::HumanBytes;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cli::OnConflict;
use crate::error::UploadError;
use crate::hashing::calculate_hash;
use crate::session::UploadSession;
use crate::state::{DownloadReference, Phase, SelectedFile, View};
use crate::uploader::Uploader;

pub struct UploadOptions {
    pub endpoint: Url,
    pub field_name: String,
    pub output_dir: PathBuf,
    pub result_name: String,
    pub on_conflict: OnConflict,
    pub timeout: Option<Duration>,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Serialize, Debug)]
pub struct UploadReport {
    pub source: String,
    pub source_bytes: u64,
    pub endpoint: String,
    pub request: u64,
    pub result_path: PathBuf,
    pub result_bytes: u64,
    pub sha256: String,
    pub completed_at: String,
}

impl UploadReport {
    fn new(source_bytes: u64, endpoint: &Url, link: &DownloadReference, result_path: PathBuf) -> Self {
        Self {
            source: link.source_name().to_string(),
            source_bytes,
            endpoint: endpoint.to_string(),
            request: link.token().id(),
            result_path,
            result_bytes: link.size(),
            sha256: link.sha256().to_string(),
            completed_at: link.completed_at().to_rfc3339(),
        }
    }
}

pub async fn run_upload(file: Option<PathBuf>, options: UploadOptions) -> Result<UploadReport> {
    let uploader = Uploader::new(
        options.endpoint.clone(),
        options.field_name.clone(),
        options.timeout,
        !options.quiet && !options.json,
    )?;
    let mut session = UploadSession::new(uploader, &options.result_name);

    if let Some(path) = &file {
        session.select_file(SelectedFile::read(path).await?);
    }
    let source_bytes = session.state().selected().map(|f| f.size()).unwrap_or(0);

    if let Err(e) = session.trigger() {
        return Err(with_alert(e, &session.state().view()));
    }
    if let Phase::Busy(token) = session.state().phase() {
        info!("Upload #{} pending: {}", token.id(), session.state().view());
    }

    // Ctrl-C is the way out of a request that never answers
    if let Some(cancel) = session.cancellation() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let Err(e) = session.settle().await {
        return Err(with_alert(e, &session.state().view()));
    }

    let (Some(link), Some(link_name)) = (session.state().download(), session.state().view().download_link)
    else {
        bail!("Upload finished without a result");
    };
    let result_path = link.save_in(&options.output_dir, options.on_conflict).await?;
    verify_saved(&result_path, link.sha256()).await?;

    let report = UploadReport::new(source_bytes, &options.endpoint, link, result_path);
    print_report(&report, link_name, options.json)?;
    Ok(report)
}

/// The alert on screen becomes the top-level message; the cause stays in the chain.
fn with_alert(err: UploadError, view: &View<'_>) -> anyhow::Error {
    let alert = view.alert.unwrap_or_else(|| err.alert().message());
    anyhow::Error::new(err).context(alert)
}

async fn verify_saved(path: &Path, expected: &str) -> Result<()> {
    let actual = calculate_hash(path)
        .await
        .with_context(|| format!("Failed to re-read result file: {:?}", path))?;
    if actual != expected {
        warn!("Hash mismatch for {:?}: expected {}, got {}", path, expected, actual);
        bail!("Saved result {:?} does not match the downloaded bytes", path);
    }
    Ok(())
}

fn print_report(report: &UploadReport, link_name: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Download Result ({}): {}", link_name, report.result_path.display());
    println!(
        "{:<12} {} ({})",
        "Uploaded",
        report.source,
        HumanBytes(report.source_bytes)
    );
    println!("{:<12} {}", "Received", HumanBytes(report.result_bytes));
    println!("{:<12} {}", "SHA-256", report.sha256);
    Ok(())
}
