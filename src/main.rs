mod cli;
mod commands;
mod error;
mod hashing;
mod session;
mod state;
mod uploader;
mod utils;

#[cfg(test)]
mod stub;

use anyhow::Result;
use clap::Parser;
use crate::cli::OnConflict;
use crate::commands::UploadOptions;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Protein Content Calculator: upload a spreadsheet and save the labelled result.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Spreadsheet to upload
    #[arg(index = 1)]
    file: Option<PathBuf>,

    /// Upload endpoint of the calculation service
    #[arg(short = 'e', long, default_value = uploader::DEFAULT_ENDPOINT, value_parser = Url::parse)]
    endpoint: Url,

    /// Multipart field name the service reads the file from
    #[arg(long, default_value = uploader::DEFAULT_FIELD)]
    field: String,

    /// Directory to save the result into
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// File name for the saved result
    #[arg(short = 'n', long = "result-name", default_value = state::DEFAULT_RESULT_NAME)]
    result_name: String,

    /// What to do when the result file already exists
    #[arg(long = "on-conflict", value_enum, default_value = "rename")]
    on_conflict: OnConflict,

    /// Give up after this many seconds (default: wait until Ctrl-C)
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Print the upload report as JSON
    #[arg(long)]
    json: bool,

    /// Do not draw the busy spinner
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = Args::parse();

    // Output dir might not exist yet, so we resolve it relative to current dir
    if args.output_dir.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            args.output_dir = cwd.join(&args.output_dir);
        }
    }

    let options = UploadOptions {
        endpoint: args.endpoint,
        field_name: args.field,
        output_dir: args.output_dir,
        result_name: args.result_name,
        on_conflict: args.on_conflict,
        timeout: args.timeout.map(Duration::from_secs),
        json: args.json,
        quiet: args.quiet,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { crate::commands::run_upload(args.file, options).await })?;
    Ok(())
}
