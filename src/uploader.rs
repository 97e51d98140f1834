use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::UploadError;
use crate::state::{SelectedFile, BUSY_MESSAGE};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/upload";
pub const DEFAULT_FIELD: &str = "file";

/// Upper bound on what a `Content-Length` header may pre-allocate.
const MAX_PREALLOC: u64 = 1 << 20;

pub struct Uploader {
    client: Client,
    endpoint: Url,
    field_name: String,
    timeout: Option<Duration>,
    show_progress: bool,
}

impl Uploader {
    pub fn new(
        endpoint: Url,
        field_name: String,
        timeout: Option<Duration>,
        show_progress: bool,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!("pcc-upload/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10));
        // Without an explicit timeout a stalled backend keeps the request open
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            field_name,
            timeout,
            show_progress,
        })
    }

    /// Posts `file` as multipart form data and returns the raw response body.
    /// Resolves with `Cancelled` as soon as `cancel` fires.
    pub async fn upload(&self, file: SelectedFile, cancel: CancellationToken) -> Result<Vec<u8>, UploadError> {
        let pb = self.spinner(&file);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = self.exchange(&file, &pb) => result,
        };

        match &outcome {
            Ok(data) => pb.finish_with_message(format!(
                "Received {} for {}",
                HumanBytes(data.len() as u64),
                file.name()
            )),
            Err(_) => pb.finish_and_clear(),
        }
        outcome
    }

    async fn exchange(&self, file: &SelectedFile, pb: &ProgressBar) -> Result<Vec<u8>, UploadError> {
        let mut part = Part::bytes(file.data().to_vec()).file_name(file.name().to_string());
        // Unrecognised content goes without a part type, as a browser form does
        if let Some(kind) = infer::get(file.data()) {
            part = part.mime_str(kind.mime_type())?;
        }
        let form = Form::new().part(self.field_name.clone(), part);

        info!(
            "Uploading {} ({}) to {}",
            file.name(),
            HumanBytes(file.size()),
            self.endpoint
        );
        let resp = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UploadError::Status(status));
        }
        debug!("Response {} with content length {:?}", status, resp.content_length());

        let reserve = resp.content_length().unwrap_or(0).min(MAX_PREALLOC);
        let mut data = Vec::with_capacity(reserve as usize);
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.classify(e))?;
            data.extend_from_slice(&chunk);
            pb.set_message(format!("{} {} received", BUSY_MESSAGE, HumanBytes(data.len() as u64)));
        }

        Ok(data)
    }

    fn classify(&self, err: reqwest::Error) -> UploadError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => UploadError::TimedOut(timeout),
            _ => UploadError::Transport(err),
        }
    }

    fn spinner(&self, file: &SelectedFile) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(if self.show_progress {
            ProgressDrawTarget::stderr_with_hz(5)
        } else {
            ProgressDrawTarget::hidden()
        });
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("{} ({})", BUSY_MESSAGE, file.name()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
