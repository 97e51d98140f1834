use log::{debug, error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::state::{Admission, DownloadReference, RequestToken, SelectedFile, UploadState};
use crate::uploader::Uploader;

struct InFlight {
    token: RequestToken,
    cancel: CancellationToken,
    handle: JoinHandle<Result<Vec<u8>, UploadError>>,
}

/// Drives one `UploadState` against the backend. Holds at most one request;
/// replacing the selection cancels it.
pub struct UploadSession {
    state: UploadState,
    uploader: Arc<Uploader>,
    in_flight: Option<InFlight>,
}

impl UploadSession {
    pub fn new(uploader: Uploader, result_name: &str) -> Self {
        Self {
            state: UploadState::new(result_name),
            uploader: Arc::new(uploader),
            in_flight: None,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn select_file(&mut self, file: SelectedFile) {
        debug!("Selected {} ({} bytes)", file.name(), file.size());
        if let Some(superseded) = self.state.select(file) {
            info!("Cancelling upload #{} for the new selection", superseded.id());
            if let Some(in_flight) = self.in_flight.take() {
                in_flight.cancel.cancel();
                in_flight.handle.abort();
            }
        }
    }

    /// Starts an upload of the selected file. While one is pending this
    /// returns its token and sends nothing.
    pub fn trigger(&mut self) -> Result<RequestToken, UploadError> {
        let admission = self.state.begin()?;
        let token = admission.token();
        let Admission::Started(_, file) = admission else {
            return Ok(token);
        };

        let cancel = CancellationToken::new();
        let uploader = Arc::clone(&self.uploader);
        let child = cancel.clone();
        let handle = tokio::spawn(async move { uploader.upload(file, child).await });

        self.in_flight = Some(InFlight { token, cancel, handle });
        debug!("{}", self.state.view());
        Ok(token)
    }

    /// Token that cancels the pending request, if any.
    pub fn cancellation(&self) -> Option<CancellationToken> {
        self.in_flight.as_ref().map(|f| f.cancel.clone())
    }

    /// Waits for the pending request and applies its outcome. Dropping the
    /// returned future leaves the request pending.
    pub async fn settle(&mut self) -> Result<(), UploadError> {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return Ok(());
        };
        let joined = (&mut in_flight.handle).await;
        let token = in_flight.token;
        self.in_flight = None;

        let outcome = joined.unwrap_or_else(|e| Err(UploadError::Aborted(e.to_string())));
        let applied = match outcome {
            Ok(data) => {
                info!("Upload #{} finished with {} bytes", token.id(), data.len());
                self.state.complete(token, Ok(data));
                Ok(())
            }
            Err(e) => {
                error!("Error during file upload: {}", e);
                self.state.complete(token, Err(e.alert()));
                Err(e)
            }
        };
        debug!("{}", self.state.view());
        applied
    }

    /// Trigger, then wait. Returns the reference built from this attempt.
    pub async fn upload(&mut self) -> Result<&DownloadReference, UploadError> {
        let token = self.trigger()?;
        self.settle().await?;
        match self.state.download() {
            Some(link) if link.token() == token => Ok(link),
            _ => Err(UploadError::Cancelled),
        }
    }
}
