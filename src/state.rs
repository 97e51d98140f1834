use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::cli::OnConflict;
use crate::error::{Alert, UploadError};
use crate::hashing::digest_bytes;
use crate::utils::{get_filename_from_path, resolve_output_path};

pub const DEFAULT_RESULT_NAME: &str = "result.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// The file picked by the user. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    name: String,
    data: Arc<[u8]>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self {
            name: name.into(),
            data: Arc::from(data),
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .await
            .with_context(|| format!("Failed to read input file: {:?}", path))?;
        Ok(Self::new(get_filename_from_path(path), data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Local handle to the bytes of a successful upload.
#[derive(Debug, Clone)]
pub struct DownloadReference {
    token: RequestToken,
    file_name: String,
    source_name: String,
    data: Arc<[u8]>,
    sha256: String,
    completed_at: DateTime<Local>,
}

impl DownloadReference {
    fn new(token: RequestToken, file_name: &str, source_name: &str, data: Vec<u8>) -> Self {
        let sha256 = digest_bytes(&data);
        Self {
            token,
            file_name: file_name.to_string(),
            source_name: source_name.to_string(),
            data: data.into(),
            sha256,
            completed_at: Local::now(),
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    /// Suggested name for the saved result.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn completed_at(&self) -> DateTime<Local> {
        self.completed_at
    }

    pub async fn save_in(&self, dir: &Path, on_conflict: OnConflict) -> Result<PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir).await.context("Failed to create output directory")?;
        }
        let path = resolve_output_path(dir, &self.file_name, on_conflict);
        fs::write(&path, self.bytes())
            .await
            .with_context(|| format!("Failed to write result file: {:?}", path))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Busy(RequestToken),
}

/// Result of pressing the trigger.
#[derive(Debug, Clone)]
pub enum Admission {
    /// A new request may go out with this file.
    Started(RequestToken, SelectedFile),
    /// A request is already out; nothing new is sent.
    Pending(RequestToken),
}

impl Admission {
    pub fn token(&self) -> RequestToken {
        match self {
            Admission::Started(token, _) | Admission::Pending(token) => *token,
        }
    }
}

/// What a front end should draw for the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View<'a> {
    pub trigger_label: &'static str,
    pub trigger_enabled: bool,
    pub busy_indicator: Option<&'static str>,
    pub download_link: Option<&'a str>,
    pub alert: Option<&'static str>,
}

impl fmt::Display for View<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.trigger_label)?;
        if !self.trigger_enabled {
            write!(f, " (disabled)")?;
        }
        if let Some(busy) = self.busy_indicator {
            write!(f, " {}", busy)?;
        }
        if let Some(link) = self.download_link {
            write!(f, " Download Result: {}", link)?;
        }
        if let Some(alert) = self.alert {
            write!(f, " ! {}", alert)?;
        }
        Ok(())
    }
}

pub const IDLE_LABEL: &str = "Upload File";
pub const BUSY_LABEL: &str = "Processing...";
pub const BUSY_MESSAGE: &str = "Processing... Please wait!";

#[derive(Debug)]
pub struct UploadState {
    selected: Option<SelectedFile>,
    phase: Phase,
    download: Option<DownloadReference>,
    alert: Option<Alert>,
    result_name: String,
    next_token: u64,
}

impl Default for UploadState {
    fn default() -> Self {
        Self::new(DEFAULT_RESULT_NAME)
    }
}

impl UploadState {
    pub fn new(result_name: &str) -> Self {
        Self {
            selected: None,
            phase: Phase::Idle,
            download: None,
            alert: None,
            result_name: result_name.to_string(),
            next_token: 1,
        }
    }

    pub fn selected(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Busy(_))
    }

    pub fn download(&self) -> Option<&DownloadReference> {
        self.download.as_ref()
    }

    pub fn alert(&self) -> Option<Alert> {
        self.alert
    }

    /// Replaces the selection. A stale link and alert are cleared, and a
    /// pending request is dropped; its token is returned so the caller can
    /// cancel it.
    pub fn select(&mut self, file: SelectedFile) -> Option<RequestToken> {
        self.selected = Some(file);
        self.download = None;
        self.alert = None;
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Busy(token) => Some(token),
            Phase::Idle => None,
        }
    }

    pub fn begin(&mut self) -> Result<Admission, UploadError> {
        if let Phase::Busy(token) = self.phase {
            return Ok(Admission::Pending(token));
        }
        let Some(file) = self.selected.clone() else {
            self.alert = Some(Alert::NoFileSelected);
            return Err(UploadError::NoFileSelected);
        };

        let token = RequestToken(self.next_token);
        self.next_token += 1;
        self.phase = Phase::Busy(token);
        self.alert = None;
        Ok(Admission::Started(token, file))
    }

    /// Applies the outcome of `token`. Returns false when the token is no
    /// longer the pending one, in which case nothing changes.
    pub fn complete(&mut self, token: RequestToken, outcome: Result<Vec<u8>, Alert>) -> bool {
        if self.phase != Phase::Busy(token) {
            return false;
        }
        self.phase = Phase::Idle;

        match outcome {
            Ok(data) => {
                let source = self.selected.as_ref().map(|f| f.name()).unwrap_or_default();
                self.download = Some(DownloadReference::new(token, &self.result_name, source, data));
                self.alert = None;
            }
            Err(alert) => self.alert = Some(alert),
        }
        true
    }

    pub fn view(&self) -> View<'_> {
        let busy = self.is_busy();
        View {
            trigger_label: if busy { BUSY_LABEL } else { IDLE_LABEL },
            trigger_enabled: !busy,
            busy_indicator: busy.then_some(BUSY_MESSAGE),
            download_link: self.download.as_ref().map(|d| d.file_name()),
            alert: self.alert.map(|a| a.message()),
        }
    }
}
