use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("no file selected")]
    NoFileSelected,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(StatusCode),

    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload task ended unexpectedly: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reported before anything is sent.
    Precondition,
    Transport,
}

/// What the user gets told. Failures carry no further detail on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    NoFileSelected,
    UploadFailed,
}

impl Alert {
    pub fn message(&self) -> &'static str {
        match self {
            Alert::NoFileSelected => "Please select a file first.",
            Alert::UploadFailed => "Error uploading file. Please try again.",
        }
    }
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::NoFileSelected => ErrorKind::Precondition,
            _ => ErrorKind::Transport,
        }
    }

    pub fn alert(&self) -> Alert {
        match self.kind() {
            ErrorKind::Precondition => Alert::NoFileSelected,
            ErrorKind::Transport => Alert::UploadFailed,
        }
    }
}
