use thiserror::Error;

use piramide_client::ClientError;
use piramide_types::models::PostId;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A post or reply failed; `text` is the user's input, handed back untouched.
    #[error("{source}")]
    Write { source: ClientError, text: String },

    #[error("local store error: {0}")]
    Store(String),

    #[error("post {0} is not in the current feed")]
    UnknownPost(PostId),
}

impl SyncError {
    pub fn write(source: ClientError, text: impl Into<String>) -> Self {
        Self::Write {
            source,
            text: text.into(),
        }
    }

    /// The client failure underneath, if any.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Self::Client(e) | Self::Write { source: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Input to put back into the composer after a failed write.
    pub fn restored_text(&self) -> Option<&str> {
        match self {
            Self::Write { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", e))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
