use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed store value: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no helper is listening for {0}")]
    NoListener(&'static str),

    #[error("another helper already holds {0:?}")]
    AlreadyRunning(PathBuf),

    #[error("signal delivery failed: {0}")]
    Signal(#[from] nix::errno::Errno),

    #[error("menu tag {tag} out of range (have {len} entries)")]
    InvalidTag { tag: usize, len: usize },

    #[error("no target folder could be resolved")]
    NoTargetFolder,

    #[error("nothing is selected")]
    NoSelection,

    #[error("menu entry {0} is not bound to an application")]
    Unbound(uuid::Uuid),

    #[error("application not found: {0}")]
    AppNotFound(String),

    #[error("{program} exited with {status}")]
    Launch { program: String, status: String },

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("permission denied writing to {path:?}")]
    PermissionDenied { path: PathBuf, external_volume: bool },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<arboard::Error> for Error {
    fn from(err: arboard::Error) -> Self {
        Error::Clipboard(err.to_string())
    }
}
