use std::path::PathBuf;

/// Errors from the fallible edges of the crate: rule compilation, rules-file
/// writing, and the host adapter's I/O. The decision engine itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("language model request failed: {0}")]
    Model(String),

    #[error("compiler output is not a rules document: {0}")]
    InvalidCompilerOutput(#[source] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
