use std::path::PathBuf;

use thiserror::Error;

/// Reasons a single file fails to publish. None of them stops the run.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot read timestamps of {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot rewrite timestamps of {path}: {source}")]
    TimestampWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot create year folder {path}: {source}")]
    FolderCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot copy to {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// Short machine-readable kind, used in run reports
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Stat { .. } => "stat",
            PublishError::TimestampWrite { .. } => "timestamp_write",
            PublishError::FolderCreate { .. } => "folder_create",
            PublishError::Copy { .. } => "copy",
        }
    }
}
