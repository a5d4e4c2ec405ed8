//! 日志读写错误定义

use cadastra_core::error::EditError;
use cadastra_core::feature::EditSequence;
use cadastra_core::ids::IdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid journal: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Identifier packets could not be restored: {0}")]
    Packets(#[from] IdError),

    #[error("Replay of edit {sequence} failed: {source}")]
    Replay {
        sequence: EditSequence,
        #[source]
        source: EditError,
    },
}
