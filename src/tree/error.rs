use std::path::PathBuf;
use thiserror::Error;

use super::node::NodeId;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Cannot read directory {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

pub type TreeResult<T> = Result<T, TreeError>;
