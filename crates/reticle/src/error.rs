//! Error type shared by loaders, sessions and the bus seam.
//!
//! Geometric invariant violations in the kernel are not represented here: they
//! panic, because they can only come from a defect in the wrap/bucket math.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("unknown lattice type: {0}")]
    UnknownLatticeType(String),

    #[error("unknown vertex type: {0}")]
    UnknownVertexType(String),

    #[error("unknown zero type: {0}")]
    UnknownZeroType(String),

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed sequence data in {}: {source}", path.display())]
    SequenceFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed lattice data in {}: {source}", path.display())]
    LatticeFormat {
        path: PathBuf,
        #[source]
        source: postcard::Error,
    },

    #[error("spawning thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("decoding message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("publishing to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl ScanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSession(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
