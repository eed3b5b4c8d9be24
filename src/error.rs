//! Error type returned by the archive filesystem.

use std::io;

pub type Result<T> = std::result::Result<T, ZipFsError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by [`ZipFs`](crate::ZipFs).
///
/// Every variant names the operation that failed and the archive it was
/// working on, so a message read out of a log is enough to find the request.
#[derive(Debug, thiserror::Error)]
pub enum ZipFsError {
    #[error("{op}: {path} does not exist in {archive}")]
    NotFound {
        op: &'static str,
        path: String,
        archive: String,
    },

    #[error("{op}: {path} is a directory, not an archive")]
    InvalidArgument { op: &'static str, path: String },

    #[error("{op}: backing filesystem does not provide random access for {archive}")]
    CapabilityUnsupported { op: &'static str, archive: String },

    #[error("{op}: cannot read central directory of {archive}: {source}")]
    CorruptArchive {
        op: &'static str,
        archive: String,
        #[source]
        source: BoxError,
    },

    #[error("{op}: {archive} is closed")]
    ClosedHandle { op: &'static str, archive: String },

    #[error("{op}: {path} in {archive} uses unsupported {feature}")]
    Unsupported {
        op: &'static str,
        path: String,
        archive: String,
        feature: String,
    },

    #[error("{op}: I/O error on {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: BoxError,
    },
}

impl ZipFsError {
    /// Map a backing filesystem error, keeping `NotFound` distinguishable.
    pub(crate) fn from_backing(op: &'static str, path: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            ZipFsError::NotFound {
                op,
                path: path.to_string(),
                archive: path.to_string(),
            }
        } else {
            ZipFsError::Io {
                op,
                path: path.to_string(),
                source: err.into(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ZipFsError::NotFound { .. })
    }
}

impl From<ZipFsError> for io::Error {
    fn from(err: ZipFsError) -> Self {
        let kind = match &err {
            ZipFsError::NotFound { .. } => io::ErrorKind::NotFound,
            ZipFsError::InvalidArgument { .. } => io::ErrorKind::InvalidInput,
            ZipFsError::CapabilityUnsupported { .. } | ZipFsError::Unsupported { .. } => {
                io::ErrorKind::Unsupported
            }
            ZipFsError::CorruptArchive { .. } => io::ErrorKind::InvalidData,
            ZipFsError::ClosedHandle { .. } => io::ErrorKind::BrokenPipe,
            ZipFsError::Io { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
