//! Error taxonomy shared by every component of the pipeline (C13).

use std::fmt;
use std::path::{Path, PathBuf};

/// The kind of failure that occurred, independent of where it occurred.
#[derive(Debug)]
pub enum ReadCleanError {
    /// An OS-level I/O failure (open/read/write/flush).
    Io {
        source: std::io::Error,
        path:   Option<PathBuf>,
    },
    /// The gzip decoder or encoder rejected data it was given.
    Gzip { message: String, path: Option<PathBuf> },
    /// The bzip2 decoder or encoder rejected data it was given.
    Bzip2 { message: String, path: Option<PathBuf> },
    /// A FASTQ parse error or a violated record invariant.
    Fastq {
        message: String,
        path:    Option<PathBuf>,
        line:    Option<usize>,
    },
    /// A CLI / configuration validation failure.
    Config { message: String },
    /// An assertion that should be unreachable under correct scheduling.
    Internal { message: String },
}

impl ReadCleanError {
    pub fn fastq<S: Into<String>>(message: S) -> Self {
        ReadCleanError::Fastq {
            message: message.into(),
            path:    None,
            line:    None,
        }
    }

    pub fn fastq_at<S: Into<String>>(message: S, path: &Path, line: usize) -> Self {
        ReadCleanError::Fastq {
            message: message.into(),
            path:    Some(path.to_path_buf()),
            line:    Some(line),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        ReadCleanError::Config { message: message.into() }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        ReadCleanError::Internal { message: message.into() }
    }

    /// The short kind name used in diagnostic output.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadCleanError::Io { .. } => "IoError",
            ReadCleanError::Gzip { .. } => "GzipError",
            ReadCleanError::Bzip2 { .. } => "Bzip2Error",
            ReadCleanError::Fastq { .. } => "FastqError",
            ReadCleanError::Config { .. } => "ConfigError",
            ReadCleanError::Internal { .. } => "InternalError",
        }
    }
}

impl fmt::Display for ReadCleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadCleanError::Io { source, path } => {
                write!(f, "{}: {source}", self.kind())?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                Ok(())
            }
            ReadCleanError::Gzip { message, path } | ReadCleanError::Bzip2 { message, path } => {
                write!(f, "{}: {message}", self.kind())?;
                if let Some(path) = path {
                    write!(f, " ({})", path.display())?;
                }
                Ok(())
            }
            ReadCleanError::Fastq { message, path, line } => {
                write!(f, "{}: {message}", self.kind())?;
                match (path, line) {
                    (Some(path), Some(line)) => write!(f, " ({}:{line})", path.display()),
                    (Some(path), None) => write!(f, " ({})", path.display()),
                    _ => Ok(()),
                }
            }
            ReadCleanError::Config { message } => write!(f, "{}: {message}", self.kind()),
            ReadCleanError::Internal { message } => write!(f, "{}: {message}", self.kind()),
        }
    }
}

impl std::error::Error for ReadCleanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadCleanError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ReadCleanError {
    fn from(source: std::io::Error) -> Self {
        ReadCleanError::Io { source, path: None }
    }
}

/// Attaches a path to an I/O-producing `Result`, matching the reference
/// crate's `MapFailedOpenExt` / `MapFailedWriteExt` pattern.
pub trait WithPath<T> {
    fn with_path(self, path: &Path) -> Result<T, ReadCleanError>;
}

impl<T> WithPath<T> for std::io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T, ReadCleanError> {
        self.map_err(|source| ReadCleanError::Io {
            source,
            path: Some(path.to_path_buf()),
        })
    }
}

pub type Result<T> = std::result::Result<T, ReadCleanError>;
