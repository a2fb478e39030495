//! Error taxonomy for the installation pipeline.
//!
//! Errors are grouped by the stage that raises them:
//! - stream matching: [`InstallError::SizeMismatch`], [`InstallError::PathTooLong`],
//!   [`InstallError::UnsafeFilename`], [`InstallError::AmbiguousStream`]
//! - script extraction: [`InstallError::MissingRequiredFile`], [`InstallError::ScriptCopy`]
//! - installation: [`InstallError::HandlerNotFound`], [`InstallError::Handler`],
//!   [`InstallError::StagingIo`]
//! - post-install: [`InstallError::PostInstall`] wrapping [`InstallError::EnvApply`]
//!   and [`InstallError::ManifestWrite`]
//!
//! Callers that need the classic integer status use [`InstallError::code`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the installation core.
pub type InstallResult<T> = Result<T, InstallError>;

/// Failures of the verified copy collaborator.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The sha256 of the payload differs from the declared one.
    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The payload could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompress(#[source] io::Error),

    /// The payload is encrypted and no decryption backend is available.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Reading the input or writing the output failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while matching, extracting and installing an update.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Declared size in the manifest differs from the size in the package.
    #[error("size of '{file}' in manifest ({declared}) does not match size in package ({actual})")]
    SizeMismatch {
        file: String,
        declared: u64,
        actual: u64,
    },

    /// A staging or destination path does not fit the fixed bound.
    #[error("path too long: {path}")]
    PathTooLong { path: String },

    /// A package filename that would resolve outside its directory.
    #[error("'{file}': filename must be a single path component")]
    UnsafeFilename { file: String },

    /// More than one image wants the same file streamed to its handler.
    #[error("'{file}': stream to several handlers unsupported")]
    AmbiguousStream { file: String },

    /// A script declares a filename that the package does not carry.
    #[error("required script '{file}' not found in package")]
    MissingRequiredFile { file: String },

    /// No handler is registered for the type tag.
    #[error("image type '{type_tag}' not supported")]
    HandlerNotFound { type_tag: String },

    /// Open/stat/read/write failure on a staging file.
    #[error("staging file '{}': {source}", .path.display())]
    StagingIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving a script from staging into the scripts directory failed.
    #[error("extracting script '{file}': {source}")]
    ScriptCopy {
        file: String,
        #[source]
        source: CopyError,
    },

    /// A handler reported failure.
    #[error("handler '{handler}' failed for '{file}': {source:#}")]
    Handler {
        file: String,
        handler: String,
        #[source]
        source: anyhow::Error,
    },

    /// A bootloader or variable-store backend rejected the env script.
    #[error("{stage}: {source:#}")]
    EnvApply {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The installed-version manifest could not be written.
    #[error("writing version manifest '{}': {source}", .path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One or more of the independently attempted post-install stages failed.
    #[error("post-install stages failed: {}", summarize(.0))]
    PostInstall(Vec<InstallError>),

    /// The manifest tree does not describe a valid update.
    #[error("manifest: {0}")]
    Manifest(String),
}

fn summarize(failures: &[InstallError]) -> String {
    failures
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl InstallError {
    pub(crate) fn staging(path: impl Into<PathBuf>, source: io::Error) -> Self {
        InstallError::StagingIo {
            path: path.into(),
            source,
        }
    }

    /// Negative errno-style status for this error.
    ///
    /// For [`InstallError::PostInstall`] this is the code of the first failed
    /// stage. It tells a caller that post-install work failed, not which
    /// stage did; inspect the wrapped list for that.
    pub fn code(&self) -> i32 {
        match self {
            InstallError::SizeMismatch { .. } | InstallError::AmbiguousStream { .. } => {
                -libc::EINVAL
            }
            InstallError::PathTooLong { .. } => -libc::EBADF,
            InstallError::UnsafeFilename { .. } => -libc::EINVAL,
            InstallError::MissingRequiredFile { .. } => -libc::ENOENT,
            InstallError::HandlerNotFound { .. } => -libc::ENOENT,
            InstallError::StagingIo { source, .. } => {
                -source.raw_os_error().unwrap_or(libc::EIO)
            }
            InstallError::ScriptCopy { source, .. } => match source {
                CopyError::HashMismatch { .. } => -libc::EFAULT,
                CopyError::Decompress(_) => -libc::EINVAL,
                CopyError::Decrypt(_) => -libc::EACCES,
                CopyError::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
            },
            InstallError::Handler { .. } => -1,
            InstallError::EnvApply { .. } => -1,
            InstallError::ManifestWrite { .. } => -libc::EACCES,
            InstallError::PostInstall(failures) => {
                failures.first().map(InstallError::code).unwrap_or(-1)
            }
            InstallError::Manifest(_) => -libc::EINVAL,
        }
    }

    /// Stages 6–8 that failed, in the order they ran.
    pub fn post_install_failures(&self) -> &[InstallError] {
        match self {
            InstallError::PostInstall(failures) => failures,
            _ => &[],
        }
    }
}
