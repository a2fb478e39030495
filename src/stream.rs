//! Decide what to do with each file found in the incoming package.
//!
//! The package is read sequentially. For every file header the matcher
//! looks for pending entries with the same filename and answers one of:
//! discard the data, stage it to disk for the install loop, or hand the
//! still-open stream to the matched entry's handler right now.

use std::path::Path;

use tracing::error;

use crate::error::{InstallError, InstallResult};
use crate::manifest::{bounded_path, ImageId, ImageList};

/// Name and size of one file in the incoming package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub filename: String,
    pub size: u64,
}

impl FileHeader {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
        }
    }
}

/// What to do with the data behind a [`FileHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDecision {
    /// Nothing needs this file.
    Skip,
    /// Write the data to the staging path of the last matched entry.
    Copy(ImageId),
    /// Feed the data directly to the handler of this entry.
    InstallFromStream(ImageId),
}

/// Match `header` against every pending entry in `list`.
///
/// All matches are validated before any entry is touched: on error no
/// entry is modified. On success every match is marked `provided`, takes
/// the observed size and gets its staging path set to `destdir/filename`.
///
/// Errors:
/// - [`InstallError::SizeMismatch`] when a non-zero declared size differs
/// - [`InstallError::PathTooLong`] when the staging path does not fit
/// - [`InstallError::AmbiguousStream`] when more than one match asks for
///   direct streaming
pub fn check_if_required(
    list: &mut ImageList,
    header: &FileHeader,
    destdir: &Path,
) -> InstallResult<StreamDecision> {
    let matches: Vec<ImageId> = list
        .ids()
        .into_iter()
        .filter(|id| {
            list.get(*id)
                .is_some_and(|img| img.fname == header.filename)
        })
        .collect();

    if matches.is_empty() {
        return Ok(StreamDecision::Skip);
    }

    let mut direct: Option<ImageId> = None;
    for id in &matches {
        let Some(img) = list.get(*id) else { continue };
        if img.size != 0 && img.size != header.size {
            error!(
                "Size in manifest {} does not match size in package {} for {}",
                img.size, header.size, header.filename
            );
            return Err(InstallError::SizeMismatch {
                file: header.filename.clone(),
                declared: img.size,
                actual: header.size,
            });
        }
        if img.install_directly {
            if direct.is_some() {
                error!(
                    "manifest: stream of {} to several handlers unsupported",
                    header.filename
                );
                return Err(InstallError::AmbiguousStream {
                    file: header.filename.clone(),
                });
            }
            direct = Some(*id);
        }
    }

    let extract_file = bounded_path(destdir, &header.filename).inspect_err(|_| {
        error!("Path too long: {}{}", destdir.display(), header.filename);
    })?;

    for id in &matches {
        if let Some(img) = list.get_mut(*id) {
            img.provided = true;
            img.size = header.size;
            img.extract_file = extract_file.clone();
        }
    }

    Ok(match direct {
        Some(id) => StreamDecision::InstallFromStream(id),
        None => StreamDecision::Copy(matches[matches.len() - 1]),
    })
}
