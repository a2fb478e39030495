//! Image and script entries, and the ordered list that owns them.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, InstallResult};
use crate::manifest::dict::Dict;

/// Size bound of staging and destination paths, including the terminator
/// slot the on-device format reserves. Paths of `MAX_IMAGE_FNAME` bytes or
/// longer are rejected.
pub const MAX_IMAGE_FNAME: usize = 256;

/// Payload compression declared in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    #[default]
    None,
    Zlib,
    Zstd,
}

impl CompressionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "false" => Some(CompressionKind::None),
            "zlib" | "true" => Some(CompressionKind::Zlib),
            "zstd" => Some(CompressionKind::Zstd),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionKind::None => write!(f, "none"),
            CompressionKind::Zlib => write!(f, "zlib"),
            CompressionKind::Zstd => write!(f, "zstd"),
        }
    }
}

/// Component identity used for version bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentId {
    pub name: String,
    pub version: String,
}

/// One image or script declared in the manifest.
#[derive(Debug, Clone, Default)]
pub struct ImageEntry {
    /// Filename inside the update package.
    pub fname: String,
    /// Handler type tag.
    pub type_tag: String,
    /// Declared size; 0 means unknown until the package is read.
    pub size: u64,
    /// Expected sha256 of the payload, lowercase hex.
    pub sha256: Option<String>,
    pub compressed: CompressionKind,
    pub encrypted: bool,
    /// IV for encrypted payloads, as written in the manifest.
    pub ivt: Option<String>,
    /// Streamed straight to the handler while the package is read.
    pub install_directly: bool,
    /// Payload was found in the incoming package.
    pub provided: bool,
    /// Where the payload was staged. Empty until matched.
    pub extract_file: PathBuf,
    /// Final destination, if the handler writes to a path.
    pub path: PathBuf,
    pub id: ComponentId,
    pub properties: Dict,
    pub is_script: bool,
}

impl ImageEntry {
    pub fn new(fname: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            fname: fname.into(),
            type_tag: type_tag.into(),
            ..Self::default()
        }
    }

    pub fn script(fname: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            is_script: true,
            ..Self::new(fname, type_tag)
        }
    }

    /// True when the destination is the staged file itself.
    pub fn staged_in_place(&self) -> bool {
        !self.path.as_os_str().is_empty()
            && !self.extract_file.as_os_str().is_empty()
            && self.path == self.extract_file
    }
}

/// Join `dir` and `name`, rejecting results that do not fit
/// [`MAX_IMAGE_FNAME`].
///
/// `name` must be a plain filename; see [`check_fname`].
pub fn bounded_path(dir: &Path, name: &str) -> InstallResult<PathBuf> {
    check_fname(name)?;
    let path = dir.join(name);
    check_bound(&path)?;
    Ok(path)
}

/// Reject package filenames that could leave the directory they are
/// joined to: empty names, `.`, `..`, and anything containing a path
/// separator or NUL.
pub fn check_fname(name: &str) -> InstallResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(InstallError::UnsafeFilename {
            file: name.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_bound(path: &Path) -> InstallResult<()> {
    if path.as_os_str().len() >= MAX_IMAGE_FNAME {
        return Err(InstallError::PathTooLong {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Stable handle to an entry in an [`ImageList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId(usize);

/// Ordered, owning list of entries.
///
/// Entries live in slots that never move, so an [`ImageId`] stays valid
/// while other entries are removed. Removing an entry hands it back to the
/// caller; dropping it releases its properties.
#[derive(Debug, Default)]
pub struct ImageList {
    slots: Vec<Option<ImageEntry>>,
    live: usize,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ImageEntry) -> ImageId {
        self.slots.push(Some(entry));
        self.live += 1;
        ImageId(self.slots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, id: ImageId) -> Option<&ImageEntry> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut ImageEntry> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Snapshot of live ids in list order. Safe to hold across removals.
    pub fn ids(&self) -> Vec<ImageId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| ImageId(i))
            .collect()
    }

    /// Take ownership of an entry out of the list.
    pub fn remove(&mut self, id: ImageId) -> Option<ImageEntry> {
        let entry = self.slots.get_mut(id.0)?.take()?;
        self.live -= 1;
        Some(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ImageEntry> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Remove every entry, in list order.
    pub fn drain(&mut self) -> impl Iterator<Item = ImageEntry> + '_ {
        self.live = 0;
        self.slots.drain(..).flatten()
    }
}

impl FromIterator<ImageEntry> for ImageList {
    fn from_iter<I: IntoIterator<Item = ImageEntry>>(iter: I) -> Self {
        let mut list = ImageList::new();
        for entry in iter {
            list.push(entry);
        }
        list
    }
}
