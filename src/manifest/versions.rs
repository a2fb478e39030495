//! Registry of installed component versions.
//!
//! The registry starts from the device's current version file (if any),
//! is updated as images are installed, and is written back as
//! `name\tversion` lines once installation succeeds.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::{InstallError, InstallResult};
use crate::manifest::image::ComponentId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwVersion {
    pub name: String,
    pub version: String,
}

/// Ordered (name, version) pairs, unique by name. The most recently
/// updated component is first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRegistry {
    entries: Vec<SwVersion>,
}

impl VersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a version file: one `name version` pair per line, separated by
    /// whitespace. Blank lines and `#` comments are ignored; a missing file
    /// yields an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no installed versions file at {}", path.display());
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("reading installed versions '{}'", path.display()))
            }
        };

        let mut registry = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
                registry.entries.push(SwVersion {
                    name: name.to_string(),
                    version: version.to_string(),
                });
            }
        }
        Ok(registry)
    }

    /// Record `id` as installed.
    ///
    /// An empty version never creates or alters an entry. Otherwise the
    /// component's entry is created or updated and moved to the front.
    /// Returns whether the registry changed.
    pub fn update(&mut self, id: &ComponentId) -> bool {
        if id.version.is_empty() || id.name.is_empty() {
            return false;
        }
        if let Some(pos) = self.entries.iter().position(|e| e.name == id.name) {
            self.entries.remove(pos);
        }
        self.entries.insert(
            0,
            SwVersion {
                name: id.name.clone(),
                version: id.version.clone(),
            },
        );
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.version.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwVersion> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as `name\tversion\n` lines in registry order, no header.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for entry in &self.entries {
            writeln!(out, "{}\t{}", entry.name, entry.version)?;
        }
        Ok(())
    }

    /// Write the version manifest to `path`, replacing any previous content.
    pub fn write_manifest(&self, path: &Path) -> InstallResult<()> {
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(path)?;
            self.write_to(&mut file)?;
            file.sync_all()
        };
        write().map_err(|source| InstallError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}
