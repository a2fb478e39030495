//! On-disk staging layout for one update run.
//!
//! ```text
//! <root>/                   package files, named as in the package
//! <root>/sw-description     manifest
//! <root>/sw-description.sig detached manifest signature (signed images)
//! <root>/.bootvars          temporary environment script
//! <root>/.lock              held while a run owns the staging tree
//! <scripts>/                extracted scripts, ready to run
//! ```

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

/// Manifest filename inside the package and the staging directory.
pub const SW_DESCRIPTION_FILENAME: &str = "sw-description";

/// Name of the temporary environment script in the staging root.
pub const BOOT_SCRIPT_SUFFIX: &str = ".bootvars";

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    root: PathBuf,
    scripts: PathBuf,
}

impl StagingLayout {
    pub fn new(root: impl Into<PathBuf>, scripts: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scripts: scripts.into(),
        }
    }

    /// Layout with scripts in `<root>/scripts`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let scripts = root.join("scripts");
        Self { root, scripts }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts
    }

    pub fn env_script(&self) -> PathBuf {
        self.root.join(BOOT_SCRIPT_SUFFIX)
    }

    pub fn description(&self) -> PathBuf {
        self.root.join(SW_DESCRIPTION_FILENAME)
    }

    pub fn signature(&self) -> PathBuf {
        self.root.join(format!("{SW_DESCRIPTION_FILENAME}.sig"))
    }

    /// Create the staging and scripts directories.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating staging directory '{}'", self.root.display()))?;
        fs::create_dir_all(&self.scripts)
            .with_context(|| format!("creating scripts directory '{}'", self.scripts.display()))?;
        Ok(())
    }

    /// Take exclusive ownership of the staging tree for this process.
    ///
    /// The lock file is never unlinked; removing a locked file would let a
    /// second process lock a fresh inode at the same path.
    pub fn lock(&self) -> Result<StagingLock> {
        let path = self.root.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("creating lock file '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "staging directory is in use by another installer: {}",
                path.display()
            );
        }
        Ok(StagingLock { file })
    }
}

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct StagingLock {
    file: File,
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_paths() {
        let layout = StagingLayout::under("/tmp/swu");
        assert_eq!(layout.scripts_dir(), Path::new("/tmp/swu/scripts"));
        assert_eq!(layout.env_script(), Path::new("/tmp/swu/.bootvars"));
        assert_eq!(layout.description(), Path::new("/tmp/swu/sw-description"));
        assert_eq!(layout.signature(), Path::new("/tmp/swu/sw-description.sig"));
    }

    #[test]
    fn second_lock_is_refused_until_release() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();

        let first = layout.lock().unwrap();
        assert!(layout.lock().is_err());
        drop(first);
        assert!(layout.lock().is_ok());
    }
}
