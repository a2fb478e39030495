//! Move script payloads from staging into the scripts directory.

use std::fs::{self, File};

use tracing::{error, trace};

use crate::copy::{Copier, CopyRequest};
use crate::error::{InstallError, InstallResult};
use crate::manifest::{bounded_path, ImageList};
use crate::staging::StagingLayout;

/// Extract every script in `scripts`, in list order.
///
/// A script with neither a filename nor package data is optional and
/// skipped. A declared filename the package did not carry is
/// [`InstallError::MissingRequiredFile`]. The first failure stops
/// extraction of the remaining scripts.
pub fn extract_scripts(
    scripts: &mut ImageList,
    layout: &StagingLayout,
    copier: &dyn Copier,
) -> InstallResult<()> {
    for script in scripts.iter_mut() {
        if script.fname.is_empty() && !script.provided {
            trace!("No script provided for script of type {}", script.type_tag);
            continue;
        }
        if !script.provided {
            error!("Required script {} not found in image", script.fname);
            return Err(InstallError::MissingRequiredFile {
                file: script.fname.clone(),
            });
        }

        let target = bounded_path(layout.scripts_dir(), &script.fname)?;
        let source = bounded_path(layout.root(), &script.fname)?;

        let mut fdin = File::open(&source).map_err(|e| {
            error!(
                "Extracted script not found in {}: {}",
                layout.root().display(),
                script.fname
            );
            InstallError::staging(source.as_path(), e)
        })?;
        let mut fdout =
            File::create(&target).map_err(|e| InstallError::staging(target.as_path(), e))?;

        let mut offset = 0u64;
        let nbytes = match script.size {
            0 => fdin
                .metadata()
                .map_err(|e| InstallError::staging(source.as_path(), e))?
                .len(),
            n => n,
        };
        let result = copier.copy(CopyRequest {
            input: &mut fdin,
            output: &mut fdout,
            nbytes,
            offset: &mut offset,
            compression: script.compressed,
            encrypted: script.encrypted,
            ivt: script.ivt.as_deref(),
            hash: script.sha256.as_deref(),
        });
        drop(fdin);
        drop(fdout);

        if let Err(source) = result {
            error!("extracting script {} failed: {}", script.fname, source);
            // A partially written script must never be run.
            let _ = fs::remove_file(&target);
            return Err(InstallError::ScriptCopy {
                file: script.fname.clone(),
                source,
            });
        }
        script.extract_file = target;
        trace!("script {} extracted ({} bytes)", script.fname, offset);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::{sha256_hex, VerifiedCopy};
    use crate::error::CopyError;
    use crate::manifest::ImageEntry;
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> StagingLayout {
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();
        layout
    }

    fn provided(name: &str, data: &[u8], layout: &StagingLayout) -> ImageEntry {
        fs::write(layout.root().join(name), data).unwrap();
        let mut s = ImageEntry::script(name, "shellscript");
        s.provided = true;
        s.size = data.len() as u64;
        s.sha256 = Some(sha256_hex(data));
        s
    }

    #[test]
    fn scripts_land_in_scripts_dir() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut list: ImageList = vec![provided("pre.sh", b"echo pre\n", &layout)]
            .into_iter()
            .collect();

        extract_scripts(&mut list, &layout, &VerifiedCopy).unwrap();

        let target = layout.scripts_dir().join("pre.sh");
        assert_eq!(fs::read(&target).unwrap(), b"echo pre\n");
        assert_eq!(list.iter().next().unwrap().extract_file, target);
    }

    #[test]
    fn optional_script_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut list: ImageList = vec![ImageEntry::script("", "lua")].into_iter().collect();
        extract_scripts(&mut list, &layout, &VerifiedCopy).unwrap();
    }

    #[test]
    fn declared_but_missing_script_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut list: ImageList = vec![ImageEntry::script("post.sh", "shellscript")]
            .into_iter()
            .collect();
        let err = extract_scripts(&mut list, &layout, &VerifiedCopy).unwrap_err();
        assert!(matches!(err, InstallError::MissingRequiredFile { .. }));
    }

    #[test]
    fn first_failure_stops_remaining_scripts() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut bad = provided("bad.sh", b"echo bad\n", &layout);
        bad.sha256 = Some("deadbeef".into());
        let good = provided("good.sh", b"echo good\n", &layout);
        let mut list: ImageList = vec![bad, good].into_iter().collect();

        let err = extract_scripts(&mut list, &layout, &VerifiedCopy).unwrap_err();
        assert!(matches!(
            err,
            InstallError::ScriptCopy {
                source: CopyError::HashMismatch { .. },
                ..
            }
        ));
        assert!(!layout.scripts_dir().join("bad.sh").exists());
        assert!(!layout.scripts_dir().join("good.sh").exists());
    }

    #[test]
    fn provided_but_unstaged_script_is_staging_error() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(&tmp);
        let mut s = ImageEntry::script("ghost.sh", "shellscript");
        s.provided = true;
        let mut list: ImageList = vec![s].into_iter().collect();
        let err = extract_scripts(&mut list, &layout, &VerifiedCopy).unwrap_err();
        assert!(matches!(err, InstallError::StagingIo { .. }));
        assert!(!layout.scripts_dir().join("ghost.sh").exists());
    }
}
