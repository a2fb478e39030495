//! Handlers shipped with the installer.
//!
//! Device-specific installers (flash partitions, UBI volumes, bootloader
//! images) are registered by the embedding agent; these cover the no-op
//! case, shell hooks and plain file destinations.

use std::fs;
use std::io::{self, Read};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::debug;

use super::{Handler, Payload};
use crate::manifest::ImageEntry;

pub const DUMMY_TYPE: &str = "dummy";
pub const SHELLSCRIPT_TYPE: &str = "shellscript";
pub const RAWFILE_TYPE: &str = "rawfile";

/// Accepts anything and writes nothing. Used for every image in dry-run
/// mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyHandler;

impl Handler for DummyHandler {
    fn description(&self) -> &str {
        "dummy handler (no-op)"
    }

    fn install(&self, image: &ImageEntry, payload: Payload<'_>) -> Result<()> {
        // A streamed image must still be consumed so the package stays aligned.
        if let Payload::Stream(reader) = payload {
            let skipped = io::copy(&mut reader.take(image.size), &mut io::sink())
                .with_context(|| format!("skipping streamed image '{}'", image.fname))?;
            debug!("dummy handler skipped {skipped} bytes of {}", image.fname);
        }
        Ok(())
    }
}

/// Runs an extracted script as `sh <script> <phase>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellScriptHandler;

impl Handler for ShellScriptHandler {
    fn description(&self) -> &str {
        "shell script"
    }

    fn install(&self, image: &ImageEntry, payload: Payload<'_>) -> Result<()> {
        let Payload::Script(phase) = payload else {
            bail!(
                "shellscript handler cannot install {} payload '{}'",
                payload.kind(),
                image.fname
            );
        };
        let script = &image.extract_file;
        if !script.is_file() {
            bail!("script not found: '{}'", script.display());
        }

        let output = Command::new("sh")
            .arg(script)
            .arg(phase.as_str())
            .output()
            .with_context(|| format!("running script '{}'", script.display()))?;

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "script '{}' ({}) failed with {}: {}\n{}",
            script.display(),
            phase,
            output.status,
            stdout.trim(),
            stderr.trim()
        )
    }
}

/// Copies the image payload to its destination `path`, creating parent
/// directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawFileHandler;

impl Handler for RawFileHandler {
    fn description(&self) -> &str {
        "raw file"
    }

    fn install(&self, image: &ImageEntry, payload: Payload<'_>) -> Result<()> {
        let dest = &image.path;
        if dest.as_os_str().is_empty() {
            bail!("rawfile image '{}' has no destination path", image.fname);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }
        let mut out = fs::File::create(dest)
            .with_context(|| format!("creating '{}'", dest.display()))?;

        let written = match payload {
            Payload::Staged(reader) => io::copy(reader, &mut out),
            Payload::Stream(reader) => io::copy(&mut reader.take(image.size), &mut out),
            Payload::Script(_) => bail!("rawfile handler cannot run script '{}'", image.fname),
        }
        .with_context(|| format!("writing '{}'", dest.display()))?;

        out.sync_all()
            .with_context(|| format!("syncing '{}'", dest.display()))?;
        debug!("wrote {written} bytes to {}", dest.display());
        Ok(())
    }
}
