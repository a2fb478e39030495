//! Feed an unpacked update package through the stream matcher.
//!
//! Every regular file in the package directory is treated as one entry of
//! the incoming stream, visited in name order. Each file is matched against
//! the scripts and images of the [`SoftwareSet`] and then staged, streamed
//! to its handler or skipped.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, error, info, trace};
use walkdir::WalkDir;

use crate::error::{InstallError, InstallResult};
use crate::handler::builtin::DummyHandler;
use crate::handler::{Handler, HandlerRegistry, Payload};
use crate::manifest::image::bounded_path;
use crate::manifest::{ImageId, SoftwareSet};
use crate::progress::ProgressReporter;
use crate::staging::{StagingLayout, SW_DESCRIPTION_FILENAME};
use crate::stream::{check_if_required, FileHeader, StreamDecision};

/// What happened to the files of one package.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub staged: Vec<String>,
    pub streamed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Copy the manifest (and its signature, if present) from `package_dir`
/// into the staging root.
pub fn stage_description(package_dir: &Path, layout: &StagingLayout) -> InstallResult<()> {
    let src = package_dir.join(SW_DESCRIPTION_FILENAME);
    let dest = layout.description();
    fs::copy(&src, &dest).map_err(|e| {
        error!("{} not found in {}", SW_DESCRIPTION_FILENAME, package_dir.display());
        InstallError::staging(src.as_path(), e)
    })?;

    let sig = package_dir.join(format!("{SW_DESCRIPTION_FILENAME}.sig"));
    if sig.is_file() {
        let dest = layout.signature();
        fs::copy(&sig, &dest).map_err(|e| InstallError::staging(dest.as_path(), e))?;
    }
    Ok(())
}

/// Match and place every package file.
///
/// Images flagged `installed-directly` are handed to their handler here,
/// as [`Payload::Stream`]; in dry-run mode the no-op handler consumes them.
pub fn ingest_dir(
    package_dir: &Path,
    sw: &mut SoftwareSet,
    layout: &StagingLayout,
    handlers: &HandlerRegistry,
    dry_run: bool,
    progress: &mut dyn ProgressReporter,
) -> InstallResult<IngestReport> {
    let mut report = IngestReport::default();

    let walker = WalkDir::new(package_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(package_dir).to_path_buf();
            InstallError::staging(path, io::Error::from(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!("skipping non-UTF-8 file {}", entry.path().display());
            continue;
        };
        if name == SW_DESCRIPTION_FILENAME || name == format!("{SW_DESCRIPTION_FILENAME}.sig") {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|e| InstallError::staging(entry.path(), io::Error::from(e)))?
            .len();
        let header = FileHeader::new(name.as_str(), size);

        let script = check_if_required(&mut sw.scripts, &header, layout.root())?;
        let image = check_if_required(&mut sw.images, &header, layout.root())?;
        trace!("{name}: script {script:?}, image {image:?}");

        match (script, image) {
            (_, StreamDecision::InstallFromStream(id)) => {
                stream_to_handler(entry.path(), sw, id, handlers, dry_run, progress)?;
                report.streamed.push(name);
            }
            (StreamDecision::Skip, StreamDecision::Skip) => {
                debug!("{name} not required by the manifest, skipped");
                report.skipped.push(name);
            }
            _ => {
                let dest = bounded_path(layout.root(), &name)?;
                fs::copy(entry.path(), &dest).map_err(|e| {
                    error!("cannot stage {name}");
                    InstallError::staging(dest.as_path(), e)
                })?;
                report.staged.push(name);
            }
        }
    }

    info!(
        "package {}: {} staged, {} streamed, {} skipped",
        package_dir.display(),
        report.staged.len(),
        report.streamed.len(),
        report.skipped.len()
    );
    Ok(report)
}

fn stream_to_handler(
    path: &Path,
    sw: &SoftwareSet,
    id: ImageId,
    handlers: &HandlerRegistry,
    dry_run: bool,
    progress: &mut dyn ProgressReporter,
) -> InstallResult<()> {
    let Some(img) = sw.images.get(id) else {
        return Ok(());
    };
    let handler: &dyn Handler = if dry_run {
        &DummyHandler
    } else {
        handlers.find(&img.type_tag).ok_or_else(|| {
            error!("Image Type {} not supported", img.type_tag);
            InstallError::HandlerNotFound {
                type_tag: img.type_tag.clone(),
            }
        })?
    };

    let mut stream = File::open(path).map_err(|e| InstallError::staging(path, e))?;
    progress.inc_step(&img.fname, handler.description());
    progress.update(0);
    let result = handler.install(img, Payload::Stream(&mut stream));
    progress.update(100);
    progress.step_completed();

    result.map_err(|source| {
        error!("installing {} from stream failed: {:#}", img.fname, source);
        InstallError::Handler {
            file: img.fname.clone(),
            handler: handler.description().to_string(),
            source,
        }
    })
}
