//! Apply a matched update: scripts, images, environment and versions.
//!
//! [`Installer::install_images`] runs these stages in order:
//!
//! 1. extract scripts into the scripts directory
//! 2. run preinstall scripts
//! 3. install every staged image through its handler
//! 4. stop here in dry-run mode
//! 5. run postinstall scripts
//! 6. apply bootloader variables
//! 7. apply generic variables
//! 8. write the installed-version manifest
//!
//! Stages 1–5 abort on the first failure. Stages 6–8 are each attempted
//! and their failures are returned together as
//! [`InstallError::PostInstall`]. Nothing already installed is rolled back.

use std::fs::File;
use std::path::PathBuf;

use tracing::{error, info, trace, warn};

use crate::copy::Copier;
use crate::env::{prepare_var_script, VarStore};
use crate::error::{InstallError, InstallResult};
use crate::handler::builtin::DummyHandler;
use crate::handler::{Handler, HandlerRegistry, Payload, ScriptPhase};
use crate::manifest::{bounded_path, Dict, ImageList, SoftwareSet};
use crate::progress::ProgressReporter;
use crate::scripts::extract_scripts;
use crate::staging::StagingLayout;

/// Run-time switches for one installation.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Replace every image handler with the no-op handler and skip
    /// scripts, environment and version output.
    pub dry_run: bool,
    /// Where to write the installed-version manifest, if anywhere.
    pub output_swversions: Option<PathBuf>,
    /// Namespace for generic variables.
    pub namespace_for_vars: Option<String>,
}

/// Collaborators of one installation run.
pub struct Installer<'a> {
    pub layout: &'a StagingLayout,
    pub handlers: &'a HandlerRegistry,
    pub copier: &'a dyn Copier,
    pub bootloader: &'a dyn VarStore,
    pub vars: &'a dyn VarStore,
    pub options: InstallOptions,
}

impl Installer<'_> {
    pub fn install_images(
        &self,
        sw: &mut SoftwareSet,
        progress: &mut dyn ProgressReporter,
    ) -> InstallResult<()> {
        let dry_run = self.options.dry_run;

        if let Err(e) = extract_scripts(&mut sw.scripts, self.layout, self.copier) {
            error!(
                "extracting script to {} failed",
                self.layout.scripts_dir().display()
            );
            return Err(e);
        }

        if !dry_run {
            if let Err(e) = self.run_scripts(&sw.scripts, ScriptPhase::Preinstall, progress) {
                error!("execute preinstall scripts failed");
                return Err(e);
            }
        }

        self.install_staged(sw, progress)?;

        if dry_run {
            info!("dry run: scripts, environment and version output skipped");
            return Ok(());
        }

        if let Err(e) = self.run_scripts(&sw.scripts, ScriptPhase::Postinstall, progress) {
            error!("execute postinstall scripts failed");
            return Err(e);
        }

        let mut failures = Vec::new();
        if let Err(e) = self.apply_env(&sw.bootloader, self.bootloader, None, "bootloader environment")
        {
            failures.push(e);
        }
        let namespace = self.options.namespace_for_vars.as_deref();
        if let Err(e) = self.apply_env(&sw.vars, self.vars, namespace, "persistent variables") {
            failures.push(e);
        }
        if let Some(path) = &self.options.output_swversions {
            if let Err(e) = sw.installed.write_manifest(path) {
                error!("{} cannot be written: {}", path.display(), e);
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(InstallError::PostInstall(failures))
        }
    }

    /// Run every script of `scripts` for `phase`, in order. Scripts whose
    /// type has no handler are skipped.
    pub fn run_scripts(
        &self,
        scripts: &ImageList,
        phase: ScriptPhase,
        progress: &mut dyn ProgressReporter,
    ) -> InstallResult<()> {
        for script in scripts.iter().filter(|s| s.is_script) {
            let Some(handler) = self.handlers.find(&script.type_tag) else {
                trace!(
                    "no handler for script {} of type {}, skipped",
                    script.fname,
                    script.type_tag
                );
                continue;
            };

            progress.inc_step(&script.fname, handler.description());
            progress.update(0);
            let result = handler.install(script, Payload::Script(phase));
            progress.update(100);
            progress.step_completed();

            if let Err(source) = result {
                error!("{} script {} failed: {:#}", phase, script.fname, source);
                return Err(InstallError::Handler {
                    file: script.fname.clone(),
                    handler: handler.description().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    fn install_staged(
        &self,
        sw: &mut SoftwareSet,
        progress: &mut dyn ProgressReporter,
    ) -> InstallResult<()> {
        for id in sw.images.ids() {
            let Some(img) = sw.images.get_mut(id) else {
                continue;
            };
            // Already written by its handler while the package was read.
            if img.install_directly {
                continue;
            }

            let staged = bounded_path(self.layout.root(), &img.fname)?;
            let meta = std::fs::metadata(&staged).map_err(|e| {
                error!("{} not found or wrong", staged.display());
                InstallError::staging(staged.as_path(), e)
            })?;
            img.size = meta.len();

            if img.staged_in_place() {
                warn!(
                    "Temporary and final location for {} is identical, skip processing.",
                    img.path.display()
                );
                let dropped = sw.images.remove(id);
                if let Some(dropped) = dropped {
                    if sw.images.iter().any(|other| other.fname == dropped.fname) {
                        warn!(
                            "{} will be removed, it's referenced more than once.",
                            dropped.fname
                        );
                    }
                    sw.installed.update(&dropped.id);
                }
                continue;
            }

            let mut fdin = File::open(&staged).map_err(|e| {
                error!("Image {} cannot be opened", img.fname);
                InstallError::staging(staged.as_path(), e)
            })?;

            let handler: &dyn Handler = if self.options.dry_run {
                &DummyHandler
            } else {
                match self.handlers.find(&img.type_tag) {
                    Some(h) => h,
                    None => {
                        error!("Image Type {} not supported", img.type_tag);
                        return Err(InstallError::HandlerNotFound {
                            type_tag: img.type_tag.clone(),
                        });
                    }
                }
            };
            trace!("Found installer for {} {}", img.fname, handler.description());

            progress.inc_step(&img.fname, handler.description());
            progress.update(0);
            let result = handler.install(img, Payload::Staged(&mut fdin));
            progress.update(100);
            progress.step_completed();
            drop(fdin);

            sw.installed.update(&img.id);

            if let Err(source) = result {
                error!(
                    "Installer for {} not successful: {:#}",
                    handler.description(),
                    source
                );
                return Err(InstallError::Handler {
                    file: img.fname.clone(),
                    handler: handler.description().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    fn apply_env(
        &self,
        dict: &Dict,
        store: &dyn VarStore,
        namespace: Option<&str>,
        stage: &'static str,
    ) -> InstallResult<()> {
        if dict.is_empty() {
            return Ok(());
        }
        let script = self.layout.env_script();
        prepare_var_script(dict, &script).map_err(|e| {
            error!("{stage}: writing {} failed: {e}", script.display());
            InstallError::EnvApply {
                stage,
                source: anyhow::Error::new(e)
                    .context(format!("writing env script '{}'", script.display())),
            }
        })?;
        store.apply_list(&script, namespace).map_err(|source| {
            error!("{stage}: {:#}", source);
            InstallError::EnvApply { stage, source }
        })
    }
}
