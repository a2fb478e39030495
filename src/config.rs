use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cleanup::CleanupOptions;
use crate::env::BOOTLOADER_NAMESPACE;
use crate::installer::InstallOptions;
use crate::staging::StagingLayout;

const DEFAULT_NAMESPACE: &str = "swupdate";

/// Installer configuration with every path resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerConfig {
    pub staging_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub dry_run: bool,
    pub board: Option<String>,
    pub output_swversions: Option<PathBuf>,
    pub installed_swversions: Option<PathBuf>,
    pub namespace_for_vars: String,
    pub signed_images: bool,
    pub no_cleanup: bool,
    pub preupdatecmd: Option<String>,
    pub postupdatecmd: Option<String>,
    pub env_store_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    installer: InstallerToml,
    env: EnvToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallerToml {
    staging_dir: String,
    scripts_dir: Option<String>,
    #[serde(default)]
    dry_run: bool,
    board: Option<String>,
    output_swversions: Option<String>,
    installed_swversions: Option<String>,
    namespace_for_vars: Option<String>,
    #[serde(default)]
    signed_images: bool,
    #[serde(default)]
    no_cleanup: bool,
    preupdatecmd: Option<String>,
    postupdatecmd: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvToml {
    store_dir: String,
}

/// Read and validate the installer config at `path`.
///
/// Relative paths are resolved against the directory holding the config.
pub fn load_config(path: &Path) -> Result<InstallerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading installer config '{}'", path.display()))?;
    let parsed: ConfigToml = toml::from_str(&text)
        .with_context(|| format!("parsing installer config '{}'", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    resolve(parsed, base).with_context(|| format!("invalid installer config '{}'", path.display()))
}

fn resolve(parsed: ConfigToml, base: &Path) -> Result<InstallerConfig> {
    let installer = parsed.installer;

    let staging_dir = resolve_path(base, &installer.staging_dir, "staging_dir")?;
    let scripts_dir = match installer.scripts_dir.as_deref() {
        Some(raw) => resolve_path(base, raw, "scripts_dir")?,
        None => staging_dir.join("scripts"),
    };
    let optional_path = |raw: Option<String>, field: &str| -> Result<Option<PathBuf>> {
        raw.map(|r| resolve_path(base, &r, field)).transpose()
    };
    let output_swversions = optional_path(installer.output_swversions, "output_swversions")?;
    let installed_swversions =
        optional_path(installer.installed_swversions, "installed_swversions")?;

    let namespace_for_vars = installer
        .namespace_for_vars
        .map(|ns| ns.trim().to_string())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace_for_vars.is_empty() || namespace_for_vars.contains('/') {
        bail!("namespace_for_vars must be a plain name, got '{namespace_for_vars}'");
    }
    if namespace_for_vars == BOOTLOADER_NAMESPACE {
        bail!("namespace_for_vars '{BOOTLOADER_NAMESPACE}' is reserved for bootloader variables");
    }

    let board = installer
        .board
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());
    let non_blank = |cmd: Option<String>| cmd.filter(|c| !c.trim().is_empty());

    Ok(InstallerConfig {
        staging_dir,
        scripts_dir,
        dry_run: installer.dry_run,
        board,
        output_swversions,
        installed_swversions,
        namespace_for_vars,
        signed_images: installer.signed_images,
        no_cleanup: installer.no_cleanup,
        preupdatecmd: non_blank(installer.preupdatecmd),
        postupdatecmd: non_blank(installer.postupdatecmd),
        env_store_dir: resolve_path(base, &parsed.env.store_dir, "env.store_dir")?,
    })
}

fn resolve_path(base: &Path, raw: &str, field: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("{field} must not be empty");
    }
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        Ok(candidate.to_path_buf())
    } else {
        Ok(base.join(candidate))
    }
}

impl InstallerConfig {
    pub fn layout(&self) -> StagingLayout {
        StagingLayout::new(&self.staging_dir, &self.scripts_dir)
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            dry_run: self.dry_run,
            output_swversions: self.output_swversions.clone(),
            namespace_for_vars: Some(self.namespace_for_vars.clone()),
        }
    }

    pub fn cleanup_options(&self) -> CleanupOptions {
        CleanupOptions {
            signed_images: self.signed_images,
            no_cleanup: self.no_cleanup,
        }
    }
}
