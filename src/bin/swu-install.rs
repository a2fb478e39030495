use std::path::Path;

use anyhow::{bail, Context, Result};
use swu_installer::manifest::loader::load_descriptor;
use swu_installer::package::{ingest_dir, stage_description};
use swu_installer::{
    cleanup_files, hooks, load_config, logging, Descriptor, FileVarStore, HandlerRegistry,
    InstallerConfig, Installer, LogProgress, SoftwareSet, StagingLayout, VerifiedCopy,
    VersionRegistry,
};

fn usage() -> &'static str {
    "Usage:\n  swu-install [-v...] install <config.toml> <package-dir>\n  swu-install [-v...] cleanup <config.toml>"
}

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbosity = args.iter().take_while(|a| a.as_str() == "-v").count();
    args.drain(..verbosity);
    logging::init(u8::try_from(verbosity).unwrap_or(u8::MAX));

    match args.as_slice() {
        [cmd, config, package] if cmd == "install" => {
            install(Path::new(config), Path::new(package))
        }
        [cmd, config] if cmd == "cleanup" => cleanup(Path::new(config)),
        _ => bail!(usage()),
    }
}

fn install(config_path: &Path, package_dir: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let layout = cfg.layout();
    layout.ensure()?;
    let _lock = layout.lock()?;

    let mut sw = SoftwareSet::new();
    let result = run_install(&cfg, &layout, package_dir, &mut sw);

    println!("[swu:cleanup] removing staging files");
    cleanup_files(&mut sw, &layout, cfg.cleanup_options());

    result?;
    hooks::post_update(cfg.postupdatecmd.as_deref(), cfg.dry_run)?;
    println!("[swu:done] update installed");
    Ok(())
}

fn run_install(
    cfg: &InstallerConfig,
    layout: &StagingLayout,
    package_dir: &Path,
    sw: &mut SoftwareSet,
) -> Result<()> {
    println!("[swu:manifest] reading {}", package_dir.display());
    stage_description(package_dir, layout)?;
    let description = Descriptor::from_path(&layout.description())?;
    *sw = load_descriptor(&description, cfg.board.as_deref()).with_context(|| {
        format!(
            "loading {} manifest '{}'",
            description.backend_name(),
            layout.description().display()
        )
    })?;
    if let Some(installed) = &cfg.installed_swversions {
        sw.installed = VersionRegistry::load(installed)?;
    }
    println!(
        "[swu:manifest] {} images, {} scripts",
        sw.images.len(),
        sw.scripts.len()
    );

    hooks::pre_update(cfg.preupdatecmd.as_deref(), cfg.dry_run)?;

    let handlers = HandlerRegistry::with_builtins();
    let mut progress = LogProgress::new();

    println!("[swu:ingest] matching package files");
    let report = ingest_dir(package_dir, sw, layout, &handlers, cfg.dry_run, &mut progress)?;
    println!(
        "[swu:ingest] {} staged, {} streamed, {} skipped",
        report.staged.len(),
        report.streamed.len(),
        report.skipped.len()
    );

    let store = FileVarStore::new(&cfg.env_store_dir);
    let installer = Installer {
        layout,
        handlers: &handlers,
        copier: &VerifiedCopy,
        bootloader: &store,
        vars: &store,
        options: cfg.install_options(),
    };
    println!("[swu:install] installing images{}", if cfg.dry_run { " (dry run)" } else { "" });
    installer.install_images(sw, &mut progress).map_err(|e| {
        for failure in e.post_install_failures() {
            eprintln!("[swu:install] {failure}");
        }
        let code = e.code();
        anyhow::Error::new(e).context(format!("installation failed (status {code})"))
    })?;
    Ok(())
}

/// Remove what an interrupted run left behind, using the staged manifest
/// to find image and script files.
fn cleanup(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    let layout = cfg.layout();
    if !layout.root().is_dir() {
        println!("[swu:cleanup] nothing to clean in {}", layout.root().display());
        return Ok(());
    }
    let _lock = layout.lock()?;

    let description = layout.description();
    let mut sw = if description.is_file() {
        let tree = Descriptor::from_path(&description)?;
        load_descriptor(&tree, cfg.board.as_deref())
            .with_context(|| format!("loading manifest '{}'", description.display()))?
    } else {
        SoftwareSet::new()
    };
    cleanup_files(&mut sw, &layout, cfg.cleanup_options());
    println!("[swu:cleanup] {} cleaned", layout.root().display());
    Ok(())
}
