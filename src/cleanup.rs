//! Tear down a run: staging files, in-memory lists and the runtime.
//!
//! Removal is best effort. Files that are already gone are expected and
//! ignored; any other failure is logged and cleanup continues.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::manifest::{bounded_path, ImageEntry, SoftwareSet};
use crate::staging::StagingLayout;

/// What cleanup may touch on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupOptions {
    /// Also remove the detached manifest signature.
    pub signed_images: bool,
    /// Keep every staging file for inspection; only in-memory state is
    /// released.
    pub no_cleanup: bool,
}

/// Release everything `sw` holds and remove the run's staging artifacts.
///
/// Safe to call more than once; a second call finds nothing to do.
pub fn cleanup_files(sw: &mut SoftwareSet, layout: &StagingLayout, options: CleanupOptions) {
    let remove = |path: &Path| {
        if !options.no_cleanup {
            remove_sw_file(path);
        }
    };

    for img in sw.images.drain().chain(sw.scripts.drain()) {
        for dir in [layout.scripts_dir(), layout.root()] {
            remove_entry_file(&img, dir, &remove);
        }
        // Dropping the entry releases its properties.
    }

    sw.bootloader.clear();
    sw.vars.clear();

    if let Some(mut runtime) = sw.runtime.take() {
        debug!("shutting down {} runtime", runtime.name());
        runtime.shutdown();
    }

    remove(&layout.env_script());
    remove(&layout.description());
    if options.signed_images {
        remove(&layout.signature());
    }

    sw.hardware.clear();
}

fn remove_entry_file(img: &ImageEntry, dir: &Path, remove: &impl Fn(&Path)) {
    if img.fname.is_empty() {
        return;
    }
    match bounded_path(dir, &img.fname) {
        Ok(path) => remove(&path),
        Err(e) => warn!("not removing {}: {}", img.fname, e),
    }
}

fn remove_sw_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("cannot remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ScriptRuntime;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct CountingRuntime(Rc<Cell<u32>>);

    impl ScriptRuntime for CountingRuntime {
        fn name(&self) -> &str {
            "lua"
        }
        fn shutdown(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn populated(layout: &StagingLayout) -> SoftwareSet {
        let mut sw = SoftwareSet::new();
        for name in ["rootfs.img", "sw-description", ".bootvars", "sw-description.sig"] {
            fs::write(layout.root().join(name), "x").unwrap();
        }
        fs::write(layout.scripts_dir().join("post.sh"), "x").unwrap();
        fs::write(layout.root().join("post.sh"), "x").unwrap();

        let mut img = ImageEntry::new("rootfs.img", "raw");
        img.properties.set("offset", "0");
        sw.images.push(img);
        sw.scripts.push(ImageEntry::script("post.sh", "shellscript"));
        sw.bootloader.set("upgrade_available", "1");
        sw.vars.set("state", "ok");
        sw.hardware.push("1.0".into());
        sw
    }

    #[test]
    fn removes_staging_and_releases_state() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();
        let mut sw = populated(&layout);
        let shutdowns = Rc::new(Cell::new(0));
        sw.runtime = Some(Box::new(CountingRuntime(shutdowns.clone())));

        let options = CleanupOptions {
            signed_images: true,
            no_cleanup: false,
        };
        cleanup_files(&mut sw, &layout, options);

        assert!(sw.images.is_empty());
        assert!(sw.scripts.is_empty());
        assert!(sw.bootloader.is_empty() && sw.vars.is_empty());
        assert!(sw.hardware.is_empty());
        assert!(sw.runtime.is_none());
        assert_eq!(shutdowns.get(), 1);
        for name in ["rootfs.img", "sw-description", ".bootvars", "sw-description.sig", "post.sh"] {
            assert!(!layout.root().join(name).exists(), "{name} left behind");
        }
        assert!(!layout.scripts_dir().join("post.sh").exists());

        // Second call has nothing left to do.
        cleanup_files(&mut sw, &layout, options);
        assert_eq!(shutdowns.get(), 1);
    }

    #[test]
    fn signature_kept_unless_signed_images() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();
        let mut sw = populated(&layout);

        cleanup_files(&mut sw, &layout, CleanupOptions::default());
        assert!(layout.signature().exists());
        assert!(!layout.description().exists());
    }

    #[test]
    fn no_cleanup_keeps_files() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();
        let mut sw = populated(&layout);

        let options = CleanupOptions {
            signed_images: true,
            no_cleanup: true,
        };
        cleanup_files(&mut sw, &layout, options);
        assert!(sw.images.is_empty());
        assert!(layout.root().join("rootfs.img").exists());
        assert!(layout.description().exists());
    }

    #[test]
    fn missing_staging_dir_is_harmless() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("never-created"));
        let mut sw = SoftwareSet::new();
        sw.images.push(ImageEntry::new("a", "raw"));
        cleanup_files(&mut sw, &layout, CleanupOptions::default());
        assert!(sw.images.is_empty());
    }

    #[test]
    fn entries_naming_outside_files_are_not_removed() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::under(tmp.path().join("stage"));
        layout.ensure().unwrap();
        let outside = tmp.path().join("keep.conf");
        fs::write(&outside, "device config").unwrap();

        let mut sw = SoftwareSet::new();
        sw.images
            .push(ImageEntry::new(outside.to_str().unwrap(), "raw"));
        sw.images.push(ImageEntry::new("../keep.conf", "raw"));
        sw.scripts
            .push(ImageEntry::script("../keep.conf", "shellscript"));
        cleanup_files(&mut sw, &layout, CleanupOptions::default());

        assert!(sw.images.is_empty() && sw.scripts.is_empty());
        assert_eq!(fs::read_to_string(&outside).unwrap(), "device config");
    }
}
