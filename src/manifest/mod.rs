//! In-memory model of an update: what the manifest asks for and what the
//! device already has.
//!
//! A [`SoftwareSet`] is built by [`loader::load_software`] from a
//! [`crate::descriptor::DescriptorTree`], filled in by the stream matcher as
//! the package is read, consumed by the installer and finally torn down by
//! [`crate::cleanup::cleanup_files`].

pub mod dict;
pub mod image;
pub mod loader;
pub mod versions;

pub use dict::{Dict, DictEntry};
pub use image::{
    bounded_path, CompressionKind, ComponentId, ImageEntry, ImageId, ImageList, MAX_IMAGE_FNAME,
};
pub use versions::{SwVersion, VersionRegistry};

/// Embedded scripting runtime instantiated for a run.
///
/// The runtime itself is external; cleanup only needs to shut it down.
pub trait ScriptRuntime {
    fn name(&self) -> &str;

    /// Unregister session handlers and release the interpreter.
    fn shutdown(&mut self);
}

/// Everything one update run works on.
#[derive(Default)]
pub struct SoftwareSet {
    /// Release version declared by the manifest.
    pub version: Option<String>,
    pub images: ImageList,
    pub scripts: ImageList,
    /// Bootloader environment variables.
    pub bootloader: Dict,
    /// Generic persistent variables.
    pub vars: Dict,
    pub installed: VersionRegistry,
    /// Accepted hardware revisions. Empty accepts any.
    pub hardware: Vec<String>,
    pub runtime: Option<Box<dyn ScriptRuntime>>,
}

impl SoftwareSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the update may be applied to hardware `revision`.
    pub fn check_hardware(&self, revision: &str) -> bool {
        self.hardware.is_empty() || self.hardware.iter().any(|r| r == revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_compatibility() {
        let mut set = SoftwareSet::new();
        assert!(set.check_hardware("rev-a"));

        set.hardware = vec!["1.0".into(), "1.1".into()];
        assert!(set.check_hardware("1.1"));
        assert!(!set.check_hardware("2.0"));
    }
}
