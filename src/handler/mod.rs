//! Type-tagged installers.
//!
//! Each image and script names a handler by its `type` tag. Handlers are
//! synchronous and trusted to terminate; the installer neither times them
//! out nor cancels them.
//!
//! # Example
//!
//! ```rust,ignore
//! use swu_installer::handler::{HandlerRegistry, builtin};
//!
//! let mut handlers = HandlerRegistry::with_builtins();
//! handlers.register("ubivol", Box::new(MyUbiHandler::new()));
//! ```

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use anyhow::Result;

use crate::manifest::ImageEntry;

/// Which script hook is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Preinstall,
    Postinstall,
}

impl ScriptPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptPhase::Preinstall => "preinstall",
            ScriptPhase::Postinstall => "postinstall",
        }
    }
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data handed to a handler.
pub enum Payload<'a> {
    /// Staged image file, opened for reading.
    Staged(&'a mut dyn Read),
    /// Package stream positioned at the start of the image; the handler
    /// must consume exactly `image.size` bytes.
    Stream(&'a mut dyn Read),
    /// Run the extracted script at `image.extract_file` for this phase.
    Script(ScriptPhase),
}

impl Payload<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Staged(_) => "staged",
            Payload::Stream(_) => "stream",
            Payload::Script(_) => "script",
        }
    }
}

/// An installer for one type of image or script.
pub trait Handler {
    /// Human-readable description, used in progress reports.
    fn description(&self) -> &str;

    fn install(&self, image: &ImageEntry, payload: Payload<'_>) -> Result<()>;
}

/// Maps type tags to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the handlers shipped in [`builtin`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::DUMMY_TYPE, Box::new(builtin::DummyHandler));
        registry.register(builtin::SHELLSCRIPT_TYPE, Box::new(builtin::ShellScriptHandler));
        registry.register(builtin::RAWFILE_TYPE, Box::new(builtin::RawFileHandler));
        registry
    }

    /// Register `handler` for `type_tag`, replacing any previous one.
    pub fn register(&mut self, type_tag: &str, handler: Box<dyn Handler>) {
        self.handlers.insert(type_tag.to_string(), handler);
    }

    pub fn find(&self, type_tag: &str) -> Option<&dyn Handler> {
        self.handlers.get(type_tag).map(|h| h.as_ref())
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        let types: Vec<_> = registry.types().collect();
        assert_eq!(types, vec!["dummy", "rawfile", "shellscript"]);
        assert!(registry.find("ubivol").is_none());
    }

    #[test]
    fn register_replaces() {
        struct Named(&'static str);
        impl Handler for Named {
            fn description(&self) -> &str {
                self.0
            }
            fn install(&self, _: &ImageEntry, _: Payload<'_>) -> Result<()> {
                Ok(())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register("raw", Box::new(Named("first")));
        registry.register("raw", Box::new(Named("second")));
        assert_eq!(registry.find("raw").unwrap().description(), "second");
    }

    #[test]
    fn phase_names() {
        assert_eq!(ScriptPhase::Preinstall.to_string(), "preinstall");
        assert_eq!(ScriptPhase::Postinstall.as_str(), "postinstall");
    }
}
