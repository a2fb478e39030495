//! Installation core of an embedded software-update agent.
//!
//! Given a parsed update manifest and the files of an incoming update
//! package, this crate decides which package files are needed, stages or
//! streams them, runs pre/post scripts, dispatches every image to its
//! type-tagged handler, applies bootloader and persistent variables and
//! records installed component versions.
//!
//! - **Descriptor trees** - One query contract over JSON and TOML manifests
//! - **Manifest model** - Images, scripts, variables and installed versions
//! - **Stream matching** - Per-file decision: skip, stage or stream
//! - **Installer** - Ordered install stages with paired progress reports
//! - **Cleanup** - Best-effort teardown of staging files and run state
//!
//! # Architecture
//!
//! ```text
//! package dir ──► package::ingest_dir ──► stream::check_if_required
//!                       │                        │
//!                       │ stage / stream         ▼
//!                       ▼                  manifest::SoftwareSet ◄── manifest::loader
//!                 staging::StagingLayout         │                        ▲
//!                       │                        ▼                        │
//!                       └──────────────► installer::Installer      descriptor::Descriptor
//!                                                │
//!                             handler::HandlerRegistry, env::VarStore
//!                                                │
//!                                                ▼
//!                                       cleanup::cleanup_files
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use swu_installer::{Descriptor, HandlerRegistry, Installer, LogProgress};
//!
//! let tree = Descriptor::from_path(&layout.description())?;
//! let mut sw = swu_installer::manifest::loader::load_descriptor(&tree, Some("board"))?;
//! swu_installer::package::ingest_dir(pkg, &mut sw, &layout, &handlers, false, &mut progress)?;
//! installer.install_images(&mut sw, &mut progress)?;
//! swu_installer::cleanup_files(&mut sw, &layout, options);
//! ```

pub mod cleanup;
pub mod config;
pub mod copy;
pub mod descriptor;
pub mod env;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod package;
pub mod progress;
pub mod scripts;
pub mod staging;
pub mod stream;

pub use cleanup::{cleanup_files, CleanupOptions};
pub use config::{load_config, InstallerConfig};
pub use copy::{Copier, CopyRequest, VerifiedCopy};
pub use descriptor::{Descriptor, DescriptorTree};
pub use env::{prepare_var_script, FileVarStore, VarStore};
pub use error::{CopyError, InstallError, InstallResult};
pub use handler::{Handler, HandlerRegistry, Payload, ScriptPhase};
pub use installer::{InstallOptions, Installer};
pub use manifest::{ImageEntry, ImageList, SoftwareSet, VersionRegistry};
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use staging::{StagingLayout, BOOT_SCRIPT_SUFFIX, SW_DESCRIPTION_FILENAME};
pub use stream::{check_if_required, FileHeader, StreamDecision};
