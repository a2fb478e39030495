//! Build a [`SoftwareSet`] from a parsed manifest tree.
//!
//! Expected shape (JSON shown, the TOML group tree is equivalent):
//!
//! ```text
//! { "software": {
//!     "version": "1.0",
//!     "hardware-compatibility": ["1.0", "1.1"],
//!     "myboard": { "ref": "#./common" },
//!     "common": {
//!       "images":  [ { "filename": "rootfs.ext4", "type": "rawfile", ... } ],
//!       "scripts": [ { "filename": "pre.sh", "type": "shellscript" } ],
//!       "bootenv": [ { "name": "bootpart", "value": "2" } ],
//!       "vars":    [ { "name": "counter", "value": "0" } ]
//!     } } }
//! ```
//!
//! Sections are looked up under the board node first (following aliases)
//! and then under `software`.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::descriptor::{Descriptor, DescriptorTree, DEFAULT_FIND_DEPTH};
use crate::error::{InstallError, InstallResult};
use crate::manifest::image::{check_bound, check_fname, CompressionKind, ImageEntry};
use crate::manifest::{Dict, ImageList, SoftwareSet};

/// Handler type assumed for scripts that do not declare one.
pub const DEFAULT_SCRIPT_TYPE: &str = "lua";

/// Load from whichever backend the manifest was parsed with.
pub fn load_descriptor(descriptor: &Descriptor, board: Option<&str>) -> InstallResult<SoftwareSet> {
    match descriptor {
        Descriptor::Json(tree) => load_software(tree, board),
        Descriptor::Toml(tree) => load_software(tree, board),
    }
}

pub fn load_software<T: DescriptorTree>(tree: &T, board: Option<&str>) -> InstallResult<SoftwareSet> {
    let software = tree
        .find_root(&["software"], DEFAULT_FIND_DEPTH)
        .ok_or_else(|| InstallError::Manifest("no 'software' section".into()))?;

    let board_node = match board {
        Some(b) => {
            let node = tree.find_root(&["software", b], DEFAULT_FIND_DEPTH);
            if node.is_none() {
                debug!("no board-specific section for '{b}', using common settings");
            }
            node
        }
        None => None,
    };

    let section = |name: &str| {
        board_node
            .and_then(|n| tree.get_child(n, name))
            .or_else(|| tree.get_child(software, name))
    };

    let mut set = SoftwareSet::new();
    set.version = tree
        .get_field_string(software, Some("version"))
        .map(str::to_string);

    if let Some(hw) = section("hardware-compatibility") {
        set.hardware = tree
            .elements(hw)
            .into_iter()
            .filter_map(|n| tree.get_field_string(n, None))
            .map(str::to_string)
            .collect();
    }

    if let Some(images) = section("images") {
        set.images = parse_entries(tree, images, false)?;
    }
    if let Some(scripts) = section("scripts") {
        set.scripts = parse_entries(tree, scripts, true)?;
    }
    if let Some(bootenv) = section("bootenv") {
        set.bootloader = parse_vars(tree, bootenv, "bootenv")?;
    }
    if let Some(vars) = section("vars") {
        set.vars = parse_vars(tree, vars, "vars")?;
    }

    debug!(
        "manifest: {} image(s), {} script(s), {} bootenv var(s), {} var(s)",
        set.images.len(),
        set.scripts.len(),
        set.bootloader.len(),
        set.vars.len()
    );
    Ok(set)
}

fn parse_entries<T: DescriptorTree>(
    tree: &T,
    list: &T::Node,
    is_script: bool,
) -> InstallResult<ImageList> {
    let mut out = ImageList::new();
    for (index, node) in tree.elements(list).into_iter().enumerate() {
        out.push(parse_entry(tree, node, is_script, index)?);
    }
    Ok(out)
}

fn parse_entry<T: DescriptorTree>(
    tree: &T,
    node: &T::Node,
    is_script: bool,
    index: usize,
) -> InstallResult<ImageEntry> {
    let text = |field: &str| tree.get_field_string(node, Some(field)).map(str::to_string);
    let kind = if is_script { "script" } else { "image" };

    let mut entry = ImageEntry {
        is_script,
        ..ImageEntry::default()
    };
    entry.fname = text("filename").unwrap_or_default();
    if !is_script && entry.fname.is_empty() {
        return Err(InstallError::Manifest(format!(
            "{kind} #{index} has no filename"
        )));
    }
    if !entry.fname.is_empty() {
        check_fname(&entry.fname)?;
    }

    entry.type_tag = match text("type") {
        Some(t) => t,
        None if is_script => DEFAULT_SCRIPT_TYPE.to_string(),
        None => {
            return Err(InstallError::Manifest(format!(
                "{kind} '{}' has no type",
                entry.fname
            )))
        }
    };

    entry.id.name = text("name").unwrap_or_default();
    entry.id.version = text("version").unwrap_or_default();
    entry.sha256 = text("sha256").map(|s| s.to_ascii_lowercase());
    entry.ivt = text("ivt");

    if let Some(path) = text("path") {
        let path = PathBuf::from(path);
        check_bound(&path)?;
        entry.path = path;
    }

    tree.get_field(node, Some("size"), &mut entry.size);
    tree.get_field(node, Some("encrypted"), &mut entry.encrypted);
    tree.get_field(node, Some("installed-directly"), &mut entry.install_directly);

    entry.compressed = match text("compressed") {
        Some(value) => CompressionKind::parse(&value).ok_or_else(|| {
            InstallError::Manifest(format!(
                "{kind} '{}': unsupported compression '{value}'",
                entry.fname
            ))
        })?,
        None => {
            let mut flag = false;
            tree.get_field(node, Some("compressed"), &mut flag);
            if flag {
                CompressionKind::Zlib
            } else {
                CompressionKind::None
            }
        }
    };

    if let Some(props) = tree.get_child(node, "properties") {
        tree.iterate_field(props, |key, value| entry.properties.insert(key, value));
    }

    trace!(
        "{kind}: '{}' type {} component {} {}",
        entry.fname,
        entry.type_tag,
        entry.id.name,
        entry.id.version
    );
    Ok(entry)
}

fn parse_vars<T: DescriptorTree>(tree: &T, list: &T::Node, section: &str) -> InstallResult<Dict> {
    let mut dict = Dict::new();
    for node in tree.elements(list) {
        let name = tree.get_field_string(node, Some("name")).ok_or_else(|| {
            InstallError::Manifest(format!("{section}: entry without 'name'"))
        })?;
        let value = tree.get_field_string(node, Some("value")).unwrap_or_default();
        dict.set(name, value);
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{JsonTree, TomlTree};
    use std::path::Path;

    const JSON_MANIFEST: &str = r##"{
      "software": {
        "version": "4.2",
        "hardware-compatibility": ["1.0"],
        "myboard": { "ref": "#./common" },
        "common": {
          "images": [
            {
              "filename": "rootfs.ext4.zst",
              "type": "rawfile",
              "name": "rootfs",
              "version": "4.2",
              "path": "/dev/mmcblk0p2",
              "sha256": "ABCDEF",
              "compressed": "zstd",
              "installed-directly": true,
              "properties": { "fstype": "ext4", "opts": ["ro", "noatime"] }
            },
            { "filename": "app.bin", "type": "rawfile", "size": 10, "compressed": true }
          ],
          "scripts": [ { "filename": "pre.sh", "type": "shellscript" }, { } ],
          "bootenv": [ { "name": "bootpart", "value": "2" }, { "name": "upgrade_available", "value": "" } ]
        }
      }
    }"##;

    #[test]
    fn loads_json_through_board_alias() {
        let tree = JsonTree::parse(JSON_MANIFEST).unwrap();
        let set = load_software(&tree, Some("myboard")).unwrap();

        assert_eq!(set.version.as_deref(), Some("4.2"));
        assert_eq!(set.images.len(), 2);
        assert_eq!(set.scripts.len(), 2);
        assert_eq!(set.bootloader.get("bootpart"), Some("2"));
        assert_eq!(set.bootloader.get("upgrade_available"), Some(""));

        let rootfs = set.images.iter().next().unwrap();
        assert_eq!(rootfs.fname, "rootfs.ext4.zst");
        assert_eq!(rootfs.id.name, "rootfs");
        assert_eq!(rootfs.sha256.as_deref(), Some("abcdef"));
        assert_eq!(rootfs.compressed, CompressionKind::Zstd);
        assert!(rootfs.install_directly);
        assert_eq!(rootfs.path, Path::new("/dev/mmcblk0p2"));
        assert_eq!(rootfs.properties.get("fstype"), Some("ext4"));
        assert_eq!(rootfs.properties.get_all("opts").len(), 2);

        let app = set.images.iter().nth(1).unwrap();
        assert_eq!(app.size, 10);
        assert_eq!(app.compressed, CompressionKind::Zlib);

        let optional = set.scripts.iter().nth(1).unwrap();
        assert!(optional.fname.is_empty());
        assert_eq!(optional.type_tag, DEFAULT_SCRIPT_TYPE);
        assert!(optional.is_script);
    }

    #[test]
    fn sections_fall_back_to_software() {
        let tree = TomlTree::parse(
            r#"
            [software]
            version = "1"
            hardware-compatibility = ["rev1"]

            [[software.images]]
            filename = "kernel"
            type = "rawfile"

            [[software.vars]]
            name = "slot"
            value = "b"
            "#,
        )
        .unwrap();
        let set = load_software(&tree, Some("unknown-board")).unwrap();
        assert_eq!(set.images.len(), 1);
        assert_eq!(set.vars.get("slot"), Some("b"));
        assert_eq!(set.hardware, vec!["rev1".to_string()]);
    }

    #[test]
    fn image_without_type_is_rejected() {
        let tree = JsonTree::parse(r#"{ "software": { "images": [ { "filename": "x" } ] } }"#)
            .unwrap();
        assert!(matches!(
            load_software(&tree, None),
            Err(InstallError::Manifest(_))
        ));
    }

    #[test]
    fn filename_outside_staging_is_rejected() {
        for fname in ["../etc/passwd", "/etc/passwd", "sub/app.bin"] {
            let text = format!(
                r#"{{ "software": {{ "scripts": [ {{ "filename": "{fname}" }} ] }} }}"#
            );
            let tree = JsonTree::parse(&text).unwrap();
            assert!(
                matches!(
                    load_software(&tree, None),
                    Err(InstallError::UnsafeFilename { .. })
                ),
                "{fname} accepted"
            );
        }
    }

    #[test]
    fn missing_software_section_is_rejected() {
        let tree = JsonTree::parse(r#"{ "other": {} }"#).unwrap();
        assert!(load_software(&tree, None).is_err());
    }

    #[test]
    fn overlong_destination_is_rejected() {
        let long = "/dev/".to_string() + &"p".repeat(300);
        let text = format!(
            r#"{{ "software": {{ "images": [ {{ "filename": "x", "type": "raw", "path": "{long}" }} ] }} }}"#
        );
        let tree = JsonTree::parse(&text).unwrap();
        assert!(matches!(
            load_software(&tree, None),
            Err(InstallError::PathTooLong { .. })
        ));
    }
}
