//! Environment scripts and the stores that apply them.
//!
//! An env script is a plain `KEY=VALUE` file, one variable per line, in
//! dictionary order. The installer writes one into the staging root and
//! hands its path to a [`VarStore`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, trace};

use crate::manifest::Dict;

/// Namespace used when a store is asked to apply bootloader variables.
pub const BOOTLOADER_NAMESPACE: &str = "bootloader";

/// Write `dict` as an env script at `path`, replacing any previous one.
///
/// Entries without a value are skipped. An empty value (`KEY=`) is kept
/// and asks the store to unset the key.
pub fn prepare_var_script(dict: &Dict, path: &Path) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut out = BufWriter::new(file);
    for entry in dict.iter() {
        let Some(value) = entry.value() else {
            trace!("variable {} has no value, not written", entry.key);
            continue;
        };
        writeln!(out, "{}={}", entry.key, value)?;
    }
    out.flush()
}

/// Backend that persists the variables of an env script.
pub trait VarStore {
    /// Apply every `KEY=VALUE` line of `script`. `namespace` selects the
    /// variable set; `None` means the bootloader environment.
    fn apply_list(&self, script: &Path, namespace: Option<&str>) -> Result<()>;
}

/// Stores each namespace as `<dir>/<namespace>.env`.
///
/// Applying a script merges it into the existing file: new keys are added,
/// existing keys are overwritten and keys with an empty value are removed.
#[derive(Debug, Clone)]
pub struct FileVarStore {
    dir: PathBuf,
}

impl FileVarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn namespace_file(&self, namespace: Option<&str>) -> PathBuf {
        let ns = namespace.unwrap_or(BOOTLOADER_NAMESPACE);
        self.dir.join(format!("{ns}.env"))
    }

    /// Current variables of `namespace`, sorted by key.
    pub fn load(&self, namespace: Option<&str>) -> Result<BTreeMap<String, String>> {
        let path = self.namespace_file(namespace);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading variable store '{}'", path.display()))?;
        parse_env(&text).with_context(|| format!("parsing '{}'", path.display()))
    }
}

impl VarStore for FileVarStore {
    fn apply_list(&self, script: &Path, namespace: Option<&str>) -> Result<()> {
        let text = fs::read_to_string(script)
            .with_context(|| format!("reading env script '{}'", script.display()))?;
        let updates = parse_assignments(&text)
            .with_context(|| format!("parsing env script '{}'", script.display()))?;

        let mut vars = self.load(namespace)?;
        for (key, value) in updates {
            if value.is_empty() {
                vars.remove(&key);
            } else {
                vars.insert(key, value);
            }
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating variable store '{}'", self.dir.display()))?;
        let path = self.namespace_file(namespace);
        let tmp = path.with_extension("env.tmp");
        let mut body = String::new();
        for (key, value) in &vars {
            body.push_str(key);
            body.push('=');
            body.push_str(value);
            body.push('\n');
        }
        fs::write(&tmp, body).with_context(|| format!("writing '{}'", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replacing '{}'", path.display()))?;

        debug!("{} variables in {}", vars.len(), path.display());
        Ok(())
    }
}

fn parse_assignments(text: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("line {}: expected KEY=VALUE, got '{}'", lineno + 1, line);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("line {}: empty variable name", lineno + 1);
        }
        out.push((key.to_string(), value.to_string()));
    }
    Ok(out)
}

fn parse_env(text: &str) -> Result<BTreeMap<String, String>> {
    Ok(parse_assignments(text)?.into_iter().collect())
}
