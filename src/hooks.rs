//! Shell commands run before and after an update.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::info;

/// Run the configured pre-update command. Skipped in dry-run mode.
pub fn pre_update(cmd: Option<&str>, dry_run: bool) -> Result<()> {
    run_hook("pre-update", cmd, dry_run)
}

/// Run the configured post-update command. Skipped in dry-run mode.
pub fn post_update(cmd: Option<&str>, dry_run: bool) -> Result<()> {
    run_hook("post-update", cmd, dry_run)
}

fn run_hook(label: &str, cmd: Option<&str>, dry_run: bool) -> Result<()> {
    let Some(cmd) = cmd.filter(|c| !c.trim().is_empty()) else {
        return Ok(());
    };
    if dry_run {
        info!("dry run: {label} command not run: {cmd}");
        return Ok(());
    }

    info!("running {label} command: {cmd}");
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .with_context(|| format!("spawning {label} command '{cmd}'"))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "{label} command '{cmd}' failed with {}:\n{}\n{}",
            output.status,
            stdout.trim(),
            stderr.trim()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hook_runs_command() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ran");
        let cmd = format!("touch '{}'", marker.display());
        pre_update(Some(&cmd), false).unwrap();
        assert!(marker.exists());
    }

    #[test]
    fn dry_run_skips_hook() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("ran");
        let cmd = format!("touch '{}'", marker.display());
        post_update(Some(&cmd), true).unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn failing_hook_reports_output() {
        let err = post_update(Some("echo nope >&2; exit 4"), false).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn unset_hook_is_noop() {
        pre_update(None, false).unwrap();
        pre_update(Some("   "), false).unwrap();
    }
}
