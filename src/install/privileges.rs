//! Self-update allowances for the service owner.
//!
//! The daemon updates itself through the package manager at runtime. On
//! systemd hosts the owner gets a passwordless sudo rule for exactly that
//! executable; on launchd hosts the owner is given the global modules
//! directory instead.

use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::control::runner::{CommandRunner, run_checked};
use crate::error::{ServiceError, io_err};
use crate::install::file_ops::remove_if_present;
use crate::identity::Identity;

/// Allowlist rule letting `identity` run `package_manager` as root without a password.
pub fn sudoers_rule(identity: &Identity, package_manager: &Path) -> String {
    format!(
        "{} ALL=(root) NOPASSWD: {}",
        identity.username,
        escape_sudoers(&package_manager.display().to_string())
    )
}

/// Backslash-escape characters the sudoers grammar treats as separators.
fn escape_sudoers(word: &str) -> String {
    let mut escaped = String::with_capacity(word.len());
    for c in word.chars() {
        if c.is_whitespace() || matches!(c, '\\' | ',' | ':' | '=' | '#' | '!' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Add `rule` to the sudoers drop-in unless an identical line exists.
///
/// The new content is checked with `visudo -cf` before it replaces the
/// drop-in. Hosts without `visudo` have no sudo to configure and are skipped.
/// Returns whether the file was changed.
pub fn ensure_sudoers_rule<R: CommandRunner>(
    runner: &R,
    path: &Path,
    rule: &str,
) -> Result<bool, ServiceError> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(path, e)),
    };

    if existing.lines().any(|line| line.trim() == rule) {
        log::debug!("sudoers rule already present in {}", path.display());
        return Ok(false);
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(rule);
    content.push('\n');

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    // sudo skips drop-in names containing '.', so the candidate is never live
    let candidate = path.with_extension("tmp");
    remove_if_present(&candidate)?;
    write_candidate(&candidate, &content)?;

    let target = candidate.display().to_string();
    match runner.output("visudo", &["-cf", target.as_str()]) {
        Ok(output) if output.success => {}
        Ok(output) => {
            remove_if_present(&candidate)?;
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(ServiceError::Descriptor(format!(
                "sudoers rule {rule:?} rejected by visudo: {detail}"
            )));
        }
        Err(ServiceError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            remove_if_present(&candidate)?;
            log::warn!("visudo not found; not writing {}", path.display());
            return Ok(false);
        }
        Err(e) => {
            remove_if_present(&candidate)?;
            return Err(e);
        }
    }

    fs::rename(&candidate, path).map_err(|e| io_err(path, e))?;
    log::info!("Allowed {rule:?} in {}", path.display());
    Ok(true)
}

fn write_candidate(path: &Path, content: &str) -> Result<(), ServiceError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o440)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_err(path, e))?;
    file.sync_all().map_err(|e| io_err(path, e))?;
    // mode() only applies on creation
    fs::set_permissions(path, fs::Permissions::from_mode(0o440)).map_err(|e| io_err(path, e))
}

/// Make `dir` (recursively) owned by `identity` when it is not already.
pub fn ensure_owned_by<R: CommandRunner>(
    runner: &R,
    dir: &Path,
    identity: &Identity,
) -> Result<(), ServiceError> {
    let metadata = fs::metadata(dir).map_err(|e| io_err(dir, e))?;
    if metadata.uid() == identity.uid {
        return Ok(());
    }

    log::info!(
        "Giving {} ownership of {}",
        identity.username,
        dir.display()
    );
    let owner = format!("{}:{}", identity.uid, identity.gid);
    let target = dir.display().to_string();
    run_checked(runner, "chown", &["-R", owner.as_str(), target.as_str()]).map_err(|e| {
        ServiceError::Account(format!(
            "{} cannot write to {target} ({e}); run: sudo chown -R {owner} \"{target}\"",
            identity.username
        ))
    })?;
    Ok(())
}
