//! Location of the daemon executable and of the package manager installing it.

use std::path::{Path, PathBuf};

use crate::control::runner::CommandRunner;

/// Global install prefix of `package_manager` (`npm prefix -g`).
///
/// Falls back to the grandparent of the package manager found on `PATH`.
pub fn package_prefix<R: CommandRunner>(runner: &R, package_manager: &str) -> Option<PathBuf> {
    match runner.output(package_manager, &["prefix", "-g", "--silent"]) {
        Ok(output) if output.success && !output.stdout.trim().is_empty() => {
            return Some(PathBuf::from(output.stdout.trim()));
        }
        Ok(output) => log::debug!("{package_manager} prefix failed: {}", output.stderr.trim()),
        Err(e) => log::debug!("{package_manager} prefix failed: {e}"),
    }

    which::which(package_manager)
        .ok()
        .and_then(|bin| bin.parent()?.parent().map(Path::to_path_buf))
}

/// Daemon executable under `prefix`, or else the first one on `PATH`.
pub fn locate_daemon(prefix: Option<&Path>, daemon: &str) -> Option<PathBuf> {
    prefix
        .map(|prefix| prefix.join("bin").join(daemon))
        .filter(|candidate| candidate.is_file())
        .or_else(|| which::which(daemon).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControlPlane;
    use std::fs;

    #[test]
    fn prefix_comes_from_the_package_manager() {
        let plane = FakeControlPlane::default().with_package_prefix(Path::new("/opt/node"));
        assert_eq!(package_prefix(&plane, "npm"), Some(PathBuf::from("/opt/node")));
        assert!(plane.has_call("npm prefix -g --silent"));
    }

    #[test]
    fn daemon_is_found_under_prefix_bin() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/matterbridge"), "").unwrap();

        assert_eq!(
            locate_daemon(Some(dir.path()), "matterbridge"),
            Some(dir.path().join("bin/matterbridge"))
        );
    }

    #[test]
    fn unknown_daemon_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(locate_daemon(Some(dir.path()), "mb-no-such-daemon-4f2a"), None);
    }
}
