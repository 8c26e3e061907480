//! The data model for one installable service.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::ServiceError;
use crate::identity::Identity;

/// `PATH` forwarded when the invoking shell did not provide one.
pub const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Daemon flags requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonOptions {
    pub frontend: Option<u16>,
    pub ssl: bool,
}

impl DaemonOptions {
    /// Arguments passed to the daemon, in positional order.
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec!["-service".to_string()];
        if let Some(port) = self.frontend {
            args.push("-frontend".to_string());
            args.push(port.to_string());
        }
        if self.ssl {
            args.push("-ssl".to_string());
        }
        args
    }

    /// Port the frontend ends up listening on.
    pub fn port(&self, settings: &Settings) -> u16 {
        self.frontend.unwrap_or(settings.default_frontend_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub label: String,
    pub binary_path: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
    pub run_as: Identity,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub environment: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Build the descriptor for `identity`, failing when the daemon binary is absent.
    pub fn build(
        identity: &Identity,
        binary_path: &Path,
        options: &DaemonOptions,
        settings: &Settings,
        path_env: Option<&str>,
    ) -> Result<Self, ServiceError> {
        ensure_executable(binary_path, settings)?;

        let working_directory = storage_dir(identity, settings);
        let log_path = working_directory.join(&settings.log_file);

        let mut environment = BTreeMap::new();
        environment.insert("HOME".to_string(), identity.home.display().to_string());
        environment.insert(
            "PATH".to_string(),
            path_env.unwrap_or(FALLBACK_PATH).to_string(),
        );

        Ok(Self {
            service_name: settings.service_name.clone(),
            label: settings.label.clone(),
            binary_path: binary_path.to_path_buf(),
            arguments: options.arguments(),
            working_directory,
            run_as: identity.clone(),
            stdout_path: log_path.clone(),
            stderr_path: log_path,
            environment,
        })
    }

    /// Append `flag` unless it is already present.
    pub fn ensure_argument(&mut self, flag: &str) {
        if !self.arguments.iter().any(|a| a == flag) {
            self.arguments.push(flag.to_string());
        }
    }
}

/// Private storage directory of the daemon, also its working directory.
pub fn storage_dir(identity: &Identity, settings: &Settings) -> PathBuf {
    identity.home.join(&settings.storage_dir)
}

pub fn plugin_dir(identity: &Identity, settings: &Settings) -> PathBuf {
    identity.home.join(&settings.plugin_dir)
}

fn ensure_executable(binary_path: &Path, settings: &Settings) -> Result<(), ServiceError> {
    let missing = || ServiceError::DaemonMissing {
        daemon: settings.daemon_binary.clone(),
    };
    let metadata = std::fs::metadata(binary_path).map_err(|_| missing())?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(missing());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn identity(home: &Path) -> Identity {
        Identity {
            username: "alice".to_string(),
            uid: 501,
            gid: 20,
            home: home.to_path_buf(),
        }
    }

    fn executable(dir: &Path) -> PathBuf {
        let bin = dir.join("matterbridge");
        fs::write(&bin, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    #[test]
    fn arguments_keep_flag_value_pairs_in_order() {
        let options = DaemonOptions {
            frontend: Some(8444),
            ssl: true,
        };
        assert_eq!(options.arguments(), ["-service", "-frontend", "8444", "-ssl"]);
        assert_eq!(DaemonOptions::default().arguments(), ["-service"]);
    }

    #[test]
    fn port_defaults_from_settings() {
        let settings = Settings::default();
        assert_eq!(DaemonOptions::default().port(&settings), 8283);
        let options = DaemonOptions {
            frontend: Some(9000),
            ssl: false,
        };
        assert_eq!(options.port(&settings), 9000);
    }

    #[test]
    fn build_uses_home_conventions_and_forwards_environment() {
        let dir = tempfile::tempdir().unwrap();
        let bin = executable(dir.path());
        let settings = Settings::default();
        let owner = identity(Path::new("/home/alice"));

        let descriptor = ServiceDescriptor::build(
            &owner,
            &bin,
            &DaemonOptions::default(),
            &settings,
            Some("/opt/node/bin:/usr/bin"),
        )
        .unwrap();

        assert_eq!(descriptor.working_directory, PathBuf::from("/home/alice/.matterbridge"));
        assert_eq!(
            descriptor.stdout_path,
            PathBuf::from("/home/alice/.matterbridge/matterbridge.log")
        );
        assert_eq!(descriptor.stdout_path, descriptor.stderr_path);
        assert_eq!(descriptor.environment["HOME"], "/home/alice");
        assert_eq!(descriptor.environment["PATH"], "/opt/node/bin:/usr/bin");
        assert_eq!(descriptor.run_as, owner);
    }

    #[test]
    fn missing_path_falls_back_to_default_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin = executable(dir.path());
        let descriptor = ServiceDescriptor::build(
            &identity(dir.path()),
            &bin,
            &DaemonOptions::default(),
            &Settings::default(),
            None,
        )
        .unwrap();
        assert_eq!(descriptor.environment["PATH"], FALLBACK_PATH);
    }

    #[test]
    fn absent_binary_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceDescriptor::build(
            &identity(dir.path()),
            &dir.path().join("nope"),
            &DaemonOptions::default(),
            &Settings::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::DaemonMissing { .. }));
    }

    #[test]
    fn non_executable_binary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("matterbridge");
        fs::write(&bin, "data").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o644)).unwrap();

        let err = ServiceDescriptor::build(
            &identity(dir.path()),
            &bin,
            &DaemonOptions::default(),
            &Settings::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::DaemonMissing { .. }));
    }

    #[test]
    fn ensure_argument_does_not_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let bin = executable(dir.path());
        let mut descriptor = ServiceDescriptor::build(
            &identity(dir.path()),
            &bin,
            &DaemonOptions::default(),
            &Settings::default(),
            None,
        )
        .unwrap();
        descriptor.ensure_argument("-nosudo");
        descriptor.ensure_argument("-nosudo");
        assert_eq!(descriptor.arguments, ["-service", "-nosudo"]);
    }
}
