//! Error surface for service installation and control.
//!
//! Every message names the next corrective action for the operator.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The calling process is not running as root.
    #[error("`{command}` must be run with root privileges. Run: sudo mb-service {command}")]
    Permission { command: String },

    /// The daemon executable could not be located on disk.
    #[error(
        "{daemon} is not installed. Install it first with `npm install -g {daemon}`, then run: sudo mb-service install"
    )]
    DaemonMissing { daemon: String },

    /// No registration artifact exists for the managed service.
    #[error("{service} service is not installed. Run: sudo mb-service install")]
    NotInstalled { service: String },

    #[error("invalid argument: {0}. Run `mb-service --help` for usage")]
    InvalidArgument(String),

    /// A native control-plane invocation exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}. Fix the cause above and re-run the same mb-service command")]
    BackendCommand {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("cannot read or render service descriptor: {0}. Remove the descriptor and run: sudo mb-service install")]
    Descriptor(String),

    #[error("I/O error at {path}: {source}. Check permissions and re-run with sudo")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve the account to run the service as: {0}. Re-run through sudo from the account that should own the service")]
    Account(String),

    #[error("configuration error in {path}: {message}. Fix or remove the file and re-run")]
    Config { path: PathBuf, message: String },

    #[error("platform not supported: {0}. mb-service manages systemd (Linux) and launchd (macOS) only")]
    UnsupportedPlatform(String),
}

impl ServiceError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceError::UnsupportedPlatform(_) => 2,
            _ => 1,
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServiceError {
    ServiceError::Io {
        path: path.into(),
        source,
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_platform_exits_with_two() {
        let err = ServiceError::UnsupportedPlatform("windows".to_string());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn permission_error_names_the_elevated_invocation() {
        let err = ServiceError::Permission {
            command: "install".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("sudo mb-service install"));
    }

    #[test]
    fn not_installed_points_at_install() {
        let err = ServiceError::NotInstalled {
            service: "matterbridge".to_string(),
        };
        assert!(err.to_string().contains("sudo mb-service install"));
    }
}
