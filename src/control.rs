//! Service lifecycle control - delegates to OS-native service managers
//!
//! Provides a unified interface for managing the daemon across operating systems:
//! - Linux: systemd (systemctl, journalctl)
//! - macOS: launchd (launchctl)
//!
//! Both backends are always compiled; only the selection in
//! [`Backend::for_host`] depends on the host.

use std::path::Path;
use std::time::Duration;

use crate::config::Settings;
use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceError;

mod linux_control;
mod macos_control;
pub mod runner;

pub use linux_control::UnitBackend;
pub use macos_control::PlistBackend;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};

/// Operations every native backend provides.
///
/// The registration artifact on disk is the only record of "installed";
/// liveness is always queried from the control plane.
pub trait ServiceBackend {
    /// Whether the registration artifact exists.
    fn is_installed(&self) -> bool;

    /// Grant the owner what the daemon needs to update itself through the
    /// package manager installed under `package_prefix`.
    fn prepare(
        &self,
        descriptor: &mut ServiceDescriptor,
        package_prefix: &Path,
    ) -> Result<(), ServiceError>;

    /// Replace any prior registration with `descriptor`, enable it and start it.
    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError>;

    /// Stop and remove the registration. Absent registrations are a no-op.
    fn uninstall(&self) -> Result<(), ServiceError>;

    /// Start the service; a running service only produces a warning.
    fn start(&self) -> Result<(), ServiceError>;

    /// Stop the service; a stopped service is a silent no-op.
    fn stop(&self) -> Result<(), ServiceError>;

    /// Pause between stop and start during a restart.
    fn settle_delay(&self) -> Duration;

    fn restart(&self) -> Result<(), ServiceError> {
        self.stop()?;
        std::thread::sleep(self.settle_delay());
        self.start()
    }

    /// PID of the running daemon. Stopped services, failed queries and a
    /// reported PID of zero all yield `None`.
    fn pid(&self) -> Option<u32>;

    /// Stream the daemon's log output until interrupted.
    fn tail(&self) -> Result<(), ServiceError>;
}

/// The backend for the current host, chosen once at startup.
pub enum Backend<R> {
    Unit(UnitBackend<R>),
    Plist(PlistBackend<R>),
}

impl<R: CommandRunner> Backend<R> {
    pub fn for_host(runner: R, settings: &Settings) -> Result<Self, ServiceError> {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "macos")] {
                Ok(Backend::Plist(PlistBackend::new(runner, settings)))
            } else if #[cfg(target_os = "linux")] {
                Ok(Backend::Unit(UnitBackend::new(runner, settings)))
            } else {
                let _ = (runner, settings);
                Err(ServiceError::UnsupportedPlatform(std::env::consts::OS.to_string()))
            }
        }
    }

    fn inner(&self) -> &dyn ServiceBackend {
        match self {
            Backend::Unit(unit) => unit,
            Backend::Plist(plist) => plist,
        }
    }
}

impl<R: CommandRunner> ServiceBackend for Backend<R> {
    fn is_installed(&self) -> bool {
        self.inner().is_installed()
    }

    fn prepare(
        &self,
        descriptor: &mut ServiceDescriptor,
        package_prefix: &Path,
    ) -> Result<(), ServiceError> {
        self.inner().prepare(descriptor, package_prefix)
    }

    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        self.inner().install(descriptor)
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        self.inner().uninstall()
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.inner().start()
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.inner().stop()
    }

    fn settle_delay(&self) -> Duration {
        self.inner().settle_delay()
    }

    fn restart(&self) -> Result<(), ServiceError> {
        self.inner().restart()
    }

    fn pid(&self) -> Option<u32> {
        self.inner().pid()
    }

    fn tail(&self) -> Result<(), ServiceError> {
        self.inner().tail()
    }
}
