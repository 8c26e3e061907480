//! Linux service control using systemd (systemctl, journalctl)

use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ServiceBackend;
use super::runner::{CommandOutput, CommandRunner, run_checked};
use crate::config::Settings;
use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceError;
use crate::install::file_ops::{remove_if_present, write_file_atomic};
use crate::install::privileges::{ensure_sudoers_rule, sudoers_rule};
use crate::install::unit::render_unit;

const UNIT_DIR: &str = "etc/systemd/system";
const SUDOERS_DIR: &str = "etc/sudoers.d";

static MAIN_PID: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?m)^MainPID=(\d+)\s*$"));

/// Extract the main PID from `systemctl show --property MainPID` output.
///
/// systemd reports `MainPID=0` when the unit has no process.
pub fn parse_main_pid(output: &str) -> Option<u32> {
    let pattern = MAIN_PID.as_ref().ok()?;
    let pid: u32 = pattern.captures(output)?.get(1)?.as_str().parse().ok()?;
    (pid != 0).then_some(pid)
}

/// Extract the state from `systemctl show --property ActiveState` output.
pub fn parse_active_state(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("ActiveState="))
        .filter(|state| !state.is_empty())
}

/// systemd unit backend.
pub struct UnitBackend<R> {
    runner: R,
    settings: Settings,
    unit: String,
    unit_path: PathBuf,
    sudoers_path: PathBuf,
}

impl<R: CommandRunner> UnitBackend<R> {
    pub fn new(runner: R, settings: &Settings) -> Self {
        Self {
            runner,
            settings: settings.clone(),
            unit: format!("{}.service", settings.service_name),
            unit_path: Path::new("/")
                .join(UNIT_DIR)
                .join(format!("{}.service", settings.service_name)),
            sudoers_path: Path::new("/").join(SUDOERS_DIR).join(&settings.service_name),
        }
    }

    /// Relocate the fixed system paths under `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.unit_path = root
            .join(UNIT_DIR)
            .join(format!("{}.service", self.settings.service_name));
        self.sudoers_path = root.join(SUDOERS_DIR).join(&self.settings.service_name);
        self
    }

    pub fn unit_path(&self) -> &Path {
        &self.unit_path
    }

    pub fn sudoers_path(&self) -> &Path {
        &self.sudoers_path
    }

    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        run_checked(&self.runner, "systemctl", args)
    }

    /// Whether systemd still holds the unit up, including the auto-restart
    /// window where `MainPID` is already 0. An unreadable state counts as up.
    fn is_active(&self) -> bool {
        match self
            .runner
            .output("systemctl", &["show", "--property", "ActiveState", &self.unit])
        {
            Ok(output) if output.success => !matches!(
                parse_active_state(&output.stdout),
                Some("inactive" | "failed")
            ),
            Ok(output) => {
                log::debug!("systemctl show failed: {}", output.stderr.trim());
                true
            }
            Err(e) => {
                log::debug!("systemctl show failed: {e}");
                true
            }
        }
    }

    fn require_installed(&self) -> Result<(), ServiceError> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(ServiceError::NotInstalled {
                service: self.settings.service_name.clone(),
            })
        }
    }
}

impl<R: CommandRunner> ServiceBackend for UnitBackend<R> {
    fn is_installed(&self) -> bool {
        self.unit_path.exists()
    }

    fn prepare(
        &self,
        descriptor: &mut ServiceDescriptor,
        package_prefix: &Path,
    ) -> Result<(), ServiceError> {
        let package_manager = package_prefix
            .join("bin")
            .join(&self.settings.package_manager);
        let rule = sudoers_rule(&descriptor.run_as, &package_manager);
        ensure_sudoers_rule(&self.runner, &self.sudoers_path, &rule)?;
        Ok(())
    }

    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        if self.is_installed() {
            log::info!("Replacing existing {} registration", self.unit);
            self.uninstall()?;
        }

        write_file_atomic(&self.unit_path, &render_unit(descriptor), 0o644)?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", &self.unit])?;
        log::info!("{} service installed", self.settings.service_name);

        self.start()
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        if !self.is_installed() {
            log::info!("{} service not installed", self.settings.service_name);
            return Ok(());
        }

        self.stop()?;
        self.systemctl(&["disable", &self.unit])?;
        remove_if_present(&self.unit_path)?;
        self.systemctl(&["daemon-reload"])?;
        log::info!("{} service uninstalled", self.settings.service_name);
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        if self.pid().is_some() {
            log::warn!("{} service already running", self.settings.service_name);
            return Ok(());
        }

        log::info!("Starting {} service...", self.settings.service_name);
        self.systemctl(&["start", &self.unit])?;
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        if !self.is_active() {
            return Ok(());
        }

        log::info!("Stopping {} service...", self.settings.service_name);
        self.systemctl(&["stop", &self.unit])?;
        Ok(())
    }

    fn settle_delay(&self) -> Duration {
        self.settings.restart_delay()
    }

    fn pid(&self) -> Option<u32> {
        match self
            .runner
            .output("systemctl", &["show", "--property", "MainPID", &self.unit])
        {
            Ok(output) if output.success => parse_main_pid(&output.stdout),
            Ok(output) => {
                log::debug!("systemctl show failed: {}", output.stderr.trim());
                None
            }
            Err(e) => {
                log::debug!("systemctl show failed: {e}");
                None
            }
        }
    }

    fn tail(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        let lines = self.settings.tail_lines.to_string();
        let args = ["-u", self.unit.as_str(), "-f", "-n", lines.as_str(), "--output", "cat"];
        if self.runner.stream("journalctl", &args)? {
            Ok(())
        } else {
            Err(ServiceError::BackendCommand {
                command: super::runner::command_line("journalctl", &args),
                status: "non-zero exit".to_string(),
                stderr: "journal could not be read".to_string(),
            })
        }
    }
}
