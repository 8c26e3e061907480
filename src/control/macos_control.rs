//! macOS service control using launchd (launchctl)
//!
//! The daemon plist and its log-rotation companion are registered and
//! removed together. Registration is not atomic: if bootstrapping the daemon
//! fails, the companion stays registered.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ServiceBackend;
use super::runner::{CommandRunner, command_line, run_checked};
use crate::config::Settings;
use crate::descriptor::ServiceDescriptor;
use crate::error::{ServiceError, io_err};
use crate::install::file_ops::{remove_if_present, write_file_atomic};
use crate::install::plist::{
    render_log_rotation, render_plist, rotation_label, standard_out_path,
};
use crate::install::privileges::ensure_owned_by;

const LAUNCH_DAEMONS: &str = "Library/LaunchDaemons";
const DOMAIN: &str = "system";

static PRINT_PID: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?m)^\s*pid = (\d+)\s*$"));

/// Extract the PID from `launchctl print system/<label>` output.
pub fn parse_print_pid(output: &str) -> Option<u32> {
    let pattern = PRINT_PID.as_ref().ok()?;
    let pid: u32 = pattern.captures(output)?.get(1)?.as_str().parse().ok()?;
    (pid != 0).then_some(pid)
}

/// launchd state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    NotLoaded,
    Loaded(Option<u32>),
}

/// launchd daemon plist backend.
pub struct PlistBackend<R> {
    runner: R,
    settings: Settings,
    rotation_label: String,
    plist_path: PathBuf,
    rotation_path: PathBuf,
}

impl<R: CommandRunner> PlistBackend<R> {
    pub fn new(runner: R, settings: &Settings) -> Self {
        Self::with_dir(runner, settings, &Path::new("/").join(LAUNCH_DAEMONS))
    }

    /// Relocate `/Library/LaunchDaemons` under `root`.
    pub fn with_root(self, root: &Path) -> Self {
        let dir = root.join(LAUNCH_DAEMONS);
        Self::with_dir(self.runner, &self.settings, &dir)
    }

    fn with_dir(runner: R, settings: &Settings, dir: &Path) -> Self {
        let rotation_label = rotation_label(&settings.label);
        Self {
            runner,
            plist_path: dir.join(format!("{}.plist", settings.label)),
            rotation_path: dir.join(format!("{rotation_label}.plist")),
            rotation_label,
            settings: settings.clone(),
        }
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    pub fn rotation_path(&self) -> &Path {
        &self.rotation_path
    }

    fn launchctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        run_checked(&self.runner, "launchctl", args).map(|_| ())
    }

    fn target(label: &str) -> String {
        format!("{DOMAIN}/{label}")
    }

    fn state(&self, label: &str) -> JobState {
        match self.runner.output("launchctl", &["print", &Self::target(label)]) {
            Ok(output) if output.success => JobState::Loaded(parse_print_pid(&output.stdout)),
            Ok(output) => {
                log::debug!("launchctl print {label} failed: {}", output.stderr.trim());
                JobState::NotLoaded
            }
            Err(e) => {
                log::debug!("launchctl print {label} failed: {e}");
                JobState::NotLoaded
            }
        }
    }

    fn bootstrap(&self, path: &Path) -> Result<(), ServiceError> {
        let path = path.display().to_string();
        self.launchctl(&["bootstrap", DOMAIN, &path])
    }

    fn bootout(&self, label: &str) -> Result<(), ServiceError> {
        self.launchctl(&["bootout", &Self::target(label)])
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

impl<R: CommandRunner> ServiceBackend for PlistBackend<R> {
    fn is_installed(&self) -> bool {
        self.plist_path.exists()
    }

    fn prepare(
        &self,
        descriptor: &mut ServiceDescriptor,
        package_prefix: &Path,
    ) -> Result<(), ServiceError> {
        let modules = package_prefix.join("lib").join("node_modules");
        if modules.is_dir() {
            ensure_owned_by(&self.runner, &modules, &descriptor.run_as)?;
        } else {
            log::debug!("no global modules directory at {}", modules.display());
        }
        // sudo is unnecessary once the owner can write the global modules
        descriptor.ensure_argument("-nosudo");
        Ok(())
    }

    fn install(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        if self.is_installed() {
            log::info!("Replacing existing {} registration", self.settings.label);
            self.uninstall()?;
        }

        write_file_atomic(&self.plist_path, &render_plist(descriptor)?, 0o644)?;
        write_file_atomic(
            &self.rotation_path,
            &render_log_rotation(descriptor, &self.settings)?,
            0o644,
        )?;

        // clear any persisted "disabled" override so both load at boot
        self.launchctl(&["enable", &Self::target(&self.settings.label)])?;
        self.launchctl(&["enable", &Self::target(&self.rotation_label)])?;
        self.bootstrap(&self.rotation_path)?;
        log::info!("{} service installed", self.settings.service_name);

        self.start()
    }

    fn uninstall(&self) -> Result<(), ServiceError> {
        let registered = self.is_installed() || self.rotation_path.exists();
        if !registered {
            log::info!("{} service not installed", self.settings.service_name);
            return Ok(());
        }

        if self.is_installed() {
            self.stop()?;
        }
        if self.state(&self.rotation_label) != JobState::NotLoaded {
            self.bootout(&self.rotation_label)?;
        }
        remove_if_present(&self.plist_path)?;
        remove_if_present(&self.rotation_path)?;
        log::info!("{} service uninstalled", self.settings.service_name);
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        match self.state(&self.settings.label) {
            JobState::Loaded(Some(_)) => {
                log::warn!("{} service already running", self.settings.service_name);
                Ok(())
            }
            JobState::Loaded(None) => {
                log::info!("Starting {} service...", self.settings.service_name);
                self.launchctl(&["kickstart", &Self::target(&self.settings.label)])
            }
            JobState::NotLoaded => {
                log::info!("Starting {} service...", self.settings.service_name);
                self.bootstrap(&self.plist_path)
            }
        }
    }

    fn stop(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        if self.state(&self.settings.label) == JobState::NotLoaded {
            return Ok(());
        }

        log::info!("Stopping {} service...", self.settings.service_name);
        self.bootout(&self.settings.label)
    }

    fn settle_delay(&self) -> Duration {
        self.settings.restart_delay()
    }

    fn pid(&self) -> Option<u32> {
        match self.state(&self.settings.label) {
            JobState::Loaded(pid) => pid,
            JobState::NotLoaded => None,
        }
    }

    fn tail(&self) -> Result<(), ServiceError> {
        self.require_installed()?;

        let content = fs::read(&self.plist_path).map_err(|e| io_err(&self.plist_path, e))?;
        let log_path = standard_out_path(&content)?.display().to_string();
        let lines = self.settings.tail_lines.to_string();
        let args = ["-f", "-n", lines.as_str(), log_path.as_str()];

        if self.runner.stream("tail", &args)? {
            Ok(())
        } else {
            Err(ServiceError::BackendCommand {
                command: command_line("tail", &args),
                status: "non-zero exit".to_string(),
                stderr: format!("cannot follow {log_path}"),
            })
        }
    }
}
