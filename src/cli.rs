use clap::{ArgAction, Parser, ValueEnum};

use crate::descriptor::DaemonOptions;

#[derive(Parser, Debug)]
#[command(
    name = "mb-service",
    version,
    about = "Register matterbridge as a system service (systemd or launchd)",
    disable_version_flag = true
)]
pub struct Args {
    /// Command to run
    #[arg(value_enum)]
    pub command: Option<Cmd>,

    /// Port the frontend listens on (forwarded to the daemon on install)
    #[arg(long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub frontend: Option<u16>,

    /// Serve the frontend over https (forwarded to the daemon on install)
    #[arg(long)]
    pub ssl: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Args {
    pub fn daemon_options(&self) -> DaemonOptions {
        DaemonOptions {
            frontend: self.frontend,
            ssl: self.ssl,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmd {
    /// Register the daemon, enable it at boot and start it
    Install,
    /// Stop and remove the registration
    Uninstall,
    /// Start the registered daemon (exit 0 = started or already running)
    Start,
    /// Stop the registered daemon
    Stop,
    /// Stop, wait, then start the daemon
    Restart,
    /// Print the daemon PID (exit 1 = not running)
    Pid,
    /// Follow the daemon log output
    Tail,
}
