//! Registers the matterbridge daemon with the host's native service manager
//! (systemd on Linux, launchd on macOS) and drives its lifecycle.

pub mod banner;
pub mod cli;
pub mod config;
pub mod control;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod install;
pub mod lifecycle;

#[cfg(test)]
mod testing;

pub use error::ServiceError;
