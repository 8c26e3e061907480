//! Descriptor renderers and the file operations that install them.
//!
//! - `unit` - systemd unit file generation
//! - `plist` - launchd plist generation, including the log-rotation job
//! - `privileges` - self-update allowances for the service owner
//! - `file_ops` - atomic writes and idempotent removal

pub(crate) mod file_ops;
pub mod plist;
pub mod privileges;
pub mod unit;
