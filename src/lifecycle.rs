//! Install / uninstall / start / stop / restart orchestration.
//!
//! Every mutating operation checks elevation before touching the filesystem
//! or the control plane. Identity is resolved once per operation and passed
//! down explicitly.

use std::fs;
use std::io::Write;
use std::path::Path;

use nix::unistd::{Gid, Uid, chown};

use crate::banner::{local_addresses, reachable_urls, write_banner};
use crate::config::Settings;
use crate::control::{CommandRunner, ServiceBackend};
use crate::descriptor::{DaemonOptions, ServiceDescriptor, plugin_dir, storage_dir};
use crate::discovery::{locate_daemon, package_prefix};
use crate::error::{ServiceError, io_err};
use crate::identity::{AccountDatabase, HostContext, Identity, IdentityResolver};

pub struct LifecycleManager<B, R, A> {
    backend: B,
    runner: R,
    accounts: A,
    host: HostContext,
    settings: Settings,
}

impl<B, R, A> LifecycleManager<B, R, A>
where
    B: ServiceBackend,
    R: CommandRunner,
    A: AccountDatabase,
{
    pub fn new(backend: B, runner: R, accounts: A, host: HostContext, settings: Settings) -> Self {
        Self {
            backend,
            runner,
            accounts,
            host,
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Install (or reinstall) the service, start it and print where it is reachable.
    pub fn install(&self, options: &DaemonOptions, out: &mut impl Write) -> Result<(), ServiceError> {
        self.host.require_elevated("install")?;
        let identity = IdentityResolver::new(&self.host, &self.accounts).resolve()?;

        let prefix = package_prefix(&self.runner, &self.settings.package_manager);
        let binary = locate_daemon(prefix.as_deref(), &self.settings.daemon_binary).ok_or_else(
            || ServiceError::DaemonMissing {
                daemon: self.settings.daemon_binary.clone(),
            },
        )?;

        let mut descriptor = ServiceDescriptor::build(
            &identity,
            &binary,
            options,
            &self.settings,
            self.host.path.as_deref(),
        )?;

        self.create_owned_dir(&plugin_dir(&identity, &self.settings), &identity)?;
        self.create_owned_dir(&storage_dir(&identity, &self.settings), &identity)?;
        match &prefix {
            Some(prefix) => self.backend.prepare(&mut descriptor, prefix)?,
            None => log::warn!(
                "{} prefix unknown; the daemon will not be able to update itself",
                self.settings.package_manager
            ),
        }

        self.backend.install(&descriptor)?;

        let urls = reachable_urls(&local_addresses(), options.port(&self.settings), options.ssl);
        write_banner(out, &self.settings.service_name, &urls).map_err(|e| io_err("stdout", e))
    }

    pub fn uninstall(&self) -> Result<(), ServiceError> {
        self.host.require_elevated("uninstall")?;
        self.backend.uninstall()
    }

    pub fn start(&self) -> Result<(), ServiceError> {
        self.host.require_elevated("start")?;
        self.backend.start()
    }

    pub fn stop(&self) -> Result<(), ServiceError> {
        self.host.require_elevated("stop")?;
        self.backend.stop()
    }

    pub fn restart(&self) -> Result<(), ServiceError> {
        self.host.require_elevated("restart")?;
        self.backend.restart()
    }

    /// PID of the running daemon; `None` when stopped or unknown.
    pub fn pid(&self) -> Result<Option<u32>, ServiceError> {
        self.require_installed()?;
        Ok(self.backend.pid())
    }

    pub fn tail(&self) -> Result<(), ServiceError> {
        self.require_installed()?;
        self.backend.tail()
    }

    fn require_installed(&self) -> Result<(), ServiceError> {
        if self.backend.is_installed() {
            Ok(())
        } else {
            Err(ServiceError::NotInstalled {
                service: self.settings.service_name.clone(),
            })
        }
    }

    fn create_owned_dir(&self, dir: &Path, identity: &Identity) -> Result<(), ServiceError> {
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        chown(
            dir,
            Some(Uid::from_raw(identity.uid)),
            Some(Gid::from_raw(identity.gid)),
        )
        .map_err(|e| io_err(dir, e.into()))
    }
}
