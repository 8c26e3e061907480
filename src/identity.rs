//! Resolution of the unprivileged account the daemon runs as.
//!
//! The installer itself runs as root. When it was reached through `sudo` or
//! `doas`, the wrapper records the original user in the environment; that user
//! owns the service. Elevation wrappers preserve the name and numeric ids but
//! not a trustworthy `HOME`, so the home directory always comes from the
//! account database.

use std::path::PathBuf;

use nix::unistd::{Uid, User, geteuid};

use crate::error::ServiceError;

/// Account the managed daemon runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Self {
            username: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }
    }
}

/// Lookup into the OS account database.
pub trait AccountDatabase {
    fn by_name(&self, name: &str) -> Result<Option<Identity>, ServiceError>;
    fn by_uid(&self, uid: u32) -> Result<Option<Identity>, ServiceError>;
}

impl<A: AccountDatabase + ?Sized> AccountDatabase for &A {
    fn by_name(&self, name: &str) -> Result<Option<Identity>, ServiceError> {
        (**self).by_name(name)
    }

    fn by_uid(&self, uid: u32) -> Result<Option<Identity>, ServiceError> {
        (**self).by_uid(uid)
    }
}

/// Account database backed by `getpwnam`/`getpwuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccounts;

impl AccountDatabase for SystemAccounts {
    fn by_name(&self, name: &str) -> Result<Option<Identity>, ServiceError> {
        User::from_name(name)
            .map(|user| user.map(Identity::from))
            .map_err(|e| ServiceError::Account(format!("lookup of user {name} failed: {e}")))
    }

    fn by_uid(&self, uid: u32) -> Result<Option<Identity>, ServiceError> {
        User::from_uid(Uid::from_raw(uid))
            .map(|user| user.map(Identity::from))
            .map_err(|e| ServiceError::Account(format!("lookup of uid {uid} failed: {e}")))
    }
}

/// Snapshot of the process privilege state and elevation environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    pub effective_uid: u32,
    pub sudo_user: Option<String>,
    pub sudo_uid: Option<u32>,
    pub sudo_gid: Option<u32>,
    pub doas_user: Option<String>,
    /// `PATH` of the invoking shell, forwarded to the daemon.
    pub path: Option<String>,
}

impl HostContext {
    pub fn capture() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let id = |name: &str| var(name).and_then(|v| v.trim().parse().ok());
        Self {
            effective_uid: geteuid().as_raw(),
            sudo_user: var("SUDO_USER"),
            sudo_uid: id("SUDO_UID"),
            sudo_gid: id("SUDO_GID"),
            doas_user: var("DOAS_USER"),
            path: var("PATH"),
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.effective_uid == 0
    }

    /// Fail with the exact elevated invocation when not running as root.
    pub fn require_elevated(&self, command: &str) -> Result<(), ServiceError> {
        if self.is_elevated() {
            Ok(())
        } else {
            Err(ServiceError::Permission {
                command: command.to_string(),
            })
        }
    }

    /// Original user recorded by an elevation wrapper, if any.
    fn elevating_user(&self) -> Option<&str> {
        self.sudo_user
            .as_deref()
            .or(self.doas_user.as_deref())
            .filter(|user| *user != "root")
    }
}

pub struct IdentityResolver<'a, A> {
    host: &'a HostContext,
    accounts: A,
}

impl<'a, A: AccountDatabase> IdentityResolver<'a, A> {
    pub fn new(host: &'a HostContext, accounts: A) -> Self {
        Self { host, accounts }
    }

    pub fn resolve(&self) -> Result<Identity, ServiceError> {
        let Some(user) = self.host.elevating_user() else {
            let uid = self.host.effective_uid;
            return self.accounts.by_uid(uid)?.ok_or_else(|| {
                ServiceError::Account(format!("no account database entry for uid {uid}"))
            });
        };

        let record = self
            .accounts
            .by_name(user)?
            .ok_or_else(|| ServiceError::Account(format!("user {user} not found")))?;

        // sudo records ids alongside the name; doas records only the name.
        let from_sudo = self.host.sudo_user.as_deref() == Some(user);
        let uid = self.host.sudo_uid.filter(|_| from_sudo).unwrap_or(record.uid);
        let gid = self.host.sudo_gid.filter(|_| from_sudo).unwrap_or(record.gid);
        if uid == 0 {
            return Err(ServiceError::Account(format!(
                "user {user} maps to uid 0; the service must not run as root"
            )));
        }

        log::debug!("Resolved service owner {user} ({uid}:{gid})");
        Ok(Identity {
            username: user.to_string(),
            uid,
            gid,
            home: record.home,
        })
    }
}
