//! In-memory stand-ins for the OS control plane and account database.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use crate::config::Settings;
use crate::control::runner::{CommandOutput, CommandRunner, command_line};
use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceError;
use crate::identity::{AccountDatabase, Identity};

pub fn quick_settings() -> Settings {
    Settings {
        restart_delay_ms: 0,
        ..Settings::default()
    }
}

pub fn sample_descriptor(args: &[&str]) -> ServiceDescriptor {
    let home = PathBuf::from("/home/alice");
    let log = home.join(".matterbridge/matterbridge.log");
    let mut environment = BTreeMap::new();
    environment.insert("HOME".to_string(), "/home/alice".to_string());
    environment.insert("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string());
    ServiceDescriptor {
        service_name: "matterbridge".to_string(),
        label: "com.matterbridge".to_string(),
        binary_path: PathBuf::from("/usr/local/bin/matterbridge"),
        arguments: args.iter().map(|a| a.to_string()).collect(),
        working_directory: home.join(".matterbridge"),
        run_as: Identity {
            username: "alice".to_string(),
            uid: 501,
            gid: 20,
            home,
        },
        stdout_path: log.clone(),
        stderr_path: log,
        environment,
    }
}

pub struct FakeAccounts(Vec<Identity>);

impl FakeAccounts {
    pub fn new(accounts: Vec<Identity>) -> Self {
        Self(accounts)
    }
}

impl AccountDatabase for FakeAccounts {
    fn by_name(&self, name: &str) -> Result<Option<Identity>, ServiceError> {
        Ok(self.0.iter().find(|a| a.username == name).cloned())
    }

    fn by_uid(&self, uid: u32) -> Result<Option<Identity>, ServiceError> {
        Ok(self.0.iter().find(|a| a.uid == uid).cloned())
    }
}

#[derive(Default)]
struct PlaneState {
    calls: Vec<String>,
    call_times: Vec<Instant>,
    fail_on: Vec<String>,
    enabled: BTreeSet<String>,
    loaded: BTreeSet<String>,
    running: Option<u32>,
    /// systemd keeps a `Restart=always` unit active while its process is gone
    active: bool,
    last_pid: u32,
    package_prefix: Option<PathBuf>,
}

impl PlaneState {
    fn spawn(&mut self) {
        self.last_pid = self.last_pid.max(4241) + 1;
        self.running = Some(self.last_pid);
    }
}

/// Simulated systemctl / launchctl / npm. Clones share state.
#[derive(Clone, Default)]
pub struct FakeControlPlane {
    state: Rc<RefCell<PlaneState>>,
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput {
        success: true,
        status: "exit status: 0".to_string(),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

fn fail(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        status: "exit status: 1".to_string(),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn is_daemon_job(label: &str) -> bool {
    !label.ends_with(".logrotate")
}

impl FakeControlPlane {
    pub fn with_package_prefix(self, prefix: &Path) -> Self {
        self.state.borrow_mut().package_prefix = Some(prefix.to_path_buf());
        self
    }

    /// Make every command line starting with `prefix` fail.
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.state.borrow_mut().fail_on.push(prefix.into());
    }

    /// The daemon exits without the manager unloading or deactivating it.
    pub fn crash(&self) {
        self.state.borrow_mut().running = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn has_call(&self, call: &str) -> bool {
        self.state.borrow().calls.iter().any(|c| c == call)
    }

    /// When the most recent call equal to `call` was issued.
    pub fn last_call_at(&self, call: &str) -> Option<Instant> {
        let state = self.state.borrow();
        let index = state.calls.iter().rposition(|c| c == call)?;
        state.call_times.get(index).copied()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn enabled_units(&self) -> Vec<String> {
        self.state.borrow().enabled.iter().cloned().collect()
    }

    pub fn loaded_jobs(&self) -> Vec<String> {
        self.state.borrow().loaded.iter().cloned().collect()
    }

    fn systemctl(state: &mut PlaneState, args: &[&str]) -> CommandOutput {
        match args {
            ["show", "--property", "MainPID", _] => {
                ok(format!("MainPID={}\n", state.running.unwrap_or(0)))
            }
            ["show", "--property", "ActiveState", _] => {
                let active = match (state.active, state.running) {
                    (true, Some(_)) => "active",
                    (true, None) => "activating",
                    (false, _) => "inactive",
                };
                ok(format!("ActiveState={active}\n"))
            }
            ["start", _] => {
                state.spawn();
                state.active = true;
                ok("")
            }
            ["stop", _] => {
                state.running = None;
                state.active = false;
                ok("")
            }
            ["enable", unit] => {
                state.enabled.insert(unit.to_string());
                ok("")
            }
            ["disable", unit] => {
                if state.enabled.remove(*unit) {
                    ok("")
                } else {
                    fail("Unit file does not exist.")
                }
            }
            ["daemon-reload"] => ok(""),
            _ => fail("unknown systemctl invocation"),
        }
    }

    fn launchctl(state: &mut PlaneState, args: &[&str]) -> CommandOutput {
        let label = |target: &str| target.trim_start_matches("system/").to_string();
        match args {
            ["print", target] => {
                let label = label(*target);
                if !state.loaded.contains(&label) {
                    return fail("Could not find service in domain for port");
                }
                match state.running.filter(|_| is_daemon_job(&label)) {
                    Some(pid) => ok(format!(
                        "{target} = {{\n\tstate = running\n\tpid = {pid}\n}}\n"
                    )),
                    None => ok(format!("{target} = {{\n\tstate = not running\n}}\n")),
                }
            }
            ["bootstrap", "system", path] => {
                let label = Path::new(path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if !state.loaded.insert(label.clone()) {
                    return fail("Bootstrap failed: 5: Input/output error");
                }
                if is_daemon_job(&label) {
                    state.spawn();
                }
                ok("")
            }
            ["bootout", target] => {
                let label = label(*target);
                if !state.loaded.remove(&label) {
                    return fail("Boot-out failed: 3: No such process");
                }
                if is_daemon_job(&label) {
                    state.running = None;
                }
                ok("")
            }
            ["kickstart", target] => {
                if !state.loaded.contains(&label(*target)) {
                    return fail("Could not find service in domain for port");
                }
                state.spawn();
                ok("")
            }
            ["enable", _] => ok(""),
            _ => fail("unknown launchctl invocation"),
        }
    }
}

impl CommandRunner for FakeControlPlane {
    fn output(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ServiceError> {
        let line = command_line(program, args);
        let mut state = self.state.borrow_mut();
        state.calls.push(line.clone());
        state.call_times.push(Instant::now());
        if state.fail_on.iter().any(|p| line.starts_with(p.as_str())) {
            return Ok(fail("simulated failure"));
        }

        Ok(match program {
            "systemctl" => Self::systemctl(&mut state, args),
            "launchctl" => Self::launchctl(&mut state, args),
            "npm" => match &state.package_prefix {
                Some(prefix) => ok(format!("{}\n", prefix.display())),
                None => fail("npm: command not found"),
            },
            "chown" => ok(""),
            "visudo" => ok("parsed OK"),
            _ => fail("unknown program"),
        })
    }

    fn stream(&self, program: &str, args: &[&str]) -> Result<bool, ServiceError> {
        let line = command_line(program, args);
        let mut state = self.state.borrow_mut();
        state.calls.push(line.clone());
        state.call_times.push(Instant::now());
        Ok(!state.fail_on.iter().any(|p| line.starts_with(p.as_str())))
    }
}
