//! launchd plist generation for the daemon and its log-rotation companion.
//!
//! launchd does not inherit the installer's environment and has no central
//! log query, so the main plist lists every environment variable explicitly
//! and sends output to a file. The companion job keeps that file bounded.

use std::path::{Path, PathBuf};

use plist::{Dictionary, Integer, Value};

use crate::config::Settings;
use crate::descriptor::ServiceDescriptor;
use crate::error::ServiceError;

/// Label of the log-rotation job registered next to `label`.
pub fn rotation_label(label: &str) -> String {
    format!("{label}.logrotate")
}

/// Generate the launchd plist for the daemon itself.
pub fn render_plist(descriptor: &ServiceDescriptor) -> Result<String, ServiceError> {
    let mut plist = Dictionary::new();

    plist.insert("Label".to_string(), Value::String(descriptor.label.clone()));

    let program_args = std::iter::once(descriptor.binary_path.display().to_string())
        .chain(descriptor.arguments.iter().cloned())
        .map(Value::String)
        .collect();
    plist.insert("ProgramArguments".to_string(), Value::Array(program_args));

    // Restart policy equivalent to systemd's Restart=always
    plist.insert("KeepAlive".to_string(), Value::Boolean(true));
    plist.insert("RunAtLoad".to_string(), Value::Boolean(true));

    plist.insert(
        "UserName".to_string(),
        Value::String(descriptor.run_as.username.clone()),
    );
    plist.insert(
        "WorkingDirectory".to_string(),
        path_value(&descriptor.working_directory),
    );

    let env: Dictionary = descriptor
        .environment
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    plist.insert("EnvironmentVariables".to_string(), Value::Dictionary(env));

    plist.insert(
        "StandardOutPath".to_string(),
        path_value(&descriptor.stdout_path),
    );
    plist.insert(
        "StandardErrorPath".to_string(),
        path_value(&descriptor.stderr_path),
    );

    to_xml(plist)
}

/// Generate the periodic job that copies the log aside and truncates it once
/// it grows past `log_rotation_max_bytes`.
pub fn render_log_rotation(
    descriptor: &ServiceDescriptor,
    settings: &Settings,
) -> Result<String, ServiceError> {
    let mut plist = Dictionary::new();

    plist.insert(
        "Label".to_string(),
        Value::String(rotation_label(&descriptor.label)),
    );
    plist.insert(
        "ProgramArguments".to_string(),
        Value::Array(vec![
            Value::String("/bin/sh".to_string()),
            Value::String("-c".to_string()),
            Value::String(rotation_script(
                &descriptor.stdout_path,
                settings.log_rotation_max_bytes,
            )),
        ]),
    );
    plist.insert(
        "StartInterval".to_string(),
        Value::Integer(Integer::from(settings.log_rotation_interval_secs)),
    );
    plist.insert("RunAtLoad".to_string(), Value::Boolean(true));
    plist.insert(
        "UserName".to_string(),
        Value::String(descriptor.run_as.username.clone()),
    );

    to_xml(plist)
}

/// Extract `StandardOutPath` from an installed plist.
pub fn standard_out_path(content: &[u8]) -> Result<PathBuf, ServiceError> {
    let value = Value::from_reader_xml(content)
        .map_err(|e| ServiceError::Descriptor(format!("invalid plist: {e}")))?;
    value
        .as_dictionary()
        .and_then(|dict| dict.get("StandardOutPath"))
        .and_then(Value::as_string)
        .map(PathBuf::from)
        .ok_or_else(|| ServiceError::Descriptor("plist has no StandardOutPath".to_string()))
}

fn rotation_script(log_path: &Path, max_bytes: u64) -> String {
    format!(
        "f={}; if [ -f \"$f\" ] && [ \"$(stat -f %z \"$f\")\" -gt {max_bytes} ]; then cp \"$f\" \"$f.bak\" && : > \"$f\"; fi",
        shell_quote(&log_path.display().to_string())
    )
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

fn to_xml(plist: Dictionary) -> Result<String, ServiceError> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(plist))
        .map_err(|e| ServiceError::Descriptor(format!("failed to generate plist: {e}")))?;

    String::from_utf8(buf)
        .map_err(|e| ServiceError::Descriptor(format!("plist contains invalid UTF-8: {e}")))
}
