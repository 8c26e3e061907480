//! Systemd unit file generation.
//!
//! The daemon is supervised forever (`Restart=always`), ordered after the
//! network is online, runs as the resolved owner and receives exactly two
//! ambient capabilities. Output is inherited into the journal, so there is no
//! log file for this backend.

use crate::descriptor::ServiceDescriptor;

/// Capabilities granted to the daemon without running it as root.
pub const CAPABILITIES: &str = "CAP_NET_BIND_SERVICE CAP_NET_RAW";

/// Generate systemd unit file content for `descriptor`.
pub fn render_unit(descriptor: &ServiceDescriptor) -> String {
    let mut content = String::with_capacity(1024);

    // [Unit] section
    content.push_str("[Unit]\n");
    content.push_str(&format!("Description={}\n", descriptor.service_name));
    content.push_str("Wants=network-online.target\n");
    content.push_str("After=network-online.target\n");
    content.push('\n');

    // [Service] section
    content.push_str("[Service]\n");
    content.push_str("Type=simple\n");
    content.push_str(&format!("ExecStart={}\n", exec_start(descriptor)));
    content.push_str(&format!(
        "WorkingDirectory={}\n",
        escape_specifiers(&descriptor.working_directory.display().to_string())
    ));
    for (key, value) in &descriptor.environment {
        content.push_str(&format!(
            "Environment={}\n",
            quote(&format!("{key}={value}"))
        ));
    }

    content.push_str("StandardOutput=inherit\n");
    content.push_str("StandardError=inherit\n");

    content.push_str("Restart=always\n");
    content.push_str("RestartSec=10s\n");
    content.push_str("TimeoutStopSec=30s\n");

    content.push_str(&format!("User={}\n", descriptor.run_as.username));
    content.push_str(&format!("Group={}\n", descriptor.run_as.gid));

    content.push_str(&format!("AmbientCapabilities={CAPABILITIES}\n"));
    content.push_str(&format!("CapabilityBoundingSet={CAPABILITIES}\n"));
    content.push('\n');

    // [Install] section
    content.push_str("[Install]\n");
    content.push_str("WantedBy=multi-user.target\n");

    content
}

fn exec_start(descriptor: &ServiceDescriptor) -> String {
    std::iter::once(descriptor.binary_path.display().to_string())
        .chain(descriptor.arguments.iter().cloned())
        .map(|word| exec_word(&word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a command-line word only when systemd would otherwise split or expand it.
fn exec_word(word: &str) -> String {
    let plain = !word.is_empty()
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));
    let word = word.replace('$', "$$");
    if plain { escape_specifiers(&word) } else { quote(&word) }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escape_specifiers(&escaped))
}

fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}
