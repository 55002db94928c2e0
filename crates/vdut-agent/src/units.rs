//! systemd unit files and remote file-writing commands

use vdut_core::config::{AgentLayout, EnvironmentConfig};

/// Heredoc delimiter; never appears in generated unit text
const HEREDOC_END: &str = "VDUT_EOF";

/// Service unit running the agent binary
pub fn agent_unit(layout: &AgentLayout) -> String {
    format!(
        "[Unit]
Description={description}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec_start}
Restart=on-failure
RestartSec=5
StandardOutput=append:{log}
StandardError=append:{log}

[Install]
WantedBy=multi-user.target
",
        description = layout.description,
        exec_start = layout.exec_start(),
        log = layout.log_file,
    )
}

/// DHCP client unit that runs once and stays active
///
/// The stock unit keeps a daemon in the foreground; a oneshot lets
/// `network-online.target` settle before the agent starts.
pub fn dhcp_oneshot_unit(env: &EnvironmentConfig) -> String {
    format!(
        "[Unit]
Description=DHCP client on {iface}
Wants=network.target
Before=network-online.target

[Service]
Type=oneshot
RemainAfterExit=yes
ExecStart=/sbin/dhclient -1 -v {iface}
ExecStop=/sbin/dhclient -r {iface}

[Install]
WantedBy=multi-user.target
",
        iface = env.dhcp_interface,
    )
}

/// Shell command replacing `path` with `content` as root
pub fn write_file_command(path: &str, content: &str) -> String {
    let mut command = format!("sudo tee {} > /dev/null <<'{}'\n{}", path, HEREDOC_END, content);
    if !content.ends_with('\n') {
        command.push('\n');
    }
    command.push_str(HEREDOC_END);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_unit() {
        let layout = AgentLayout {
            args: vec!["--verbose".to_string()],
            ..AgentLayout::default()
        };
        let unit = agent_unit(&layout);
        assert!(unit.contains("Description=Network device agent"));
        assert!(unit.contains("ExecStart=/opt/netagent/bin/netagent --verbose\n"));
        assert!(unit.contains("StandardOutput=append:/var/log/netagent.log"));
        assert!(unit.contains("WantedBy=multi-user.target"));
        assert!(!unit.contains(HEREDOC_END));
    }

    #[test]
    fn test_dhcp_unit_is_oneshot() {
        let unit = dhcp_oneshot_unit(&EnvironmentConfig::default());
        assert!(unit.contains("Type=oneshot"));
        assert!(unit.contains("RemainAfterExit=yes"));
        assert!(unit.contains("dhclient -1 -v eth0"));
    }

    #[test]
    fn test_write_file_command() {
        let command = write_file_command("/etc/systemd/system/a.service", "[Unit]\n");
        assert_eq!(
            command,
            "sudo tee /etc/systemd/system/a.service > /dev/null <<'VDUT_EOF'\n[Unit]\nVDUT_EOF"
        );

        let command = write_file_command("/tmp/x", "no newline");
        assert!(command.ends_with("no newline\nVDUT_EOF"));
    }
}
