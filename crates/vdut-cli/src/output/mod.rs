//! Output formatting utilities for the CLI
//!
//! Status tables, human-readable durations and the coloured one-line
//! status messages used by every command.

use std::time::Duration;

use tabled::{settings::Style, Table, Tabled};

use vdut_core::AgentState;

/// Format the agent state on one device as an ASCII table
pub fn format_agent_status(agent: &str, target: &str, state: &AgentState) -> String {
    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "AGENT")]
        agent: String,
        #[tabled(rename = "TARGET")]
        target: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "PROCESS")]
        process: String,
    }

    let (label, process) = match state {
        AgentState::NotInstalled => ("not installed", "-".to_string()),
        AgentState::InstalledStopped => ("stopped", "-".to_string()),
        AgentState::InstalledRunning { process } => (
            "running",
            process
                .as_deref()
                .map(|line| truncate(line, 60))
                .unwrap_or_else(|| "-".to_string()),
        ),
    };

    let row = StatusRow {
        agent: agent.to_string(),
        target: target.to_string(),
        state: label.to_string(),
        process,
    };
    Table::new([row]).with(Style::rounded()).to_string()
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Goes to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(Duration::from_secs(7260)), "2h 1m");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-process-line", 10), "a-very-...");
    }

    #[test]
    fn test_status_table() {
        let table = format_agent_status(
            "netagent",
            "admin@127.0.0.1:2222",
            &AgentState::InstalledRunning {
                process: Some("4242 /opt/netagent/bin/netagent".to_string()),
            },
        );
        assert!(table.contains("STATE"));
        assert!(table.contains("running"));
        assert!(table.contains("4242 /opt/netagent/bin/netagent"));

        let table = format_agent_status("netagent", "t", &AgentState::NotInstalled);
        assert!(table.contains("not installed"));
    }
}
