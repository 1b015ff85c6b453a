//! Output formatting utilities for the CLI
//!
//! Colored status lines for the user. Remote shell output goes to stdout
//! untouched; everything here is decoration around it.

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

use tt_core::ConnectionState;

/// Describe the keep-alive marker for `tether status`
pub fn format_keepalive(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("Keep-alive: holding connections open (PID {})", pid),
        None => "Keep-alive: idle".to_string(),
    }
}

/// One-word state label with the endpoint
pub fn format_state(endpoint: &str, state: ConnectionState) -> String {
    let label = match state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Closed => "closed",
        ConnectionState::Failed => "failed",
    };
    format!("{} [{}]", endpoint, label)
}

fn print_colored(mut out: impl std::io::Write, color: Color, prefix: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(prefix),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    print_colored(std::io::stdout(), Color::Green, "✓ ", msg);
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    print_colored(std::io::stderr(), Color::Red, "✗ ", msg);
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    print_colored(std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    print_colored(std::io::stdout(), Color::Cyan, "ℹ ", msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_keepalive() {
        assert_eq!(format_keepalive(None), "Keep-alive: idle");
        assert!(format_keepalive(Some(42)).contains("PID 42"));
    }

    #[test]
    fn test_format_state() {
        assert_eq!(
            format_state("10.0.0.5:5555", ConnectionState::Connected),
            "10.0.0.5:5555 [connected]"
        );
    }
}
