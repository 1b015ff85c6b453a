//! Status command implementation

use anyhow::{Context, Result};

use crate::output::format_keepalive;
use tt_session::status::{default_keepalive_path, read_pid_file};

/// Report whether a tether process is holding connections open
pub fn status_command() -> Result<()> {
    let path = default_keepalive_path();
    let pid = read_pid_file(&path)
        .with_context(|| format!("Failed to read keep-alive file: {:?}", path))?;

    println!("{}", format_keepalive(pid));
    Ok(())
}
