//! Background-execution resource leases
//!
//! A lease is held while at least one connection is active. The coordinator
//! calls `acquire` on the 0 -> 1 transition and `release` on 1 -> 0, never
//! twice in a row.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tt_core::config;

/// Default keep-alive marker file name
const KEEPALIVE_FILE_NAME: &str = "keepalive.pid";

/// An exclusive resource held while any connection is active
pub trait ResourceLease: Send + Sync {
    /// Take the resource. Failures are logged, not returned.
    fn acquire(&self);

    /// Give the resource back
    fn release(&self);
}

/// Lease that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLease;

impl ResourceLease for NoopLease {
    fn acquire(&self) {}
    fn release(&self) {}
}

/// Marks the process as keeping connections alive by writing its PID to a
/// file while the lease is held.
///
/// `tether status` reads the file to report whether a keep-alive process is
/// holding connections open.
#[derive(Debug, Clone)]
pub struct PidFileLease {
    path: PathBuf,
    pid: u32,
}

impl PidFileLease {
    /// Lease backed by `path`, recording the current process id
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for PidFileLease {
    fn default() -> Self {
        Self::new(default_keepalive_path())
    }
}

impl ResourceLease for PidFileLease {
    fn acquire(&self) {
        match write_pid_file(&self.path, self.pid) {
            Ok(()) => tracing::debug!("Keep-alive lease acquired ({:?})", self.path),
            Err(e) => tracing::warn!("Failed to write keep-alive file {:?}: {}", self.path, e),
        }
    }

    fn release(&self) {
        match remove_pid_file(&self.path) {
            Ok(()) => tracing::debug!("Keep-alive lease released ({:?})", self.path),
            Err(e) => tracing::warn!("Failed to remove keep-alive file {:?}: {}", self.path, e),
        }
    }
}

/// Default keep-alive marker path
pub fn default_keepalive_path() -> PathBuf {
    config::default_config_dir().join(KEEPALIVE_FILE_NAME)
}

/// Read the PID from a keep-alive file.
///
/// `Ok(None)` if the file does not exist.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_pid_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", pid)?;
    Ok(())
}

fn remove_pid_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
