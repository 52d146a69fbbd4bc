//! Error types for vsock context ID allocation.

use std::path::PathBuf;

/// Result type alias for allocation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while allocating a context ID.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Allocation Errors
    // =========================================================================
    /// The vhost-vsock control device could not be opened.
    ///
    /// Usually a configuration problem: missing `vhost_vsock` module,
    /// missing device node, or insufficient permissions.
    #[error("failed to open vsock device {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate in the probe window was rejected by the kernel.
    ///
    /// Indicates the host's CID space (or the configured window) is saturated.
    #[error(
        "could not get a unique context ID for the vsock: all {attempts} candidates in [{first}, {last}] rejected{}",
        errno_suffix(.last_errno)
    )]
    Exhausted {
        first: u64,
        last: u64,
        attempts: u64,
        last_errno: Option<i32>,
    },

    /// The OS random source failed to produce a probe seed.
    #[error("failed to draw random probe seed: {0}")]
    Entropy(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Value is not a CID assignable to a guest.
    #[error("invalid context ID {cid}: {reason}")]
    InvalidContextId { cid: u64, reason: &'static str },

    /// Probe window is empty or outside the guest CID range.
    #[error("invalid context ID range [{first}, {last}]: {reason}")]
    InvalidRange {
        first: u64,
        last: u64,
        reason: &'static str,
    },

    // =========================================================================
    // Disk Format Probe Errors
    // =========================================================================
    /// blkid exited with an unexpected status.
    #[error("blkid failed on {disk} with {status}: {stderr}")]
    BlkidFailed {
        disk: PathBuf,
        status: String,
        stderr: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn errno_suffix(errno: &Option<i32>) -> String {
    errno
        .map(|e| format!(" (last errno {e})"))
        .unwrap_or_default()
}

impl Error {
    /// Returns true if the CID space was exhausted.
    ///
    /// Exhaustion points at resource pressure on the host rather than at a
    /// configuration problem.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Returns true if the control device could not be opened.
    #[must_use]
    pub fn is_device_open(&self) -> bool {
        matches!(self, Self::DeviceOpen { .. })
    }
}
