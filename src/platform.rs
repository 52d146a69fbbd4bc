//! Host vsock support detection.
//!
//! Checks whether the vhost-vsock control device is present and usable
//! before a hypervisor tries to allocate a CID.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::constants::DEFAULT_VHOST_VSOCK_DEVICE;

/// Detected vhost-vsock availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VsockSupport {
    /// Device path that was checked.
    pub device: PathBuf,
    /// Device node exists.
    pub present: bool,
    /// Device can be opened read/write by this process.
    pub accessible: bool,
    /// Reason the device is unusable, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VsockSupport {
    /// Checks `/dev/vhost-vsock`.
    pub fn detect() -> Self {
        Self::detect_at(Path::new(DEFAULT_VHOST_VSOCK_DEVICE))
    }

    /// Checks the device at `device`.
    pub fn detect_at(device: &Path) -> Self {
        if !device.exists() {
            return Self {
                device: device.to_path_buf(),
                present: false,
                accessible: false,
                reason: Some("device node missing (is the vhost_vsock module loaded?)".into()),
            };
        }

        // Opening creates a vhost device but binds no CID; dropping it
        // immediately leaves no trace.
        let (accessible, reason) = match OpenOptions::new().read(true).write(true).open(device) {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        Self {
            device: device.to_path_buf(),
            present: true,
            accessible,
            reason,
        }
    }

    /// Returns true if CIDs can be allocated through this device.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.present && self.accessible
    }
}
