//! # vsock Allocation Constants
//!
//! Defines the kernel interface values, context ID bounds, and collaborator
//! settings used by the allocator. These constants are the **single source of
//! truth** for the vhost-vsock contract throughout the codebase.
//!
//! ## Cross-References
//!
//! - [`crate::cid`]: Uses the context ID bounds
//! - [`crate::gateway`]: Uses the ioctl request code
//! - [`crate::allocator`]: Uses the device path and the probe window defaults
//! - [`crate::blkid`]: Uses the blkid program, arguments, and timeout

use std::time::Duration;

// =============================================================================
// Kernel Interface
// =============================================================================
//
// The vhost-vsock driver exposes a single control node. Opening it creates a
// fresh vhost device; binding a guest CID to that device is the only
// arbitration point for CID uniqueness on the host.
// =============================================================================

/// Path to the vhost-vsock control device.
///
/// The fd opened on this node holds the CID bound to it and is normally
/// inherited by the hypervisor process.
pub const DEFAULT_VHOST_VSOCK_DEVICE: &str = "/dev/vhost-vsock";

/// `VHOST_VSOCK_SET_GUEST_CID` from `<linux/vhost.h>`.
///
/// Defined as `_IOW(VHOST_VIRTIO, 0x60, __u64)`:
/// direction write (`0x1 << 30`), size 8 (`0x8 << 16`),
/// type `VHOST_VIRTIO` (`0xAF << 8`), number `0x60`.
pub const VHOST_VSOCK_SET_GUEST_CID: u64 = 0x4008_AF60;

// =============================================================================
// Context ID Bounds
// =============================================================================
//
// CIDs are 64-bit on the wire but the upper 32 bits are reserved by the
// virtio-vsock specification and must stay zero. The first three values are
// reserved for the hypervisor, loopback, and host endpoints.
// =============================================================================

/// Well-known CID of the hypervisor.
pub const VMADDR_CID_HYPERVISOR: u64 = 0;

/// Well-known CID for local (loopback) communication.
pub const VMADDR_CID_LOCAL: u64 = 1;

/// Well-known CID of the host.
pub const VMADDR_CID_HOST: u64 = 2;

/// First CID assignable to a guest.
pub const FIRST_GUEST_CID: u64 = 3;

/// Largest CID assignable to a guest (`2^32 - 1`).
///
/// See: <https://docs.oasis-open.org/virtio/virtio/v1.1/virtio-v1.1.html>
pub const MAX_GUEST_CID: u64 = u32::MAX as u64;

// =============================================================================
// Disk Format Probe
// =============================================================================
//
// blkid is consulted by the surrounding VM setup to find out whether a block
// device already carries a filesystem. It is bounded by a timeout because a
// wedged block device can stall the probe indefinitely.
// =============================================================================

/// Default blkid executable (resolved through `PATH`).
pub const BLKID_PROGRAM: &str = "blkid";

/// Arguments placed before the disk path.
///
/// `-p` bypasses the blkid cache, `-s` restricts output to the filesystem
/// and partition table type, `-o export` emits `KEY=VALUE` lines.
pub const BLKID_ARGS: &[&str] = &["-p", "-s", "TYPE", "-s", "PTTYPE", "-o", "export"];

/// Exit status blkid uses when no signature could be identified.
///
/// Treated as "device is unformatted", not as a failure.
pub const BLKID_EXIT_NO_SIGNATURE: i32 = 2;

/// Timeout for a single blkid invocation (10 seconds).
pub const BLKID_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum blkid stderr bytes carried into an error message.
pub const MAX_BLKID_STDERR: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_code_matches_iow_encoding() {
        const IOC_WRITE: u64 = 1;
        const VHOST_VIRTIO: u64 = 0xAF;
        let size = std::mem::size_of::<u64>() as u64;
        let code = (IOC_WRITE << 30) | (size << 16) | (VHOST_VIRTIO << 8) | 0x60;
        assert_eq!(code, VHOST_VSOCK_SET_GUEST_CID);
    }

    #[test]
    fn test_guest_range_fits_in_32_bits() {
        assert_eq!(MAX_GUEST_CID >> 32, 0);
        assert!(FIRST_GUEST_CID > VMADDR_CID_HOST);
    }
}
