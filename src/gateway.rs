//! Kernel arbitration gateway.
//!
//! The gateway submits a single candidate CID to the vhost-vsock driver and
//! reports whether the kernel bound it to the device. It holds no state and
//! applies no retry policy; the scan order lives in
//! [`crate::allocator`].
//!
//! The seam is a trait so tests can substitute a fake kernel. Closures with
//! the right signature implement it directly:
//!
//! ```rust,ignore
//! let allocator = ContextIdAllocator::new()
//!     .with_gateway(|_fd: BorrowedFd<'_>, cid: ContextId| {
//!         if cid.get() == 7 { Ok(()) } else { Err(io::Error::from_raw_os_error(libc::EADDRINUSE)) }
//!     });
//! ```

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use crate::cid::ContextId;
use crate::constants::VHOST_VSOCK_SET_GUEST_CID;

/// Binds a candidate CID to an open vhost-vsock device.
pub trait CidGateway: Send + Sync {
    /// Issues one bind request for `cid` against `device`.
    ///
    /// On success the kernel keeps `cid` bound to the device until the
    /// device is closed.
    ///
    /// # Errors
    ///
    /// Returns the OS error reported by the kernel, typically `EADDRINUSE`
    /// when another device already holds `cid`.
    fn set_guest_cid(&self, device: BorrowedFd<'_>, cid: ContextId) -> io::Result<()>;
}

impl<F> CidGateway for F
where
    F: Fn(BorrowedFd<'_>, ContextId) -> io::Result<()> + Send + Sync,
{
    fn set_guest_cid(&self, device: BorrowedFd<'_>, cid: ContextId) -> io::Result<()> {
        self(device, cid)
    }
}

/// Production gateway issuing `VHOST_VSOCK_SET_GUEST_CID`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VhostVsockGateway;

impl CidGateway for VhostVsockGateway {
    fn set_guest_cid(&self, device: BorrowedFd<'_>, cid: ContextId) -> io::Result<()> {
        let guest_cid: u64 = cid.get();
        // SAFETY: `device` is a live fd for the duration of the borrow and
        // the request reads exactly one u64 through the pointer, which
        // outlives the call.
        let ret = unsafe {
            libc::ioctl(
                device.as_raw_fd(),
                VHOST_VSOCK_SET_GUEST_CID as _,
                &guest_cid as *const u64,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
