//! # Context ID Allocator
//!
//! Finds a CID no other guest on the host is using and returns it together
//! with the vhost-vsock device that holds it.
//!
//! ## Algorithm
//!
//! ```text
//!   draw r ← CSPRNG [0, 2^32-1]        seed c = clamp(r, first, last)
//!
//!   first                      c                               last
//!     │◄──── descending ──────┤├──────── ascending ──────────►│
//!     3   ...   c-2   c-1      c   c+1   c+2   ...       2^32-1
//!                        (2)   (1)
//! ```
//!
//! 1. Open the device. Failure is fatal and returned as-is.
//! 2. Submit `c, c+1, ..., last` to the gateway; first acceptance wins.
//! 3. Submit `c-1, c-2, ..., first`; first acceptance wins.
//! 4. Close the device and report exhaustion.
//!
//! Each CID in the window is submitted at most once per call. Uniqueness
//! across processes is arbitrated by the kernel: binding a CID to a device
//! is atomic with respect to other devices, so no client-side locking is
//! done here.
//!
//! ## Ownership
//!
//! The device fd *is* the reservation. It is returned to the caller only
//! when bound to an accepted CID; on exhaustion it is closed before the error
//! is returned. Dropping the returned [`DeviceHandle`] releases the CID.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::cid::{CidRange, ContextId};
use crate::constants::DEFAULT_VHOST_VSOCK_DEVICE;
use crate::error::{Error, Result};
use crate::gateway::{CidGateway, VhostVsockGateway};
use crate::seed::{OsRandomSeed, SeedSource};

// =============================================================================
// DeviceHandle
// =============================================================================

/// An open vhost-vsock device.
///
/// Holds the CID it was bound to for as long as it stays open.
#[derive(Debug)]
pub struct DeviceHandle {
    file: File,
    path: PathBuf,
}

impl DeviceHandle {
    /// Opens `path` read/write.
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the device was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Controls whether the fd survives `execve`.
    ///
    /// The fd is opened close-on-exec. A hypervisor launched as a child
    /// process that should take over the device needs it inheritable.
    ///
    /// # Errors
    ///
    /// Returns the `fcntl` error if the flags cannot be changed.
    pub fn set_inheritable(&self, inheritable: bool) -> io::Result<()> {
        let fd = self.file.as_raw_fd();
        // SAFETY: fd is owned by self.file and open for the whole call.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        let flags = if inheritable {
            flags & !libc::FD_CLOEXEC
        } else {
            flags | libc::FD_CLOEXEC
        };
        // SAFETY: as above; F_SETFD only touches the descriptor flags.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Consumes the handle, returning the underlying file.
    ///
    /// The CID stays bound until the returned file is closed.
    #[must_use]
    pub fn into_file(self) -> File {
        self.file
    }
}

impl AsFd for DeviceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for DeviceHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl From<DeviceHandle> for OwnedFd {
    fn from(handle: DeviceHandle) -> Self {
        handle.file.into()
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// Which half of the scan found the CID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeDirection {
    /// From the seed upwards.
    Ascending,
    /// From just below the seed downwards.
    Descending,
}

/// A CID bound to the device that holds it.
#[derive(Debug)]
pub struct Allocation {
    /// Device holding the CID. Closing it releases the CID.
    pub handle: DeviceHandle,
    /// The accepted CID.
    pub cid: ContextId,
    /// Scan half that produced the CID.
    pub direction: ProbeDirection,
    /// Number of candidates submitted, including the accepted one.
    pub attempts: u64,
}

impl Allocation {
    /// Splits into the handle and the CID.
    #[must_use]
    pub fn into_parts(self) -> (DeviceHandle, ContextId) {
        (self.handle, self.cid)
    }
}

#[derive(Debug, Default)]
struct ProbeStats {
    attempts: u64,
    last_errno: Option<i32>,
}

// =============================================================================
// ContextIdAllocator
// =============================================================================

/// Allocates guest CIDs through the vhost-vsock driver.
///
/// The allocator holds only configuration; every [`allocate`] call opens its
/// own device. It can be shared across threads when the gateway and seed
/// source can.
///
/// [`allocate`]: ContextIdAllocator::allocate
#[derive(Debug, Clone)]
pub struct ContextIdAllocator<G = VhostVsockGateway, S = OsRandomSeed> {
    device_path: PathBuf,
    range: CidRange,
    gateway: G,
    seed: S,
}

impl ContextIdAllocator {
    /// Creates an allocator for `/dev/vhost-vsock` over the full guest range.
    #[must_use]
    pub fn new() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_VHOST_VSOCK_DEVICE),
            range: CidRange::FULL,
            gateway: VhostVsockGateway,
            seed: OsRandomSeed,
        }
    }
}

impl Default for ContextIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: CidGateway, S: SeedSource> ContextIdAllocator<G, S> {
    /// Sets the control device path.
    #[must_use]
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = path.into();
        self
    }

    /// Restricts the probe window.
    #[must_use]
    pub fn with_range(mut self, range: CidRange) -> Self {
        self.range = range;
        self
    }

    /// Replaces the kernel gateway.
    #[must_use]
    pub fn with_gateway<G2: CidGateway>(self, gateway: G2) -> ContextIdAllocator<G2, S> {
        ContextIdAllocator {
            device_path: self.device_path,
            range: self.range,
            gateway,
            seed: self.seed,
        }
    }

    /// Replaces the seed source.
    #[must_use]
    pub fn with_seed_source<S2: SeedSource>(self, seed: S2) -> ContextIdAllocator<G, S2> {
        ContextIdAllocator {
            device_path: self.device_path,
            range: self.range,
            gateway: self.gateway,
            seed,
        }
    }

    /// Returns the control device path.
    #[must_use]
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Returns the probe window.
    #[must_use]
    pub fn range(&self) -> CidRange {
        self.range
    }

    /// Finds a free CID and binds it to a freshly opened device.
    ///
    /// # Errors
    ///
    /// - [`Error::Entropy`] if the seed cannot be drawn.
    /// - [`Error::DeviceOpen`] if the device cannot be opened; the gateway
    ///   is never called.
    /// - [`Error::Exhausted`] if every CID in the window was rejected; the
    ///   device has been closed.
    pub fn allocate(&self) -> Result<Allocation> {
        let seed = self.range.seed_from(self.seed.draw()?);

        let handle = DeviceHandle::open(&self.device_path)?;
        debug!(
            "Opened {} (fd {}), probing from seed {}",
            self.device_path.display(),
            handle.as_raw_fd(),
            seed
        );

        let mut stats = ProbeStats::default();
        let found = self
            .probe(
                &handle,
                ProbeDirection::Ascending,
                self.range.ascending_from(seed),
                &mut stats,
            )
            .or_else(|| {
                self.probe(
                    &handle,
                    ProbeDirection::Descending,
                    self.range.descending_below(seed),
                    &mut stats,
                )
            });

        if let Some((cid, direction)) = found {
            info!(
                "Allocated vsock CID {} ({:?}, {} attempts)",
                cid, direction, stats.attempts
            );
            return Ok(Allocation {
                handle,
                cid,
                direction,
                attempts: stats.attempts,
            });
        }

        // Closing the device before reporting leaves nothing held on failure.
        drop(handle);
        warn!(
            "No free vsock CID in [{}, {}] after {} attempts",
            self.range.first(),
            self.range.last(),
            stats.attempts
        );
        Err(Error::Exhausted {
            first: self.range.first().get(),
            last: self.range.last().get(),
            attempts: stats.attempts,
            last_errno: stats.last_errno,
        })
    }

    /// Submits candidates in order until the kernel accepts one.
    fn probe(
        &self,
        handle: &DeviceHandle,
        direction: ProbeDirection,
        candidates: impl Iterator<Item = ContextId>,
        stats: &mut ProbeStats,
    ) -> Option<(ContextId, ProbeDirection)> {
        debug!("Starting {:?} probe", direction);
        for cid in candidates {
            stats.attempts += 1;
            match self.gateway.set_guest_cid(handle.as_fd(), cid) {
                Ok(()) => return Some((cid, direction)),
                Err(e) => {
                    trace!("CID {} rejected: {}", cid, e);
                    stats.last_errno = e.raw_os_error();
                }
            }
        }
        None
    }
}

/// Allocates a CID on `/dev/vhost-vsock` with production defaults.
///
/// It is the caller's responsibility to keep the returned handle open for
/// as long as the guest uses the CID, typically by passing its fd to the
/// hypervisor.
///
/// # Errors
///
/// See [`ContextIdAllocator::allocate`].
pub fn find_context_id() -> Result<(DeviceHandle, ContextId)> {
    ContextIdAllocator::new()
        .allocate()
        .map(Allocation::into_parts)
}
