//! # vsockcid
//!
//! **Collision-free vsock context IDs for hypervisor guests**
//!
//! Every guest attached to the host's vsock namespace needs a context ID
//! (CID) no other guest holds. The Linux vhost-vsock driver is the only
//! authority on which CIDs are taken: a CID is claimed by binding it to an
//! open `/dev/vhost-vsock` fd, and released when that fd is closed. This
//! crate negotiates a free CID with the driver and hands back the fd that
//! holds it.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          vsockcid                                │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                  ContextIdAllocator                        │  │
//! │  │  seed ← CSPRNG │ open device │ probe ▲ then ▼ │ own fd     │  │
//! │  └──────────────────────────────┬─────────────────────────────┘  │
//! │                                 │ set_guest_cid(fd, cid)         │
//! │  ┌──────────────────────────────▼─────────────────────────────┐  │
//! │  │                CidGateway (injectable)                     │  │
//! │  │     VhostVsockGateway: ioctl(VHOST_VSOCK_SET_GUEST_CID)     │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Supporting: blkid disk format probe │ vsock support detection   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Security Model
//!
//! The scan starts at a CID drawn from the OS CSPRNG. With a predictable
//! start, a co-located process could pre-claim the CIDs a new guest is
//! about to try and starve it. Uniqueness itself is enforced by the kernel;
//! the allocator performs no client-side locking and keeps no registry.
//!
//! # Example
//!
//! ```rust,ignore
//! use vsockcid::ContextIdAllocator;
//!
//! fn main() -> vsockcid::Result<()> {
//!     let allocation = ContextIdAllocator::new().allocate()?;
//!     allocation.handle.set_inheritable(true)?;
//!     println!("guest-cid={} vhostfd={}", allocation.cid, allocation.handle.as_raw_fd());
//!     // ... launch the hypervisor, keep the handle open while the guest runs
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod blkid;
pub mod cid;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod platform;
pub mod seed;

// Re-exports
pub use allocator::{Allocation, ContextIdAllocator, DeviceHandle, ProbeDirection, find_context_id};
pub use blkid::{BlkidProbe, dev_format, parse_export_output};
pub use cid::{CidRange, ContextId};
pub use constants::*;
pub use error::{Error, Result};
pub use gateway::{CidGateway, VhostVsockGateway};
pub use platform::VsockSupport;
pub use seed::{FixedSeed, OsRandomSeed, SeedSource};
