//! Context ID and probe window types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{FIRST_GUEST_CID, MAX_GUEST_CID};
use crate::error::{Error, Result};

/// A vsock context ID assignable to a guest.
///
/// Always within `[3, 2^32 - 1]`. A `ContextId` only means something
/// together with the [`DeviceHandle`](crate::DeviceHandle) it was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ContextId(u64);

impl ContextId {
    /// First CID assignable to a guest.
    pub const FIRST_GUEST: Self = Self(FIRST_GUEST_CID);

    /// Largest CID assignable to a guest.
    pub const MAX: Self = Self(MAX_GUEST_CID);

    /// Validates and wraps a raw CID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContextId`] for reserved values and values
    /// using the upper 32 bits.
    pub fn new(cid: u64) -> Result<Self> {
        if cid < FIRST_GUEST_CID {
            return Err(Error::InvalidContextId {
                cid,
                reason: "CIDs 0-2 are reserved",
            });
        }
        if cid > MAX_GUEST_CID {
            return Err(Error::InvalidContextId {
                cid,
                reason: "upper 32 bits are reserved",
            });
        }
        Ok(Self(cid))
    }

    /// Returns the raw CID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for ContextId {
    type Error = Error;

    fn try_from(cid: u64) -> Result<Self> {
        Self::new(cid)
    }
}

impl From<ContextId> for u64 {
    fn from(cid: ContextId) -> Self {
        cid.0
    }
}

/// Inclusive window of CIDs the allocator probes.
///
/// Defaults to the whole guest range. Narrower windows let several
/// hypervisors partition the host's CID space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidRange {
    first: ContextId,
    last: ContextId,
}

impl CidRange {
    /// The full guest range `[3, 2^32 - 1]`.
    pub const FULL: Self = Self {
        first: ContextId::FIRST_GUEST,
        last: ContextId::MAX,
    };

    /// Creates a window `[first, last]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if either bound is outside the guest
    /// range or the window is empty.
    pub fn new(first: u64, last: u64) -> Result<Self> {
        if first > last {
            return Err(Error::InvalidRange {
                first,
                last,
                reason: "range is empty",
            });
        }
        let (Ok(lo), Ok(hi)) = (ContextId::new(first), ContextId::new(last)) else {
            return Err(Error::InvalidRange {
                first,
                last,
                reason: "bounds must lie within [3, 2^32 - 1]",
            });
        };
        Ok(Self { first: lo, last: hi })
    }

    /// Lowest CID in the window.
    #[must_use]
    pub const fn first(&self) -> ContextId {
        self.first
    }

    /// Highest CID in the window.
    #[must_use]
    pub const fn last(&self) -> ContextId {
        self.last
    }

    /// Number of CIDs in the window.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.last.0 - self.first.0 + 1
    }

    /// Always false; a window holds at least one CID.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if `cid` lies in the window.
    #[must_use]
    pub fn contains(&self, cid: ContextId) -> bool {
        self.first <= cid && cid <= self.last
    }

    /// Maps a raw random draw onto the starting CID of the scan.
    ///
    /// Draws below the window collapse to its first CID, draws above it
    /// to its last.
    #[must_use]
    pub fn seed_from(&self, draw: u32) -> ContextId {
        ContextId(u64::from(draw).clamp(self.first.0, self.last.0))
    }

    /// CIDs from `start` up to the end of the window.
    pub(crate) fn ascending_from(&self, start: ContextId) -> impl Iterator<Item = ContextId> {
        (start.0..=self.last.0).map(ContextId)
    }

    /// CIDs from just below `start` down to the start of the window.
    pub(crate) fn descending_below(&self, start: ContextId) -> impl Iterator<Item = ContextId> {
        (self.first.0..start.0).rev().map(ContextId)
    }
}

impl Default for CidRange {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_cids_rejected() {
        for cid in 0..FIRST_GUEST_CID {
            assert!(ContextId::new(cid).is_err(), "cid {cid} must be reserved");
        }
        assert!(ContextId::new(MAX_GUEST_CID + 1).is_err());
        assert_eq!(ContextId::new(3).unwrap(), ContextId::FIRST_GUEST);
    }

    #[test]
    fn test_seed_collapses_low_draws() {
        let range = CidRange::FULL;
        assert_eq!(range.seed_from(0).get(), 3);
        assert_eq!(range.seed_from(2).get(), 3);
        assert_eq!(range.seed_from(3).get(), 3);
        assert_eq!(range.seed_from(u32::MAX).get(), MAX_GUEST_CID);
    }

    #[test]
    fn test_seed_clamped_into_narrow_window() {
        let range = CidRange::new(100, 200).unwrap();
        assert_eq!(range.seed_from(5).get(), 100);
        assert_eq!(range.seed_from(150).get(), 150);
        assert_eq!(range.seed_from(9_999).get(), 200);
    }

    #[test]
    fn test_probe_order_partitions_window() {
        let range = CidRange::new(3, 10).unwrap();
        let seed = range.seed_from(6);
        let order: Vec<u64> = range
            .ascending_from(seed)
            .chain(range.descending_below(seed))
            .map(ContextId::get)
            .collect();
        assert_eq!(order, vec![6, 7, 8, 9, 10, 5, 4, 3]);
    }

    #[test]
    fn test_descending_empty_at_window_start() {
        let range = CidRange::FULL;
        assert_eq!(range.descending_below(ContextId::FIRST_GUEST).count(), 0);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(CidRange::new(10, 9).is_err());
        assert!(CidRange::new(0, 9).is_err());
        assert!(CidRange::new(3, MAX_GUEST_CID + 1).is_err());
        assert_eq!(CidRange::new(7, 7).unwrap().len(), 1);
        assert_eq!(CidRange::FULL.len(), MAX_GUEST_CID - 2);
    }

    #[test]
    fn test_context_id_serde_is_bare_integer() {
        let cid = ContextId::new(42).unwrap();
        assert_eq!(serde_json::to_string(&cid).unwrap(), "42");
        assert!(serde_json::from_str::<ContextId>("1").is_err());
    }
}
