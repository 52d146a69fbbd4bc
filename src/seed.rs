//! Probe seed sources.
//!
//! The allocator starts its scan at a random CID. A predictable starting
//! point would let a co-located process pre-claim the CIDs a new guest is
//! about to request, so production seeds come from the OS CSPRNG.

use crate::error::{Error, Result};

/// Source of the raw 32-bit draw the probe scan starts from.
pub trait SeedSource: Send + Sync {
    /// Draws a value uniformly from `[0, 2^32 - 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if no random value could be produced.
    fn draw(&self) -> Result<u32>;
}

/// Seeds drawn from the operating system's CSPRNG (`getrandom(2)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSeed;

impl SeedSource for OsRandomSeed {
    fn draw(&self) -> Result<u32> {
        let mut buf = [0u8; 4];
        getrandom::getrandom(&mut buf).map_err(|e| Error::Entropy(e.to_string()))?;
        Ok(u32::from_ne_bytes(buf))
    }
}

/// A constant seed.
///
/// Only meant for deterministic tests; never use it on a shared host.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeed(pub u32);

impl SeedSource for FixedSeed {
    fn draw(&self) -> Result<u32> {
        Ok(self.0)
    }
}
