//! Shard id generation.
//!
//! Writers never coordinate the choice of shard. Each increment draws a fresh
//! id from a [`ShardIdSource`], uniformly and independently of every other
//! call, and the width of the ids decides the trade-off:
//!
//! - **narrow ids** keep the number of distinct shards (and so the read cost)
//!   small, but two concurrent writers pick the same shard more often;
//! - **wide ids** make such collisions vanishingly rare, at the price of one
//!   new shard per increment until a compaction folds them together.
//!
//! A collision is never incorrect: same-id writes add to each other. On stores
//! without atomic add it only costs a conflict and a retry.
//!
//! # Sizing
//!
//! [`ShardIdWidth::for_collision_target`] picks the narrowest width whose
//! birthday bound stays under a probability target for a given number of
//! concurrent writers:
//!
//! ```text
//!   P(any two of n writers collide) <= n (n - 1) / 2 / 2^(8 * width)
//! ```
//!
//! ```rust
//! use sommatori::shard_id::ShardIdWidth;
//!
//! let width = ShardIdWidth::for_collision_target(64, 1e-6);
//! assert_eq!(width.bytes(), 4);
//! assert!(width.collision_probability(64) < 1e-6);
//! ```

use std::fmt;

use rand::RngCore;

use crate::keys::{ShardId, MAX_SHARD_ID_LEN};

/// Peak concurrent writers assumed by the default width.
pub const DEFAULT_PEAK_WRITERS: u64 = 64;

/// Collision probability targeted by the default width.
pub const DEFAULT_COLLISION_TARGET: f64 = 1e-6;

/// Width of generated shard ids, in bytes (1 to 32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "u8", into = "u8")
)]
pub struct ShardIdWidth(u8);

impl ShardIdWidth {
    /// Narrowest width.
    pub const MIN: ShardIdWidth = ShardIdWidth(1);
    /// Widest width.
    pub const MAX: ShardIdWidth = ShardIdWidth(MAX_SHARD_ID_LEN as u8);

    /// Builds a width, returning `None` outside `1..=32`.
    pub const fn new(bytes: u8) -> Option<Self> {
        if bytes >= 1 && bytes as usize <= MAX_SHARD_ID_LEN {
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Width in bytes.
    pub const fn bytes(self) -> usize {
        self.0 as usize
    }

    /// Birthday bound on the probability that any two of `writers`
    /// concurrent writers draw the same id.
    pub fn collision_probability(self, writers: u64) -> f64 {
        if writers < 2 {
            return 0.0;
        }
        let pairs = writers as f64 * (writers - 1) as f64 / 2.0;
        let space = 2f64.powi(8 * self.0 as i32);
        (pairs / space).min(1.0)
    }

    /// The narrowest width keeping [`collision_probability`](Self::collision_probability)
    /// at or below `target` for `writers` concurrent writers.
    ///
    /// Saturates at [`ShardIdWidth::MAX`].
    pub fn for_collision_target(writers: u64, target: f64) -> Self {
        (1..=MAX_SHARD_ID_LEN as u8)
            .map(ShardIdWidth)
            .find(|width| width.collision_probability(writers) <= target)
            .unwrap_or(Self::MAX)
    }
}

impl Default for ShardIdWidth {
    fn default() -> Self {
        Self::for_collision_target(DEFAULT_PEAK_WRITERS, DEFAULT_COLLISION_TARGET)
    }
}

impl TryFrom<u8> for ShardIdWidth {
    type Error = String;

    fn try_from(bytes: u8) -> Result<Self, Self::Error> {
        Self::new(bytes).ok_or_else(|| {
            format!("shard id width {bytes} outside 1..={MAX_SHARD_ID_LEN}")
        })
    }
}

impl From<ShardIdWidth> for u8 {
    fn from(width: ShardIdWidth) -> u8 {
        width.0
    }
}

impl fmt::Display for ShardIdWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// A generator of shard ids.
pub trait ShardIdSource: Send + Sync {
    /// Returns an id of exactly `width` bytes.
    fn next_id(&self, width: ShardIdWidth) -> ShardId;
}

/// Uniformly random ids from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomShardIds;

impl ShardIdSource for RandomShardIds {
    fn next_id(&self, width: ShardIdWidth) -> ShardId {
        let mut buf = [0u8; MAX_SHARD_ID_LEN];
        rand::thread_rng().fill_bytes(&mut buf[..width.bytes()]);
        ShardId::with_width(buf, width)
    }
}

/// Always the same id, resized to the requested width.
///
/// Forces every writer onto one shard, which is how collisions are
/// reproduced deterministically.
#[derive(Debug, Clone, Copy)]
pub struct FixedShardIds {
    id: ShardId,
}

impl FixedShardIds {
    /// Yields `id`, truncated or zero-extended to the requested width.
    pub fn new(id: ShardId) -> Self {
        Self { id }
    }
}

impl ShardIdSource for FixedShardIds {
    fn next_id(&self, width: ShardIdWidth) -> ShardId {
        let mut buf = [0u8; MAX_SHARD_ID_LEN];
        let src = self.id.as_bytes();
        let n = src.len().min(width.bytes());
        buf[..n].copy_from_slice(&src[..n]);
        ShardId::with_width(buf, width)
    }
}

impl<T: ShardIdSource + ?Sized> ShardIdSource for std::sync::Arc<T> {
    fn next_id(&self, width: ShardIdWidth) -> ShardId {
        (**self).next_id(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_width_bounds() {
        assert_eq!(ShardIdWidth::new(0), None);
        assert_eq!(ShardIdWidth::new(33), None);
        assert_eq!(ShardIdWidth::new(1), Some(ShardIdWidth::MIN));
        assert_eq!(ShardIdWidth::new(32), Some(ShardIdWidth::MAX));
        assert!(ShardIdWidth::try_from(0u8).is_err());
        assert_eq!(u8::from(ShardIdWidth::MAX), 32);
    }

    #[test]
    fn test_default_width() {
        let width = ShardIdWidth::default();
        assert_eq!(width.bytes(), 4);
        assert!(width.collision_probability(DEFAULT_PEAK_WRITERS) <= DEFAULT_COLLISION_TARGET);
        let narrower = ShardIdWidth::new(3).unwrap();
        assert!(narrower.collision_probability(DEFAULT_PEAK_WRITERS) > DEFAULT_COLLISION_TARGET);
    }

    #[test]
    fn test_collision_probability() {
        let one = ShardIdWidth::MIN;
        assert_eq!(one.collision_probability(0), 0.0);
        assert_eq!(one.collision_probability(1), 0.0);
        assert!((one.collision_probability(2) - 1.0 / 256.0).abs() < 1e-12);
        assert_eq!(one.collision_probability(10_000), 1.0);
    }

    #[test]
    fn test_for_collision_target_saturates() {
        assert_eq!(
            ShardIdWidth::for_collision_target(u64::MAX, 0.0),
            ShardIdWidth::MAX
        );
        assert_eq!(ShardIdWidth::for_collision_target(1, 0.0), ShardIdWidth::MIN);
    }

    #[test]
    fn test_random_ids() {
        let width = ShardIdWidth::new(16).unwrap();
        let ids: HashSet<ShardId> = (0..1000).map(|_| RandomShardIds.next_id(width)).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.len() == 16));
    }

    #[test]
    fn test_fixed_ids_resize() {
        let id = ShardId::from_slice(&[0xaa, 0xbb]).unwrap();
        let fixed = FixedShardIds::new(id);
        assert_eq!(fixed.next_id(ShardIdWidth::new(2).unwrap()), id);
        assert_eq!(fixed.next_id(ShardIdWidth::MIN).as_bytes(), &[0xaa]);
        assert_eq!(
            fixed.next_id(ShardIdWidth::new(4).unwrap()).as_bytes(),
            &[0xaa, 0xbb, 0, 0]
        );
    }

    #[test]
    fn test_random_ids_across_threads() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];
        for _ in 0..8 {
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let id = RandomShardIds.next_id(ShardIdWidth::new(20).unwrap());
                    seen.lock().unwrap().insert(id);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 800);
    }
}
