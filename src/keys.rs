//! Shard key codec.
//!
//! Every counter owns a [`Namespace`]: a reserved key prefix under which all of
//! its shards live. A shard key is the namespace's shard prefix followed by the
//! raw bytes of a [`ShardId`]:
//!
//! ```text
//!   root prefix      escaped name        tag   shard id (1..=32 bytes)
//!  ┌───────────┬──────────────────────┬──────┬─────────────────────────┐
//!  │ 02 73 6f… │ 01  6f 72 64 … 00    │  01  │  9c 1f 04 e2            │
//!  └───────────┴──────────────────────┴──────┴─────────────────────────┘
//!               byte-string code, 0x00 bytes escaped as 00 ff,
//!               terminated by a bare 00
//! ```
//!
//! Escaping and termination make the encoding of one name never a prefix of
//! another name's shard prefix, so every namespace maps to one contiguous key
//! range disjoint from all others, and the order of shard ids inside it has no
//! bearing on where the range lies.
//!
//! Shard values are 8-byte little-endian two's-complement integers, the layout
//! atomic-add capable stores operate on.
//!
//! # Example
//!
//! ```rust
//! use sommatori::keys::{Namespace, ShardId};
//!
//! let orders = Namespace::new("orders");
//! let id = ShardId::from_slice(&[1, 2, 3, 4]).unwrap();
//!
//! let key = orders.shard_key(&id);
//! assert!(orders.range().contains(&key));
//! assert_eq!(orders.decode(&key).unwrap(), id);
//! ```

use std::fmt;

use thiserror::Error;

use crate::shard_id::ShardIdWidth;
use crate::store::KeyRange;

/// Widest shard id the codec accepts, in bytes.
pub const MAX_SHARD_ID_LEN: usize = 32;

/// Root prefix used by [`Namespace::new`].
pub const DEFAULT_ROOT: &[u8] = b"\x02sommatori\x00";

const BYTES_CODE: u8 = 0x01;
const SHARD_TAG: u8 = 0x01;
const NULL_ESCAPE: u8 = 0xFF;

/// Errors decoding keys or values found in a namespace range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key does not start with the namespace's shard prefix.
    #[error("key is outside the namespace")]
    ForeignKey,

    /// The shard id part has an unsupported length.
    #[error("shard id of {0} bytes (expected 1..={MAX_SHARD_ID_LEN})")]
    ShardIdLength(usize),

    /// The value is not an 8-byte integer.
    #[error("value of {0} bytes (expected 8)")]
    ValueLength(usize),
}

/// An opaque shard identifier of 1 to [`MAX_SHARD_ID_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId {
    len: u8,
    bytes: [u8; MAX_SHARD_ID_LEN],
}

impl ShardId {
    /// Builds an id from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.is_empty() || bytes.len() > MAX_SHARD_ID_LEN {
            return Err(KeyError::ShardIdLength(bytes.len()));
        }
        let mut buf = [0u8; MAX_SHARD_ID_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            len: bytes.len() as u8,
            bytes: buf,
        })
    }

    /// Keeps the first `width` bytes of `buf`.
    pub(crate) fn with_width(mut buf: [u8; MAX_SHARD_ID_LEN], width: ShardIdWidth) -> Self {
        buf[width.bytes()..].fill(0);
        Self {
            len: width.bytes() as u8,
            bytes: buf,
        }
    }

    /// The raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Width of the id in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always `false`; ids have at least one byte.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({self})")
    }
}

/// The reserved key prefix of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: Vec<u8>,
    prefix: Vec<u8>,
}

impl Namespace {
    /// A namespace under [`DEFAULT_ROOT`].
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self::under(DEFAULT_ROOT, name)
    }

    /// A namespace under an application-reserved `root` prefix.
    ///
    /// No other data may be stored under `root`.
    pub fn under(root: &[u8], name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        let mut prefix = Vec::with_capacity(root.len() + name.len() + 3);
        prefix.extend_from_slice(root);
        prefix.push(BYTES_CODE);
        for &byte in name {
            prefix.push(byte);
            if byte == 0x00 {
                prefix.push(NULL_ESCAPE);
            }
        }
        prefix.push(0x00);
        prefix.push(SHARD_TAG);
        Self {
            name: name.to_vec(),
            prefix,
        }
    }

    /// The unencoded name.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The prefix shared by every shard key of this namespace.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// The contiguous range holding every shard key of this namespace.
    pub fn range(&self) -> KeyRange {
        KeyRange::new(self.prefix.clone(), strinc(&self.prefix))
    }

    /// Returns `true` if `key` belongs to this namespace.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Encodes the key of shard `id`.
    pub fn shard_key(&self, id: &ShardId) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + id.len());
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Decodes the shard id of a key from this namespace.
    pub fn decode(&self, key: &[u8]) -> Result<ShardId, KeyError> {
        let id = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or(KeyError::ForeignKey)?;
        ShardId::from_slice(id)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.name))
    }
}

/// The first key that sorts after every key starting with `prefix`.
///
/// `prefix` is never empty and never all `0xff`, since namespace prefixes end
/// with the shard tag.
fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last != 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0xff]
}

/// Encodes a shard delta.
pub fn encode_delta(delta: i64) -> [u8; 8] {
    delta.to_le_bytes()
}

/// Decodes a shard delta.
pub fn decode_delta(value: &[u8]) -> Result<i64, KeyError> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| KeyError::ValueLength(value.len()))?;
    Ok(i64::from_le_bytes(bytes))
}

/// Lowercase hex rendering of a key, for error reports and logs.
pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
