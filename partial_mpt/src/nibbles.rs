//! Nibble paths: the unit of key material in a Merkle Patricia trie.
//!
//! A [`Nibbles`] is an ordered sequence of 4-bit values stored one nibble per
//! byte (high half always zero). Keys of state and storage tries are 64
//! nibbles, derived from a 32-byte Keccak digest; shorter paths appear
//! throughout the trie as leaf tails and extension segments.

use std::{
    fmt::{self, Debug, Display, LowerHex},
    str::FromStr,
};

use ethereum_types::H256;
use rlp::DecoderError;
use serde::{Deserialize, Serialize};

use crate::error::{TrieError, TrieResult};

/// A single hex digit of a trie path.
pub type Nibble = u8;

/// An owned nibble path.
#[derive(Clone, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Nibbles(Vec<Nibble>);

impl Nibbles {
    /// Wraps a raw nibble sequence. Every element must be below 16.
    pub fn new(nibbles: Vec<Nibble>) -> Self {
        debug_assert!(nibbles.iter().all(|n| *n < 16));
        Self(nibbles)
    }

    /// A single-nibble path.
    pub fn from_nibble(nibble: Nibble) -> Self {
        Self::new(vec![nibble])
    }

    /// Splits each byte into two nibbles, high half first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }
        Self(nibbles)
    }

    /// The 64-nibble path of a hashed trie key.
    pub fn from_h256(digest: H256) -> Self {
        Self::from_bytes(digest.as_bytes())
    }

    /// Packs nibble pairs back into bytes; `None` if the count is odd.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.0.len() % 2 != 0 {
            return None;
        }
        Some(self.0.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
    }

    /// Repacks a full-length path into the digest it came from; `None` for
    /// any other length.
    pub fn to_h256(&self) -> Option<H256> {
        match self.0.len() == 64 {
            true => self.to_bytes().map(|bytes| H256::from_slice(&bytes)),
            false => None,
        }
    }

    /// The number of nibbles in the path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path holds no nibbles.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first nibble, if any.
    pub fn first(&self) -> Option<Nibble> {
        self.0.first().copied()
    }

    /// The nibble at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of bounds.
    pub fn at(&self, idx: usize) -> Nibble {
        self.0[idx]
    }

    /// The first `count` nibbles.
    pub fn prefix(&self, count: usize) -> Self {
        Self(self.0[..count].to_vec())
    }

    /// Everything from nibble `idx` onward.
    pub fn slice_from(&self, idx: usize) -> Self {
        Self(self.0[idx..].to_vec())
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &Self) -> Self {
        let mut nibbles = self.0.clone();
        nibbles.extend_from_slice(&other.0);
        Self(nibbles)
    }

    /// This path extended by one nibble.
    pub fn pushed(&self, nibble: Nibble) -> Self {
        debug_assert!(nibble < 16);
        let mut nibbles = self.0.clone();
        nibbles.push(nibble);
        Self(nibbles)
    }

    /// Length of the longest shared prefix of `self` and `other`.
    pub fn common_prefix_len(&self, other: &Self) -> usize {
        self.0
            .iter()
            .zip(&other.0)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Whether `prefix` is a prefix of this path.
    pub fn has_prefix(&self, prefix: &Self) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0
    }

    /// The hex-prefix ("compact") encoding: a flag nibble
    /// `(is_leaf << 1) | (len & 1)`, a zero pad nibble when the count is
    /// even, then the path packed two nibbles per byte.
    pub fn to_hex_prefix_encoding(&self, is_leaf: bool) -> Vec<u8> {
        let odd = self.0.len() % 2 == 1;
        let flag = ((is_leaf as u8) << 1) | (odd as u8);
        let mut out = Vec::with_capacity(1 + self.0.len() / 2);
        let rest = match odd {
            true => {
                out.push((flag << 4) | self.0[0]);
                &self.0[1..]
            }
            false => {
                out.push(flag << 4);
                &self.0[..]
            }
        };
        out.extend(rest.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
        out
    }

    /// Inverse of [`Self::to_hex_prefix_encoding`], reading the flag from the
    /// top nibble of the first byte.
    pub fn from_hex_prefix_encoding(bytes: &[u8]) -> TrieResult<(Self, bool)> {
        let first = *bytes
            .first()
            .ok_or(DecoderError::Custom("empty hex-prefix encoding"))?;
        let flag = first >> 4;
        let is_leaf = match flag {
            0 | 1 => false,
            2 | 3 => true,
            _ => return Err(DecoderError::Custom("bad hex-prefix flag nibble").into()),
        };

        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        match flag & 1 == 1 {
            true => nibbles.push(first & 0x0f),
            false if first & 0x0f != 0 => {
                return Err(DecoderError::Custom("nonzero hex-prefix pad nibble").into())
            }
            false => (),
        }
        for byte in &bytes[1..] {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }

        Ok((Self(nibbles), is_leaf))
    }
}

impl FromStr for Nibbles {
    type Err = TrieError;

    /// Parses an (optionally `0x`-prefixed) hex string, one nibble per digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("0x")
            .unwrap_or(s)
            .chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as Nibble)
                    .ok_or_else(|| DecoderError::Custom("non-hex digit in nibble string").into())
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        <Self as LowerHex>::fmt(self, f)
    }
}

impl LowerHex for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nibble in &self.0 {
            write!(f, "{nibble:x}")?;
        }
        Ok(())
    }
}

impl Debug for Nibbles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nibbles({self})")
    }
}
