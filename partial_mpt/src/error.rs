//! Typed failure kinds for partial-trie operations.

use ethereum_types::H256;
use thiserror::Error;

use crate::nibbles::Nibbles;

/// Stores the result of trie operations. Returns a [`TrieError`] upon
/// failure.
pub type TrieResult<T> = Result<T, TrieError>;

/// An error produced while reading, decoding or mutating a partial trie.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TrieError {
    /// A hash reference on a requested path had no backing bytes in the node
    /// store. A witness that triggers this is incomplete or wrong; this is
    /// never a substitute for an exclusion proof.
    #[error("node 0x{0:x} is not present in the witness node store")]
    MissingNode(H256),

    /// A stored node failed to decode, or decoded into a shape no trie node
    /// has.
    #[error("malformed trie node: {0}")]
    MalformedNode(#[from] rlp::DecoderError),

    /// A structural rule of canonical tries was broken.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Structural rules a canonical Ethereum trie upholds, tagged so callers can
/// discriminate which one was broken.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum InvariantViolation {
    /// An extension node carried an empty key segment.
    #[error("extension node with an empty key segment")]
    EmptyKeySegment,

    /// A branch node carried fewer than two non-null subnodes.
    #[error("branch node with fewer than two non-null subnodes")]
    LTTwoNonNullSubnodes,

    /// A key ran out (or ran long) where the fixed 64-nibble path layout
    /// requires more (or fewer) nibbles.
    #[error("key {0} does not extend to a full-length trie path")]
    InvalidFullPath(Nibbles),

    /// Two node shapes were paired in a way no canonical trie can produce,
    /// such as a leaf opposite an extension at the same position.
    #[error("node pairing at {0} is impossible between canonical tries")]
    InvalidParent(Nibbles),

    /// A branch node carried a non-empty value; Ethereum state and storage
    /// tries never use branch values.
    #[error("branch node at {0} carries a non-empty value")]
    NonEmptyBytesValue(Nibbles),

    /// The pre-state trie held an account equal to the empty-account
    /// sentinel.
    #[error("pre-state trie holds an empty account at {0}")]
    LeftLeafEmptyAccount(Nibbles),

    /// The pre-state storage trie held an explicit zero value.
    #[error("pre-state storage trie holds an explicit zero value at {0}")]
    LeftNodeZero(Nibbles),

    /// The post-state storage trie held an explicit zero value; zero slots
    /// are erased, never stored.
    #[error("post-state storage trie holds an explicit zero value at {0}")]
    RightNodeZero(Nibbles),
}
