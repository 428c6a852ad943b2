//! Session-level failure kinds, layered over the trie errors.

use ethereum_types::{Address, H256};
use thiserror::Error;

pub use partial_mpt::error::{InvariantViolation, TrieError};

/// Result alias for session-level operations.
pub type StateResult<T> = Result<T, StateError>;

/// An error produced while ingesting a witness bundle or computing over the
/// tries it carries.
#[derive(Debug, Error)]
pub enum StateError {
    /// A trie-level failure: missing node, malformed node, or a broken
    /// structural invariant.
    #[error(transparent)]
    Trie(#[from] TrieError),

    /// The bundle parsed as JSON but violated the witness contract.
    #[error("malformed witness bundle: {0}")]
    MalformedInput(String),

    /// The bundle is not valid JSON.
    #[error("witness bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A declared state root has no backing node in the witness.
    #[error("state root 0x{0:x} is not covered by the witnessed nodes")]
    MissingStateRoot(H256),

    /// The diff met a leaf whose hashed key was never named by an access
    /// list.
    #[error("no preimage recorded for digest 0x{0:x}")]
    MissingPreimage(H256),

    /// A storage write was requested against an account the state trie does
    /// not hold.
    #[error("storage write against absent account 0x{0:x}")]
    StorageWithoutAccount(Address),

    /// An account record or storage slot payload failed to RLP-decode.
    #[error("undecodable account or slot payload: {0}")]
    MalformedValue(rlp::DecoderError),
}

impl From<InvariantViolation> for StateError {
    fn from(violation: InvariantViolation) -> Self {
        StateError::Trie(violation.into())
    }
}

impl StateError {
    /// The invariant sub-kind, when this error wraps one. Lets tests and
    /// callers discriminate without matching through the trie layer.
    pub fn as_invariant(&self) -> Option<&InvariantViolation> {
        match self {
            StateError::Trie(TrieError::Invariant(violation)) => Some(violation),
            _ => None,
        }
    }
}
