//! The Ethereum account record as stored in the state trie.

use bytes::Bytes;
use ethereum_types::{H256, U256};
use keccak_hash::keccak;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::Serialize;

use partial_mpt::store::{EMPTY_BYTES_HASH, EMPTY_TRIE_HASH};

/// One account, with its bytecode materialized out-of-band.
///
/// The trie stores only the four consensus fields, in the canonical wire
/// order `(nonce, balance, storage_root, code_hash)`; `code` rides along so a
/// world-state view can hand consumers runnable bytecode, and never
/// serializes.
///
/// Equality ignores `storage_root`, which partial-trie computations cannot
/// reproduce in full, and compares bytecode through its hash.
#[derive(Clone, Debug, Serialize)]
pub struct Account {
    /// Transaction count.
    pub nonce: U256,
    /// Balance in wei.
    pub balance: U256,
    /// Root of the account's storage trie.
    pub storage_root: H256,
    /// Keccak of the account's bytecode.
    pub code_hash: H256,
    /// Materialized bytecode; not part of the RLP encoding.
    #[serde(skip)]
    pub code: Bytes,
}

impl Account {
    /// The `nonce = 0, balance = 0, code = b""` sentinel. Post-Cancun state
    /// tries never store it; writing it means erasing the account.
    pub fn empty() -> Self {
        Self {
            nonce: U256::zero(),
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_HASH,
            code_hash: EMPTY_BYTES_HASH,
            code: Bytes::new(),
        }
    }

    /// Whether this account equals the empty-account sentinel.
    pub fn is_empty(&self) -> bool {
        self.nonce.is_zero() && self.balance.is_zero() && self.code_hash == EMPTY_BYTES_HASH
    }

    /// Attaches materialized bytecode. Non-empty code must hash to
    /// `code_hash`.
    pub fn with_code(mut self, code: Bytes) -> Self {
        debug_assert!(code.is_empty() || keccak(&code) == self.code_hash);
        self.code = code;
        self
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.nonce == other.nonce
            && self.balance == other.balance
            && self.code_hash == other.code_hash
    }
}

impl Eq for Account {}

impl Encodable for Account {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4)
            .append(&self.nonce)
            .append(&self.balance)
            .append(&self.storage_root)
            .append(&self.code_hash);
    }
}

impl Decodable for Account {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            nonce: rlp.val_at(0)?,
            balance: rlp.val_at(1)?,
            storage_root: rlp.val_at(2)?,
            code_hash: rlp.val_at(3)?,
            code: Bytes::new(),
        })
    }
}
