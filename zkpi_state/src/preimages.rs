//! Reverse lookups from hashed trie keys to the addresses and slot keys that
//! produced them.
//!
//! Trie leaves sit under `keccak(address)` and `keccak(storage_key)`; the
//! access lists of the bundle name every address and key a block touches, so
//! inverting the hash is a table lookup. Anything the access lists never
//! named is invisible to the diff engine by construction.

use std::collections::HashMap;

use ethereum_types::{Address, H256};
use keccak_hash::keccak;

use crate::error::{StateError, StateResult};

/// `keccak(address) -> address` and `keccak(storage_key) -> storage_key`.
#[derive(Clone, Debug, Default)]
pub struct PreimageDirectory {
    addresses: HashMap<H256, Address>,
    storage_keys: HashMap<H256, H256>,
}

impl PreimageDirectory {
    /// Records an address under its Keccak digest.
    pub fn record_address(&mut self, address: Address) {
        self.addresses.insert(keccak(address), address);
    }

    /// Records a storage key under its Keccak digest.
    pub fn record_storage_key(&mut self, key: H256) {
        self.storage_keys.insert(keccak(key), key);
    }

    /// The address hashing to `digest`, if the access lists named it.
    pub fn address(&self, digest: H256) -> Option<Address> {
        self.addresses.get(&digest).copied()
    }

    /// The storage key hashing to `digest`, if the access lists named it.
    pub fn storage_key(&self, digest: H256) -> Option<H256> {
        self.storage_keys.get(&digest).copied()
    }

    /// Hard variant of [`Self::address`] for the diff engine, where a missing
    /// preimage means the witness and the access list disagree.
    pub fn require_address(&self, digest: H256) -> StateResult<Address> {
        self.address(digest)
            .ok_or(StateError::MissingPreimage(digest))
    }

    /// Hard variant of [`Self::storage_key`].
    pub fn require_storage_key(&self, digest: H256) -> StateResult<H256> {
        self.storage_key(digest)
            .ok_or(StateError::MissingPreimage(digest))
    }

    /// Number of recorded address preimages.
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }

    /// Number of recorded storage-key preimages.
    pub fn storage_key_count(&self) -> usize {
        self.storage_keys.len()
    }
}
