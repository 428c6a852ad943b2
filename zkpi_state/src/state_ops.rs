//! Typed account and storage operations over the main state trie.
//!
//! These compose the raw mutation core: storage writes re-root the owning
//! account, account writes land under `keccak(address)`, and every operation
//! returns the new state root instead of mutating one in place.

use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;
use log::trace;

use partial_mpt::{
    nibbles::Nibbles,
    query,
    store::{NodeStore, EMPTY_TRIE_HASH},
    trie_ops,
};

use crate::{
    account::Account,
    error::{StateError, StateResult},
};

/// Path of an account leaf in the state trie.
pub(crate) fn account_path(address: Address) -> Nibbles {
    Nibbles::from_h256(keccak(address))
}

/// Path of a slot leaf in a storage trie.
pub(crate) fn slot_path(key: H256) -> Nibbles {
    Nibbles::from_h256(keccak(key))
}

/// Reads the account stored at `address`; `Ok(None)` is an exclusion proof.
pub fn get_account(
    store: &NodeStore,
    state_root: H256,
    address: Address,
) -> StateResult<Option<Account>> {
    query::resolve(store, state_root, &account_path(address))?
        .map(|bytes| rlp::decode(&bytes).map_err(StateError::MalformedValue))
        .transpose()
}

/// The storage root of `address`; [`EMPTY_TRIE_HASH`] when the account is
/// proven absent.
pub fn get_storage_root(
    store: &NodeStore,
    state_root: H256,
    address: Address,
) -> StateResult<H256> {
    Ok(get_account(store, state_root, address)?
        .map_or(EMPTY_TRIE_HASH, |account| account.storage_root))
}

/// Reads one storage slot; exclusions and absent accounts read as zero.
pub fn get_storage(
    store: &NodeStore,
    state_root: H256,
    address: Address,
    key: H256,
) -> StateResult<U256> {
    let storage_root = get_storage_root(store, state_root, address)?;
    Ok(query::resolve(store, storage_root, &slot_path(key))?
        .map(|bytes| rlp::decode(&bytes).map_err(StateError::MalformedValue))
        .transpose()?
        .unwrap_or_default())
}

/// Upserts `account` under `keccak(address)`, recording its bytecode in the
/// code store, and returns the new state root.
pub fn upsert_account(
    store: &mut NodeStore,
    state_root: H256,
    address: Address,
    account: &Account,
) -> StateResult<H256> {
    trace!("upserting account 0x{address:x}");
    if !account.code.is_empty() {
        store.insert_code(account.code.to_vec());
    }
    let encoded = rlp::encode(account).to_vec();
    Ok(trie_ops::upsert(store, state_root, &account_path(address), encoded)?)
}

/// Removes the account leaf of `address`; a no-op on absent accounts.
pub fn delete_account(
    store: &mut NodeStore,
    state_root: H256,
    address: Address,
) -> StateResult<H256> {
    trace!("deleting account 0x{address:x}");
    Ok(trie_ops::delete(store, state_root, &account_path(address))?)
}

/// Writes `value` into `address`'s storage trie and re-roots the account
/// record, returning the new state root. Zero erases the slot.
///
/// Storage cannot exist without an account to carry its root: writing against
/// an absent account is [`StateError::StorageWithoutAccount`].
pub fn upsert_storage_slot(
    store: &mut NodeStore,
    state_root: H256,
    address: Address,
    key: H256,
    value: U256,
) -> StateResult<H256> {
    let mut account = get_account(store, state_root, address)?
        .ok_or(StateError::StorageWithoutAccount(address))?;

    trace!("writing slot 0x{key:x} = {value} under 0x{address:x}");
    let path = slot_path(key);
    account.storage_root = match value.is_zero() {
        true => trie_ops::delete(store, account.storage_root, &path)?,
        false => {
            let encoded = rlp::encode(&value).to_vec();
            trie_ops::upsert(store, account.storage_root, &path, encoded)?
        }
    };

    let encoded = rlp::encode(&account).to_vec();
    Ok(trie_ops::upsert(store, state_root, &account_path(address), encoded)?)
}

/// Erases a slot; equivalent to writing zero.
pub fn delete_storage_slot(
    store: &mut NodeStore,
    state_root: H256,
    address: Address,
    key: H256,
) -> StateResult<H256> {
    upsert_storage_slot(store, state_root, address, key, U256::zero())
}
