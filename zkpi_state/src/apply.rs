//! Folding a computed state diff back onto a trie.

use ethereum_types::H256;
use itertools::Itertools;
use log::trace;

use partial_mpt::{store::NodeStore, trie_ops};

use crate::{
    account::Account,
    diff::StateDiff,
    error::StateResult,
    state_ops::{self, slot_path},
};

/// Applies `diff` to the trie rooted at `root`, returning the new root.
///
/// Entries are processed in emission order. For each account the storage
/// updates fold into its storage trie first (zero erases the slot), then the
/// account record itself is deleted (post side absent or empty) or upserted
/// with the recomputed storage root.
pub fn apply_state_diff(
    store: &mut NodeStore,
    root: H256,
    diff: &StateDiff,
) -> StateResult<H256> {
    let mut slots_by_address = diff
        .storage
        .iter()
        .into_group_map_by(|entry| entry.address);

    let mut working_root = root;
    for entry in &diff.accounts {
        trace!("applying {entry}");

        let mut storage_root =
            state_ops::get_storage_root(store, working_root, entry.address)?;
        for slot in slots_by_address.remove(&entry.address).unwrap_or_default() {
            let path = slot_path(slot.key);
            storage_root = match slot.new.is_zero() {
                true => trie_ops::delete(store, storage_root, &path)?,
                false => {
                    let encoded = rlp::encode(&slot.new).to_vec();
                    trie_ops::upsert(store, storage_root, &path, encoded)?
                }
            };
        }

        match entry.new.as_ref().filter(|account| !account.is_empty()) {
            None => {
                working_root =
                    state_ops::delete_account(store, working_root, entry.address)?;
            }
            Some(account) => {
                let account = Account {
                    storage_root,
                    ..account.clone()
                };
                working_root =
                    state_ops::upsert_account(store, working_root, entry.address, &account)?;
            }
        }
    }

    // A storage-root change always changes the owning account record, so
    // every storage entry has an account entry to ride on.
    debug_assert!(slots_by_address.is_empty());

    Ok(working_root)
}
