//! Materialized world-state views over the witnessed tries.

use std::collections::BTreeMap;

use ethereum_types::{Address, H256, U256};
use log::debug;

use partial_mpt::{
    nibbles::{Nibble, Nibbles},
    node::{Node, NodeRef},
    store::{NodeStore, EMPTY_TRIE_HASH},
};

use crate::{
    account::Account,
    diff::StateDiff,
    error::{StateError, StateResult},
    preimages::PreimageDirectory,
};

/// A conventional `address -> account` / `(address, key) -> value` view of a
/// witnessed state trie.
///
/// Only what the witness covers appears here: hash references without backing
/// nodes and leaves whose keys have no recorded preimage are skipped
/// silently. That is the partial-trie contract, not an error.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct World {
    /// Every reachable account, with bytecode attached where the code store
    /// has it.
    pub accounts: BTreeMap<Address, Account>,
    /// Every reachable non-zero storage slot, grouped by owning address.
    pub storage: BTreeMap<Address, BTreeMap<H256, U256>>,
}

impl World {
    /// Walks every reachable leaf under `root` into a map view.
    pub fn materialize(
        store: &NodeStore,
        preimages: &PreimageDirectory,
        root: H256,
    ) -> StateResult<Self> {
        let mut world = World::default();

        let mut account_leaves = Vec::new();
        collect_leaves(store, root, &mut account_leaves)?;

        for (path, payload) in account_leaves {
            let Some(digest) = path.to_h256() else {
                debug!("state leaf at {path} is not a full path; skipping");
                continue;
            };
            let Some(address) = preimages.address(digest) else {
                debug!("no address preimage for state leaf 0x{digest:x}; skipping");
                continue;
            };

            let account: Account =
                rlp::decode(&payload).map_err(StateError::MalformedValue)?;
            let code = store.get_code(account.code_hash).unwrap_or_default();
            let account = account.with_code(code);

            if account.storage_root != EMPTY_TRIE_HASH
                && store.contains_node(account.storage_root)
            {
                let mut slot_leaves = Vec::new();
                collect_leaves(store, account.storage_root, &mut slot_leaves)?;

                let slots = world.storage.entry(address).or_default();
                for (slot_path, slot_payload) in slot_leaves {
                    let Some(key_digest) = slot_path.to_h256() else {
                        debug!("storage leaf at {slot_path} is not a full path; skipping");
                        continue;
                    };
                    let Some(key) = preimages.storage_key(key_digest) else {
                        debug!("no key preimage for storage leaf 0x{key_digest:x}; skipping");
                        continue;
                    };
                    let value: U256 =
                        rlp::decode(&slot_payload).map_err(StateError::MalformedValue)?;
                    slots.insert(key, value);
                }
            }

            world.accounts.insert(address, account);
        }

        world.storage.retain(|_, slots| !slots.is_empty());
        Ok(world)
    }

    /// Folds a computed diff into the view, mirroring what applying it to the
    /// underlying trie would produce.
    pub fn apply_diff(&mut self, diff: &StateDiff) {
        for entry in &diff.accounts {
            match &entry.new {
                Some(account) => {
                    self.accounts.insert(entry.address, account.clone());
                }
                None => {
                    self.accounts.remove(&entry.address);
                    self.storage.remove(&entry.address);
                }
            }
        }
        for slot in &diff.storage {
            let slots = self.storage.entry(slot.address).or_default();
            match slot.new.is_zero() {
                true => {
                    slots.remove(&slot.key);
                }
                false => {
                    slots.insert(slot.key, slot.new);
                }
            }
        }
        self.storage.retain(|_, slots| !slots.is_empty());
    }
}

/// Collects `(path, payload)` for every reachable leaf under `root`,
/// treating unwitnessed digests as absent.
fn collect_leaves(
    store: &NodeStore,
    root: H256,
    out: &mut Vec<(Nibbles, Vec<u8>)>,
) -> StateResult<()> {
    if root == EMPTY_TRIE_HASH || !store.contains_node(root) {
        return Ok(());
    }
    walk(store, store.node(root)?, Nibbles::default(), out)
}

fn walk(
    store: &NodeStore,
    node: Node,
    path: Nibbles,
    out: &mut Vec<(Nibbles, Vec<u8>)>,
) -> StateResult<()> {
    match node {
        Node::Leaf { key, value } => {
            out.push((path.join(&key), value));
            Ok(())
        }
        Node::Extension { segment, child } => {
            match resolve_witnessed(store, &child)? {
                Some(subnode) => walk(store, subnode, path.join(&segment), out),
                None => Ok(()),
            }
        }
        Node::Branch { children, .. } => {
            for (idx, child) in children.iter().enumerate() {
                if let Some(subnode) = resolve_witnessed(store, child)? {
                    walk(store, subnode, path.pushed(idx as Nibble), out)?;
                }
            }
            Ok(())
        }
    }
}

/// Resolves a child reference, reading unwitnessed digests as `None` instead
/// of failing.
fn resolve_witnessed(store: &NodeStore, child: &NodeRef) -> StateResult<Option<Node>> {
    match child {
        NodeRef::Hash(digest) if !store.contains_node(*digest) => Ok(None),
        _ => Ok(store.resolve(child)?),
    }
}
