//! Lockstep diffing of two witnessed state tries.
//!
//! The walker descends both roots in parallel, dispatching on the pair of
//! node shapes it meets. Subtrees with equal references are skipped without
//! resolution; a hash reference the witness does not back makes its side
//! *opaque*, and nothing under an opaque side is ever reported: a partial
//! witness only vouches for the paths it covers.
//!
//! Account-leaf changes feed a second, identical walk over the two storage
//! roots of the affected account. Output ordering is the verifier contract
//! from [`crate::ordering`].

use std::fmt::{self, Display};

use ethereum_types::{Address, H256, U256};
use log::trace;
use serde::Serialize;

use partial_mpt::{
    error::InvariantViolation,
    nibbles::{Nibble, Nibbles},
    node::{Node, NodeRef},
    store::{NodeStore, EMPTY_TRIE_HASH},
};

use crate::{
    account::Account,
    error::{StateError, StateResult},
    ordering::{account_order_key, storage_order_key},
    preimages::PreimageDirectory,
};

/// A changed account between two state roots. `None` denotes non-existence,
/// which includes the empty-account sentinel on the post side.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AccountDiffEntry {
    /// The affected address.
    pub address: Address,
    /// The account before the block.
    pub prev: Option<Account>,
    /// The account after the block.
    pub new: Option<Account>,
}

/// A changed storage slot. Erased slots report `new = 0`; zero is never an
/// explicit trie value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct StorageDiffEntry {
    /// The owning address.
    pub address: Address,
    /// The slot key (the preimage, not its hash).
    pub key: H256,
    /// Value before the block; zero when the slot did not exist.
    pub prev: U256,
    /// Value after the block; zero when the slot was erased.
    pub new: U256,
}

/// The ordered output of a trie diff.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StateDiff {
    /// Account entries, ascending by address-as-little-endian integer.
    pub accounts: Vec<AccountDiffEntry>,
    /// Storage entries, ascending by their Poseidon ordering key.
    pub storage: Vec<StorageDiffEntry>,
}

impl StateDiff {
    /// Whether the diff reports no changes at all.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty()
    }
}

impl Display for AccountDiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |side: &Option<Account>| match side {
            Some(account) => format!(
                "(nonce {}, balance {}, code 0x{:x})",
                account.nonce, account.balance, account.code_hash
            ),
            None => "absent".into(),
        };
        write!(
            f,
            "account 0x{:x}: {} -> {}",
            self.address,
            render(&self.prev),
            render(&self.new)
        )
    }
}

impl Display for StorageDiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "storage 0x{:x}[0x{:x}]: {} -> {}",
            self.address, self.key, self.prev, self.new
        )
    }
}

/// Computes the ordered state diff between two roots.
pub fn state_diff(
    store: &NodeStore,
    preimages: &PreimageDirectory,
    pre_root: H256,
    post_root: H256,
) -> StateResult<StateDiff> {
    if pre_root == post_root {
        return Ok(StateDiff::default());
    }

    let mut accounts: Vec<AccountDiffEntry> = Vec::new();
    let mut storage: Vec<StorageDiffEntry> = Vec::new();

    let left = root_side(store, pre_root)?;
    let right = root_side(store, post_root)?;

    let mut emit = |path: Nibbles,
                    prev: Option<Vec<u8>>,
                    new: Option<Vec<u8>>|
     -> StateResult<()> {
        let digest = path
            .to_h256()
            .ok_or_else(|| InvariantViolation::InvalidFullPath(path.clone()))?;
        let address = preimages.require_address(digest)?;
        trace!("account diff at 0x{address:x}");

        let prev_account = decode_account(prev.as_deref())?;
        let new_account = decode_account(new.as_deref())?;

        if prev_account.as_ref().is_some_and(Account::is_empty) {
            return Err(InvariantViolation::LeftLeafEmptyAccount(path).into());
        }

        let pre_storage = prev_account
            .as_ref()
            .map_or(EMPTY_TRIE_HASH, |account| account.storage_root);
        let post_storage = new_account
            .as_ref()
            .map_or(EMPTY_TRIE_HASH, |account| account.storage_root);
        if pre_storage != post_storage {
            storage_subtrie_diff(store, preimages, address, pre_storage, post_storage, &mut storage)?;
        }

        // The empty account is an erasure, not a value.
        let new_account = new_account.filter(|account| !account.is_empty());

        accounts.push(AccountDiffEntry {
            address,
            prev: prev_account,
            new: new_account,
        });
        Ok(())
    };
    diff_sides(store, left, right, Nibbles::default(), &mut emit)?;

    accounts.sort_by_key(|entry| account_order_key(entry.address));
    // Poseidon is not free; hash each entry once.
    storage.sort_by_cached_key(|entry| storage_order_key(entry.address, entry.key));

    Ok(StateDiff { accounts, storage })
}

fn decode_account(bytes: Option<&[u8]>) -> StateResult<Option<Account>> {
    bytes
        .map(|bytes| rlp::decode(bytes).map_err(StateError::MalformedValue))
        .transpose()
}

fn decode_slot(bytes: Option<&[u8]>) -> StateResult<Option<U256>> {
    bytes
        .map(|bytes| rlp::decode(bytes).map_err(StateError::MalformedValue))
        .transpose()
}

/// Walks the storage tries of one account, appending per-slot entries.
fn storage_subtrie_diff(
    store: &NodeStore,
    preimages: &PreimageDirectory,
    address: Address,
    pre_root: H256,
    post_root: H256,
    out: &mut Vec<StorageDiffEntry>,
) -> StateResult<()> {
    if pre_root == post_root {
        return Ok(());
    }

    // Storage roots come out of account records; one the witness does not
    // cover is opaque and contributes nothing, exactly like any other
    // unwitnessed subtree.
    let left = storage_root_side(store, pre_root)?;
    let right = storage_root_side(store, post_root)?;

    let mut emit = |path: Nibbles,
                    prev: Option<Vec<u8>>,
                    new: Option<Vec<u8>>|
     -> StateResult<()> {
        let digest = path
            .to_h256()
            .ok_or_else(|| InvariantViolation::InvalidFullPath(path.clone()))?;
        let key = preimages.require_storage_key(digest)?;

        let prev_value = decode_slot(prev.as_deref())?;
        let new_value = decode_slot(new.as_deref())?;
        if prev_value.is_some_and(|value| value.is_zero()) {
            return Err(InvariantViolation::LeftNodeZero(path).into());
        }
        if new_value.is_some_and(|value| value.is_zero()) {
            return Err(InvariantViolation::RightNodeZero(path).into());
        }

        out.push(StorageDiffEntry {
            address,
            key,
            prev: prev_value.unwrap_or_default(),
            new: new_value.unwrap_or_default(),
        });
        Ok(())
    };
    diff_sides(store, left, right, Nibbles::default(), &mut emit)
}

/// One side of a lockstep descent.
enum Side {
    /// Provably nothing here.
    Absent,
    /// A hash reference the witness does not back; nothing under it may be
    /// reported.
    Opaque,
    /// A resolved node.
    Node(Node),
}

fn root_side(store: &NodeStore, root: H256) -> StateResult<Side> {
    match root == EMPTY_TRIE_HASH {
        true => Ok(Side::Absent),
        false => Ok(Side::Node(store.node(root)?)),
    }
}

fn storage_root_side(store: &NodeStore, root: H256) -> StateResult<Side> {
    if root == EMPTY_TRIE_HASH {
        return Ok(Side::Absent);
    }
    match store.contains_node(root) {
        true => Ok(Side::Node(store.node(root)?)),
        false => Ok(Side::Opaque),
    }
}

fn side_of_ref(store: &NodeStore, child: &NodeRef) -> StateResult<Side> {
    Ok(match child {
        NodeRef::Empty => Side::Absent,
        NodeRef::Hash(digest) => match store.contains_node(*digest) {
            true => Side::Node(store.node(*digest)?),
            false => Side::Opaque,
        },
        NodeRef::Embedded(raw) => Side::Node(Node::decode(raw)?),
    })
}

/// Pairs two child references, skipping resolution entirely when they are
/// identical (equal digests, equal inlined bytes, or both empty).
fn diff_refs<F>(
    store: &NodeStore,
    left: &NodeRef,
    right: &NodeRef,
    path: Nibbles,
    emit: &mut F,
) -> StateResult<()>
where
    F: FnMut(Nibbles, Option<Vec<u8>>, Option<Vec<u8>>) -> StateResult<()>,
{
    if left == right {
        return Ok(());
    }
    let left = side_of_ref(store, left)?;
    let right = side_of_ref(store, right)?;
    diff_sides(store, left, right, path, emit)
}

fn diff_sides<F>(
    store: &NodeStore,
    left: Side,
    right: Side,
    path: Nibbles,
    emit: &mut F,
) -> StateResult<()>
where
    F: FnMut(Nibbles, Option<Vec<u8>>, Option<Vec<u8>>) -> StateResult<()>,
{
    match (left, right) {
        (Side::Opaque, _) | (_, Side::Opaque) => Ok(()),
        (Side::Absent, Side::Absent) => Ok(()),
        (Side::Absent, Side::Node(node)) => emit_subtree(store, node, path, Direction::Right, emit),
        (Side::Node(node), Side::Absent) => emit_subtree(store, node, path, Direction::Left, emit),
        (Side::Node(left), Side::Node(right)) => diff_nodes(store, left, right, path, emit),
    }
}

fn diff_nodes<F>(
    store: &NodeStore,
    left: Node,
    right: Node,
    path: Nibbles,
    emit: &mut F,
) -> StateResult<()>
where
    F: FnMut(Nibbles, Option<Vec<u8>>, Option<Vec<u8>>) -> StateResult<()>,
{
    reject_branch_value(&left, &path)?;
    reject_branch_value(&right, &path)?;

    match (left, right) {
        (
            Node::Leaf {
                key: left_key,
                value: left_value,
            },
            Node::Leaf {
                key: right_key,
                value: right_value,
            },
        ) => {
            if left_key == right_key {
                if left_value != right_value {
                    emit(path.join(&left_key), Some(left_value), Some(right_value))?;
                }
                return Ok(());
            }
            // Different tails at the same position: one leaf went away, the
            // other appeared.
            emit(path.join(&left_key), Some(left_value), None)?;
            emit(path.join(&right_key), None, Some(right_value))
        }

        (Node::Leaf { .. }, Node::Extension { .. })
        | (Node::Extension { .. }, Node::Leaf { .. }) => {
            Err(InvariantViolation::InvalidParent(path).into())
        }

        (
            Node::Leaf { key, value },
            Node::Branch { children, .. },
        ) => {
            let leaf_nibble = leaf_head(&key, &path)?;
            for (idx, child) in children.iter().enumerate() {
                let left = match idx == leaf_nibble as usize {
                    true => Side::Node(Node::Leaf {
                        key: key.slice_from(1),
                        value: value.clone(),
                    }),
                    false => Side::Absent,
                };
                let right = side_of_ref(store, child)?;
                diff_sides(store, left, right, path.pushed(idx as Nibble), emit)?;
            }
            Ok(())
        }

        (
            Node::Branch { children, .. },
            Node::Leaf { key, value },
        ) => {
            let leaf_nibble = leaf_head(&key, &path)?;
            for (idx, child) in children.iter().enumerate() {
                let right = match idx == leaf_nibble as usize {
                    true => Side::Node(Node::Leaf {
                        key: key.slice_from(1),
                        value: value.clone(),
                    }),
                    false => Side::Absent,
                };
                let left = side_of_ref(store, child)?;
                diff_sides(store, left, right, path.pushed(idx as Nibble), emit)?;
            }
            Ok(())
        }

        (
            Node::Extension {
                segment: left_segment,
                child: left_child,
            },
            Node::Extension {
                segment: right_segment,
                child: right_child,
            },
        ) => {
            if left_segment == right_segment {
                let path = path.join(&left_segment);
                return diff_refs(store, &left_child, &right_child, path, emit);
            }

            let common = left_segment.common_prefix_len(&right_segment);
            if common == left_segment.len() {
                // The left segment is a strict prefix: descend it and keep
                // the right side's tail as a shorter extension.
                let path = path.join(&left_segment);
                let left = side_of_ref(store, &left_child)?;
                let right = Side::Node(Node::Extension {
                    segment: right_segment.slice_from(common),
                    child: right_child,
                });
                return diff_sides(store, left, right, path, emit);
            }
            if common == right_segment.len() {
                let path = path.join(&right_segment);
                let left = Side::Node(Node::Extension {
                    segment: left_segment.slice_from(common),
                    child: left_child,
                });
                let right = side_of_ref(store, &right_child)?;
                return diff_sides(store, left, right, path, emit);
            }

            // Divergent segments: the two subtrees share nothing below here.
            emit_subtree(
                store,
                Node::Extension {
                    segment: left_segment,
                    child: left_child,
                },
                path.clone(),
                Direction::Left,
                emit,
            )?;
            emit_subtree(
                store,
                Node::Extension {
                    segment: right_segment,
                    child: right_child,
                },
                path,
                Direction::Right,
                emit,
            )
        }

        (
            Node::Extension { segment, child },
            Node::Branch { children, .. },
        ) => {
            let head = segment.at(0);
            for (idx, branch_child) in children.iter().enumerate() {
                let left = match idx == head as usize {
                    true => extension_tail_side(store, &segment, &child)?,
                    false => Side::Absent,
                };
                let right = side_of_ref(store, branch_child)?;
                diff_sides(store, left, right, path.pushed(idx as Nibble), emit)?;
            }
            Ok(())
        }

        (
            Node::Branch { children, .. },
            Node::Extension { segment, child },
        ) => {
            let head = segment.at(0);
            for (idx, branch_child) in children.iter().enumerate() {
                let right = match idx == head as usize {
                    true => extension_tail_side(store, &segment, &child)?,
                    false => Side::Absent,
                };
                let left = side_of_ref(store, branch_child)?;
                diff_sides(store, left, right, path.pushed(idx as Nibble), emit)?;
            }
            Ok(())
        }

        (
            Node::Branch {
                children: left_children,
                ..
            },
            Node::Branch {
                children: right_children,
                ..
            },
        ) => {
            for idx in 0..16 {
                diff_refs(
                    store,
                    &left_children[idx],
                    &right_children[idx],
                    path.pushed(idx as Nibble),
                    emit,
                )?;
            }
            Ok(())
        }
    }
}

/// What an extension looks like one nibble further down: its child when the
/// segment is spent, a shortened extension otherwise.
fn extension_tail_side(
    store: &NodeStore,
    segment: &Nibbles,
    child: &NodeRef,
) -> StateResult<Side> {
    match segment.len() == 1 {
        true => side_of_ref(store, child),
        false => Ok(Side::Node(Node::Extension {
            segment: segment.slice_from(1),
            child: child.clone(),
        })),
    }
}

fn leaf_head(key: &Nibbles, path: &Nibbles) -> StateResult<Nibble> {
    key.first()
        .ok_or_else(|| InvariantViolation::InvalidFullPath(path.clone()).into())
}

fn reject_branch_value(node: &Node, path: &Nibbles) -> StateResult<()> {
    match node {
        Node::Branch { value, .. } if !value.is_empty() => {
            Err(InvariantViolation::NonEmptyBytesValue(path.clone()).into())
        }
        _ => Ok(()),
    }
}

/// Which side of the diff a one-sided subtree belongs to.
#[derive(Clone, Copy)]
enum Direction {
    /// Pre-state only: every leaf is a deletion.
    Left,
    /// Post-state only: every leaf is an insertion.
    Right,
}

/// Reports every witnessed leaf under `node` as one-sided.
fn emit_subtree<F>(
    store: &NodeStore,
    node: Node,
    path: Nibbles,
    direction: Direction,
    emit: &mut F,
) -> StateResult<()>
where
    F: FnMut(Nibbles, Option<Vec<u8>>, Option<Vec<u8>>) -> StateResult<()>,
{
    reject_branch_value(&node, &path)?;

    match node {
        Node::Leaf { key, value } => {
            let path = path.join(&key);
            match direction {
                Direction::Left => emit(path, Some(value), None),
                Direction::Right => emit(path, None, Some(value)),
            }
        }
        Node::Extension { segment, child } => {
            let path = path.join(&segment);
            match side_of_ref(store, &child)? {
                Side::Node(subnode) => emit_subtree(store, subnode, path, direction, emit),
                Side::Absent | Side::Opaque => Ok(()),
            }
        }
        Node::Branch { children, .. } => {
            for (idx, child) in children.iter().enumerate() {
                match side_of_ref(store, child)? {
                    Side::Node(subnode) => emit_subtree(
                        store,
                        subnode,
                        path.pushed(idx as Nibble),
                        direction,
                        emit,
                    )?,
                    Side::Absent | Side::Opaque => (),
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use ethereum_types::{Address, H256, U256};
    use keccak_hash::keccak;

    use super::state_diff;
    use crate::{
        account::Account,
        error::InvariantViolation,
        preimages::PreimageDirectory,
        state_ops::{upsert_account, upsert_storage_slot},
    };
    use partial_mpt::{
        nibbles::Nibbles,
        node::{Node, NodeRef},
        store::{NodeStore, EMPTY_TRIE_HASH},
    };

    fn directory_for(addresses: &[Address], keys: &[H256]) -> PreimageDirectory {
        let mut directory = PreimageDirectory::default();
        for address in addresses {
            directory.record_address(*address);
        }
        for key in keys {
            directory.record_storage_key(*key);
        }
        directory
    }

    fn account(nonce: u64, balance: u64) -> Account {
        let mut account = Account::empty();
        account.nonce = U256::from(nonce);
        account.balance = U256::from(balance);
        account
    }

    #[test]
    fn identical_roots_diff_to_nothing() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let root =
            upsert_account(&mut store, EMPTY_TRIE_HASH, address, &account(0, 100)).unwrap();

        let diff = state_diff(&store, &directory_for(&[address], &[]), root, root).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn single_account_change_yields_one_entry() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let bystander = Address::repeat_byte(0x77);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut store, pre, address, &account(0, 100)).unwrap();
        pre = upsert_account(&mut store, pre, bystander, &account(9, 9)).unwrap();
        let post = upsert_account(&mut store, pre, address, &account(1, 90)).unwrap();

        let diff = state_diff(
            &store,
            &directory_for(&[address, bystander], &[]),
            pre,
            post,
        )
        .unwrap();

        assert_eq!(diff.accounts.len(), 1);
        assert!(diff.storage.is_empty());
        let entry = &diff.accounts[0];
        assert_eq!(entry.address, address);
        assert_eq!(entry.prev.as_ref().unwrap().balance, U256::from(100));
        assert_eq!(entry.new.as_ref().unwrap().nonce, U256::one());
        assert_eq!(entry.new.as_ref().unwrap().balance, U256::from(90));
    }

    #[test]
    fn insertions_and_deletions_have_one_absent_side() {
        let mut store = NodeStore::new();
        let old = Address::repeat_byte(0x11);
        let incoming = Address::repeat_byte(0x22);
        let keeper = Address::repeat_byte(0x33);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut store, pre, old, &account(1, 5)).unwrap();
        pre = upsert_account(&mut store, pre, keeper, &account(2, 6)).unwrap();

        let mut post = pre;
        post = upsert_account(&mut store, post, incoming, &account(0, 7)).unwrap();
        post = crate::state_ops::delete_account(&mut store, post, old).unwrap();

        let diff = state_diff(
            &store,
            &directory_for(&[old, incoming, keeper], &[]),
            pre,
            post,
        )
        .unwrap();

        assert_eq!(diff.accounts.len(), 2);
        for entry in &diff.accounts {
            if entry.address == old {
                assert!(entry.prev.is_some() && entry.new.is_none());
            } else {
                assert_eq!(entry.address, incoming);
                assert!(entry.prev.is_none() && entry.new.is_some());
            }
        }
    }

    #[test]
    fn storage_changes_ride_on_account_changes() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let slot_a = H256::from_low_u64_be(1);
        let slot_b = H256::from_low_u64_be(2);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut store, pre, address, &account(0, 100)).unwrap();
        pre = upsert_storage_slot(&mut store, pre, address, slot_a, U256::from(10)).unwrap();

        let mut post = pre;
        post = upsert_storage_slot(&mut store, post, address, slot_a, U256::from(20)).unwrap();
        post = upsert_storage_slot(&mut store, post, address, slot_b, U256::from(30)).unwrap();

        let diff = state_diff(
            &store,
            &directory_for(&[address], &[slot_a, slot_b]),
            pre,
            post,
        )
        .unwrap();

        assert_eq!(diff.accounts.len(), 1);
        assert_eq!(diff.storage.len(), 2);
        for entry in &diff.storage {
            assert_eq!(entry.address, address);
            if entry.key == slot_a {
                assert_eq!((entry.prev, entry.new), (U256::from(10), U256::from(20)));
            } else {
                assert_eq!(entry.key, slot_b);
                assert_eq!((entry.prev, entry.new), (U256::zero(), U256::from(30)));
            }
        }
    }

    #[test]
    fn erased_slots_report_zero() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let slot = H256::from_low_u64_be(1);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut store, pre, address, &account(0, 100)).unwrap();
        pre = upsert_storage_slot(&mut store, pre, address, slot, U256::from(10)).unwrap();
        let post = crate::state_ops::delete_storage_slot(&mut store, pre, address, slot).unwrap();

        let diff = state_diff(&store, &directory_for(&[address], &[slot]), pre, post).unwrap();

        assert_eq!(diff.storage.len(), 1);
        assert_eq!(diff.storage[0].prev, U256::from(10));
        assert_eq!(diff.storage[0].new, U256::zero());
    }

    #[test]
    fn post_side_empty_account_erases() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let bystander = Address::repeat_byte(0x44);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut store, pre, address, &account(0, 100)).unwrap();
        pre = upsert_account(&mut store, pre, bystander, &account(1, 1)).unwrap();
        let post = upsert_account(&mut store, pre, address, &Account::empty()).unwrap();

        let diff = state_diff(
            &store,
            &directory_for(&[address, bystander], &[]),
            pre,
            post,
        )
        .unwrap();

        assert_eq!(diff.accounts.len(), 1);
        assert!(diff.accounts[0].prev.is_some());
        assert_eq!(diff.accounts[0].new, None);
    }

    #[test]
    fn pre_side_empty_account_is_an_invariant_violation() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);

        let pre =
            upsert_account(&mut store, EMPTY_TRIE_HASH, address, &Account::empty()).unwrap();
        let post = upsert_account(&mut store, pre, address, &account(1, 1)).unwrap();

        let err = state_diff(&store, &directory_for(&[address], &[]), pre, post).unwrap_err();
        assert!(matches!(
            err.as_invariant(),
            Some(InvariantViolation::LeftLeafEmptyAccount(_))
        ));
    }

    #[test]
    fn nonempty_branch_value_is_an_invariant_violation() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);
        let pre =
            upsert_account(&mut store, EMPTY_TRIE_HASH, address, &account(0, 1)).unwrap();

        // A hostile post-trie: a root branch carrying a value.
        let mut children: [NodeRef; 16] = Default::default();
        children[0] = store.commit(&Node::Leaf {
            key: Nibbles::from_h256(H256::repeat_byte(0x01)).slice_from(1),
            value: vec![0x01; 33],
        });
        children[1] = store.commit(&Node::Leaf {
            key: Nibbles::from_h256(H256::repeat_byte(0x12)).slice_from(1),
            value: vec![0x02; 33],
        });
        let post = store.commit_root(&Node::Branch {
            children,
            value: vec![0x2a],
        });

        let err = state_diff(&store, &directory_for(&[address], &[]), pre, post).unwrap_err();
        assert!(matches!(
            err.as_invariant(),
            Some(InvariantViolation::NonEmptyBytesValue(_))
        ));
    }

    #[test]
    fn missing_account_preimage_is_fatal() {
        let mut store = NodeStore::new();
        let address = Address::repeat_byte(0x11);

        let pre = EMPTY_TRIE_HASH;
        let post = upsert_account(&mut store, pre, address, &account(0, 1)).unwrap();

        let err = state_diff(&store, &PreimageDirectory::default(), pre, post).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StateError::MissingPreimage(digest) if digest == keccak(address)
        ));
    }

    #[test]
    fn unwitnessed_siblings_are_skipped_not_fatal() {
        let mut full = NodeStore::new();
        let changed = Address::repeat_byte(0x11);
        let untouched = Address::repeat_byte(0x99);

        let mut pre = EMPTY_TRIE_HASH;
        pre = upsert_account(&mut full, pre, changed, &account(0, 100)).unwrap();
        pre = upsert_account(&mut full, pre, untouched, &account(5, 5)).unwrap();
        let post = upsert_account(&mut full, pre, changed, &account(1, 90)).unwrap();

        // Rebuild the witness without the untouched account's leaf node.
        let untouched_value = rlp::encode(&account(5, 5)).to_vec();
        let leaf_digest = full
            .nodes()
            .find_map(|(digest, bytes)| match Node::decode(bytes) {
                Ok(Node::Leaf { value, .. }) if value == untouched_value => Some(*digest),
                _ => None,
            })
            .expect("untouched account leaf should be a hashed store entry");
        let mut partial = NodeStore::new();
        for (digest, bytes) in full.nodes() {
            if *digest != leaf_digest {
                partial.insert_node(bytes.to_vec());
            }
        }

        // Both sides reference the same unwitnessed digest: the equal-hash
        // shortcut skips it before resolution.
        let diff = state_diff(
            &partial,
            &directory_for(&[changed, untouched], &[]),
            pre,
            post,
        )
        .unwrap();
        assert_eq!(diff.accounts.len(), 1);
        assert_eq!(diff.accounts[0].address, changed);

        // Against the empty root there is no equal reference to hide behind:
        // the unwitnessed subtree is opaque and only covered leaves report.
        let insertions = state_diff(
            &partial,
            &directory_for(&[changed, untouched], &[]),
            EMPTY_TRIE_HASH,
            pre,
        )
        .unwrap();
        assert_eq!(insertions.accounts.len(), 1);
        assert_eq!(insertions.accounts[0].address, changed);
        assert!(insertions.accounts[0].prev.is_none());
    }

    #[test]
    fn diff_against_the_empty_root_enumerates_every_witnessed_leaf() {
        let mut store = NodeStore::new();
        let a = Address::repeat_byte(0x11);
        let b = Address::repeat_byte(0x22);

        let mut post = EMPTY_TRIE_HASH;
        post = upsert_account(&mut store, post, a, &account(0, 1)).unwrap();
        post = upsert_account(&mut store, post, b, &account(0, 2)).unwrap();

        let diff = state_diff(
            &store,
            &directory_for(&[a, b], &[]),
            EMPTY_TRIE_HASH,
            post,
        )
        .unwrap();
        assert_eq!(diff.accounts.len(), 2);
        assert!(diff.accounts.iter().all(|entry| entry.prev.is_none()));

        let reversed = state_diff(
            &store,
            &directory_for(&[a, b], &[]),
            post,
            EMPTY_TRIE_HASH,
        )
        .unwrap();
        assert_eq!(reversed.accounts.len(), 2);
        assert!(reversed.accounts.iter().all(|entry| entry.new.is_none()));
    }

    #[test]
    fn output_ordering_is_the_verifier_contract() {
        use crate::ordering::{account_order_key, storage_order_key};

        let mut store = NodeStore::new();
        let addresses: Vec<Address> = (1..=8u8).map(Address::repeat_byte).collect();
        let keys: Vec<H256> = (1..=6u64).map(H256::from_low_u64_be).collect();

        let mut pre = EMPTY_TRIE_HASH;
        for address in &addresses {
            pre = upsert_account(&mut store, pre, *address, &account(0, 1)).unwrap();
        }
        let mut post = pre;
        for (idx, address) in addresses.iter().enumerate() {
            post = upsert_account(&mut store, post, *address, &account(1, 2 + idx as u64))
                .unwrap();
        }
        for key in &keys {
            post = upsert_storage_slot(&mut store, post, addresses[0], *key, U256::from(9))
                .unwrap();
            post = upsert_storage_slot(&mut store, post, addresses[3], *key, U256::from(7))
                .unwrap();
        }

        let diff = state_diff(&store, &directory_for(&addresses, &keys), pre, post).unwrap();

        let account_keys: Vec<_> = diff
            .accounts
            .iter()
            .map(|entry| account_order_key(entry.address))
            .collect();
        assert!(account_keys.windows(2).all(|pair| pair[0] < pair[1]));

        let storage_keys: Vec<_> = diff
            .storage
            .iter()
            .map(|entry| storage_order_key(entry.address, entry.key))
            .collect();
        assert!(storage_keys.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(diff.storage.len(), addresses.len().min(2) * keys.len());
    }
}
