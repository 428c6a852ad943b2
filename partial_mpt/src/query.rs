//! Read-side traversal of witnessed tries.

use ethereum_types::H256;
use log::trace;

use crate::{
    error::TrieResult,
    nibbles::Nibbles,
    node::Node,
    store::{NodeStore, EMPTY_TRIE_HASH},
};

/// Walks the trie rooted at `root` along `path`.
///
/// Returns the leaf value when the path is present and `Ok(None)` when the
/// trie structure proves the path absent (an exclusion proof: the leaf's key
/// mismatches, an extension diverges, or a branch slot is empty). A hash
/// reference without backing bytes on the walked path is
/// [`MissingNode`](crate::error::TrieError::MissingNode): the witness is
/// broken, not the key absent.
pub fn resolve(store: &NodeStore, root: H256, path: &Nibbles) -> TrieResult<Option<Vec<u8>>> {
    if root == EMPTY_TRIE_HASH {
        return Ok(None);
    }

    let mut node = store.node(root)?;
    let mut remaining = path.clone();

    loop {
        match node {
            Node::Leaf { key, value } => {
                return match key == remaining {
                    true => Ok(Some(value)),
                    false => {
                        trace!("exclusion: leaf key {key} mismatches remaining path {remaining}");
                        Ok(None)
                    }
                }
            }
            Node::Extension { segment, child } => {
                if !remaining.has_prefix(&segment) {
                    trace!("exclusion: extension {segment} diverges from remaining path {remaining}");
                    return Ok(None);
                }
                remaining = remaining.slice_from(segment.len());
                node = store.resolve_existing(&child)?;
            }
            Node::Branch { children, .. } => {
                let nibble = match remaining.first() {
                    Some(nibble) => nibble,
                    None => {
                        trace!("exclusion: path exhausted at a branch");
                        return Ok(None);
                    }
                };
                match store.resolve(&children[nibble as usize])? {
                    Some(subnode) => {
                        trace!("descending branch nibble {nibble:x}");
                        remaining = remaining.slice_from(1);
                        node = subnode;
                    }
                    None => {
                        trace!("exclusion: branch slot {nibble:x} is empty");
                        return Ok(None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use keccak_hash::keccak;

    use super::resolve;
    use crate::{
        error::TrieError,
        nibbles::Nibbles,
        node::{Node, NodeRef},
        store::{NodeStore, EMPTY_TRIE_HASH},
        testing_utils::common_setup,
        trie_ops::upsert,
    };

    fn nibs(s: &str) -> Nibbles {
        Nibbles::from_str(s).unwrap()
    }

    #[test]
    fn empty_root_resolves_to_none() {
        common_setup();
        let store = NodeStore::new();
        assert_eq!(
            resolve(&store, EMPTY_TRIE_HASH, &nibs("0x1234")),
            Ok(None)
        );
    }

    #[test]
    fn single_leaf_resolves() {
        common_setup();
        let mut store = NodeStore::new();
        let key = nibs("0x1234");
        let root = upsert(&mut store, EMPTY_TRIE_HASH, &key, vec![0x2a; 33]).unwrap();

        assert_eq!(resolve(&store, root, &key), Ok(Some(vec![0x2a; 33])));
    }

    #[test]
    fn divergent_paths_are_exclusions_not_errors() {
        common_setup();
        let mut store = NodeStore::new();
        let mut root = EMPTY_TRIE_HASH;
        for key in ["0x1234", "0x1256", "0x9999"] {
            root = upsert(&mut store, root, &nibs(key), vec![0x2a; 33]).unwrap();
        }

        // Leaf key mismatch, extension divergence, empty branch slot.
        assert_eq!(resolve(&store, root, &nibs("0x1235")), Ok(None));
        assert_eq!(resolve(&store, root, &nibs("0x1334")), Ok(None));
        assert_eq!(resolve(&store, root, &nibs("0x5678")), Ok(None));
    }

    #[test]
    fn unwitnessed_hash_on_the_path_is_a_missing_node() {
        common_setup();
        let mut full = NodeStore::new();
        let mut root = EMPTY_TRIE_HASH;
        for key in ["0x1234", "0x5678"] {
            root = upsert(&mut full, root, &nibs(key), vec![0x2a; 33]).unwrap();
        }

        // Rebuild a store holding only the root node: both leaves become
        // unresolvable digests.
        let mut partial = NodeStore::new();
        partial.insert_node(full.get_node(root).unwrap().to_vec());
        let leaf_digest = keccak(
            Node::Leaf {
                key: nibs("0x234"),
                value: vec![0x2a; 33],
            }
            .encode(),
        );

        assert_eq!(
            resolve(&partial, root, &nibs("0x1234")),
            Err(TrieError::MissingNode(leaf_digest))
        );
    }

    #[test]
    fn embedded_children_resolve_uniformly() {
        common_setup();
        let mut store = NodeStore::new();
        let mut root = EMPTY_TRIE_HASH;
        // Short values keep the leaves below 32 bytes, so the root branch
        // holds them inline.
        root = upsert(&mut store, root, &nibs("0x12"), vec![0x01]).unwrap();
        root = upsert(&mut store, root, &nibs("0x92"), vec![0x02]).unwrap();

        let root_node = store.node(root).unwrap();
        match &root_node {
            Node::Branch { children, .. } => {
                assert!(matches!(children[0x1], NodeRef::Embedded(_)));
                assert!(matches!(children[0x9], NodeRef::Embedded(_)));
            }
            other => panic!("expected a branch root, got {other:?}"),
        }

        assert_eq!(resolve(&store, root, &nibs("0x12")), Ok(Some(vec![0x01])));
        assert_eq!(resolve(&store, root, &nibs("0x92")), Ok(Some(vec![0x02])));
    }
}
