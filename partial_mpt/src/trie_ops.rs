//! Mutation of witnessed tries: upsert and delete with canonical
//! restructuring.
//!
//! Both operations return a fresh root digest and allocate every rebuilt node
//! into the store; existing nodes are never modified or removed, so old roots
//! stay resolvable for the lifetime of the session.

use ethereum_types::H256;
use log::{trace, warn};

use crate::{
    error::{InvariantViolation, TrieResult},
    nibbles::Nibbles,
    node::{Node, NodeRef},
    store::{NodeStore, EMPTY_TRIE_HASH},
};

/// Inserts or updates `value` at `path`, returning the new root digest.
///
/// Landing with an exhausted path on a branch position (only possible with
/// variable-length keys, which fixed 64-nibble state paths never produce) is
/// [`InvariantViolation::InvalidFullPath`].
pub fn upsert(
    store: &mut NodeStore,
    root: H256,
    path: &Nibbles,
    value: Vec<u8>,
) -> TrieResult<H256> {
    trace!("upserting {} value bytes at {path}", value.len());

    if root == EMPTY_TRIE_HASH {
        let leaf = Node::Leaf {
            key: path.clone(),
            value,
        };
        return Ok(store.commit_root(&leaf));
    }

    let node = store.node(root)?;
    let updated = upsert_rec(store, node, path.clone(), value)?;
    Ok(store.commit_root(&updated))
}

fn upsert_rec(
    store: &mut NodeStore,
    node: Node,
    path: Nibbles,
    value: Vec<u8>,
) -> TrieResult<Node> {
    match node {
        Node::Leaf {
            key,
            value: old_value,
        } => {
            if key == path {
                if old_value == value {
                    trace!("upsert left leaf {key} unchanged");
                }
                return Ok(Node::Leaf { key, value });
            }

            let common = key.common_prefix_len(&path);
            if common == key.len() || common == path.len() {
                return Err(InvariantViolation::InvalidFullPath(path).into());
            }

            let mut children: [NodeRef; 16] = Default::default();
            let existing = Node::Leaf {
                key: key.slice_from(common + 1),
                value: old_value,
            };
            children[key.at(common) as usize] = store.commit(&existing);
            let inserted = Node::Leaf {
                key: path.slice_from(common + 1),
                value,
            };
            children[path.at(common) as usize] = store.commit(&inserted);

            Ok(wrap_in_extension(store, path.prefix(common), children))
        }
        Node::Extension { segment, child } => {
            let common = segment.common_prefix_len(&path);

            if common == segment.len() {
                let subnode = store.resolve_existing(&child)?;
                let updated = upsert_rec(store, subnode, path.slice_from(common), value)?;
                let child = store.commit(&updated);
                return Ok(Node::Extension { segment, child });
            }
            if common == path.len() {
                return Err(InvariantViolation::InvalidFullPath(path).into());
            }

            let mut children: [NodeRef; 16] = Default::default();
            // The existing subtree, re-rooted one nibble below the
            // divergence point.
            children[segment.at(common) as usize] = match common + 1 == segment.len() {
                true => child,
                false => store.commit(&Node::Extension {
                    segment: segment.slice_from(common + 1),
                    child,
                }),
            };
            let inserted = Node::Leaf {
                key: path.slice_from(common + 1),
                value,
            };
            children[path.at(common) as usize] = store.commit(&inserted);

            Ok(wrap_in_extension(store, path.prefix(common), children))
        }
        Node::Branch {
            mut children,
            value: branch_value,
        } => {
            let nibble = match path.first() {
                Some(nibble) => nibble as usize,
                None => return Err(InvariantViolation::InvalidFullPath(path).into()),
            };

            let updated = match store.resolve(&children[nibble])? {
                None => Node::Leaf {
                    key: path.slice_from(1),
                    value,
                },
                Some(subnode) => upsert_rec(store, subnode, path.slice_from(1), value)?,
            };
            children[nibble] = store.commit(&updated);

            Ok(Node::Branch {
                children,
                value: branch_value,
            })
        }
    }
}

/// A fresh branch, wrapped in an extension when the split point sits below a
/// shared prefix.
fn wrap_in_extension(
    store: &mut NodeStore,
    prefix: Nibbles,
    children: [NodeRef; 16],
) -> Node {
    let branch = Node::Branch {
        children,
        value: Vec::new(),
    };
    match prefix.is_empty() {
        true => branch,
        false => {
            let child = store.commit(&branch);
            Node::Extension {
                segment: prefix,
                child,
            }
        }
    }
}

/// What a recursive delete did below some node.
enum Removal {
    /// The target leaf was not found; nothing changed.
    NotFound,
    /// The node vanished entirely.
    Gone,
    /// The node was rebuilt.
    Replaced(Node),
}

/// Deletes the leaf at `path`, returning the new root digest.
///
/// Deleting a path the trie proves absent returns `root` unchanged; deleting
/// the last leaf returns [`EMPTY_TRIE_HASH`]. Collapse rules run on the way
/// back up, so the result is always in canonical (maximally merged) form.
pub fn delete(store: &mut NodeStore, root: H256, path: &Nibbles) -> TrieResult<H256> {
    trace!("deleting leaf at {path} if present");

    if root == EMPTY_TRIE_HASH {
        return Ok(root);
    }

    let node = store.node(root)?;
    match delete_rec(store, node, path.clone())? {
        Removal::NotFound => Ok(root),
        Removal::Gone => Ok(EMPTY_TRIE_HASH),
        Removal::Replaced(node) => Ok(store.commit_root(&node)),
    }
}

fn delete_rec(store: &mut NodeStore, node: Node, path: Nibbles) -> TrieResult<Removal> {
    match node {
        Node::Leaf { key, .. } => Ok(match key == path {
            true => Removal::Gone,
            false => Removal::NotFound,
        }),
        Node::Extension { segment, child } => {
            if !path.has_prefix(&segment) {
                return Ok(Removal::NotFound);
            }

            let subnode = store.resolve_existing(&child)?;
            Ok(match delete_rec(store, subnode, path.slice_from(segment.len()))? {
                Removal::NotFound => Removal::NotFound,
                // An extension's child is a branch in any canonical trie,
                // and branches collapse instead of vanishing.
                Removal::Gone => Removal::Gone,
                Removal::Replaced(subnode) => {
                    Removal::Replaced(merge_into_extension(store, segment, subnode))
                }
            })
        }
        Node::Branch {
            mut children,
            value,
        } => {
            let nibble = match path.first() {
                Some(nibble) => nibble as usize,
                None => return Ok(Removal::NotFound),
            };
            if children[nibble].is_empty() {
                return Ok(Removal::NotFound);
            }

            let subnode = store.resolve_existing(&children[nibble])?;
            match delete_rec(store, subnode, path.slice_from(1))? {
                Removal::NotFound => Ok(Removal::NotFound),
                Removal::Replaced(subnode) => {
                    children[nibble] = store.commit(&subnode);
                    Ok(Removal::Replaced(Node::Branch { children, value }))
                }
                Removal::Gone => {
                    children[nibble] = NodeRef::Empty;
                    let remaining: Vec<usize> =
                        (0..16).filter(|idx| !children[*idx].is_empty()).collect();

                    match (remaining.as_slice(), value.is_empty()) {
                        ([], _) => Ok(Removal::Gone),
                        ([sole], true) => {
                            let collapsed =
                                collapse_branch(store, *sole as u8, children[*sole].clone())?;
                            Ok(Removal::Replaced(collapsed))
                        }
                        _ => Ok(Removal::Replaced(Node::Branch { children, value })),
                    }
                }
            }
        }
    }
}

/// Folds a branch left with a single surviving child into an extension or
/// leaf carrying the child's branch index.
fn collapse_branch(store: &mut NodeStore, nibble: u8, child: NodeRef) -> TrieResult<Node> {
    let index = Nibbles::from_nibble(nibble);

    if let NodeRef::Hash(digest) = &child {
        if !store.contains_node(*digest) {
            // The witness does not cover the surviving sibling, so there is
            // nothing to merge with; a one-nibble extension over its digest
            // keeps the structure hashable.
            warn!("branch collapse onto unwitnessed sibling 0x{digest:x}; emitting a one-nibble extension");
            return Ok(Node::Extension {
                segment: index,
                child,
            });
        }
    }

    Ok(match store.resolve_existing(&child)? {
        Node::Leaf { key, value } => Node::Leaf {
            key: index.join(&key),
            value,
        },
        Node::Extension { segment, child } => Node::Extension {
            segment: index.join(&segment),
            child,
        },
        Node::Branch { .. } => Node::Extension {
            segment: index,
            child,
        },
    })
}

/// Re-roots a rebuilt subnode under an extension's segment, merging chained
/// extensions and absorbing leaves so no extension ever parents another
/// extension.
fn merge_into_extension(store: &mut NodeStore, segment: Nibbles, subnode: Node) -> Node {
    match subnode {
        Node::Branch { .. } => {
            let child = store.commit(&subnode);
            Node::Extension { segment, child }
        }
        Node::Extension {
            segment: tail,
            child,
        } => Node::Extension {
            segment: segment.join(&tail),
            child,
        },
        Node::Leaf { key, value } => Node::Leaf {
            key: segment.join(&key),
            value,
        },
    }
}
