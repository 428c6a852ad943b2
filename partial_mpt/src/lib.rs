//! Partial Ethereum Merkle Patricia tries over a content-addressed node
//! store.
//!
//! A block witness carries only the trie nodes an execution actually touched;
//! every other subtree appears as a bare Keccak digest with no backing bytes.
//! This crate models such tries the way the witness does: raw nodes live in a
//! [`NodeStore`](store::NodeStore) keyed by their digest, parents refer to
//! children through [`NodeRef`](node::NodeRef)s (hashed, embedded, or empty),
//! and every operation walks the store instead of a pointer graph.
//!
//! Reads ([`query::resolve`]) distinguish an exclusion proof (`Ok(None)`)
//! from a broken witness ([`TrieError::MissingNode`](error::TrieError)).
//! Writes ([`trie_ops::upsert`] / [`trie_ops::delete`]) allocate new nodes
//! into the store and return a new root digest; old roots stay valid, so a
//! caller can hold pre- and post-mutation views of the same session.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod error;
pub mod nibbles;
pub mod node;
pub mod query;
pub mod store;
pub mod trie_ops;

#[cfg(test)]
pub(crate) mod testing_utils;
