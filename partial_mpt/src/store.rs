//! Content-addressed storage for witnessed trie nodes and contract codes.
//!
//! The store is the only place raw node bytes live: parents hold digests (or
//! inlined encodings), and every traversal dereferences them here. It is
//! built once from a witness, read-mostly afterward, and grows monotonically
//! as mutations allocate new nodes; nothing is ever evicted.

use std::collections::HashMap;

use bytes::Bytes;
use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::DecoderError;

use crate::{
    error::{TrieError, TrieResult},
    node::{Node, NodeRef},
};

/// Keccak of the RLP empty string: the root hash of an empty trie.
pub const EMPTY_TRIE_HASH: H256 = keccak_hash::KECCAK_NULL_RLP;

/// Keccak of the empty byte string: the code hash of a codeless account.
pub const EMPTY_BYTES_HASH: H256 = keccak_hash::KECCAK_EMPTY;

/// Two content-addressed maps: `keccak(rlp_node) -> rlp_node` and
/// `keccak(code) -> code`.
#[derive(Clone, Debug, Default)]
pub struct NodeStore {
    nodes: HashMap<H256, Bytes>,
    codes: HashMap<H256, Bytes>,
}

impl NodeStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an RLP-encoded node under its Keccak digest and returns the
    /// digest. Idempotent: re-inserting the same bytes is a no-op.
    pub fn insert_node(&mut self, bytes: Vec<u8>) -> H256 {
        let digest = keccak(&bytes);
        self.nodes.entry(digest).or_insert_with(|| Bytes::from(bytes));
        digest
    }

    /// The raw encoding stored under `digest`, if any. The empty-trie
    /// sentinel always answers with the canonical empty encoding, whether or
    /// not a witness carried it.
    pub fn get_node(&self, digest: H256) -> Option<Bytes> {
        if digest == EMPTY_TRIE_HASH {
            return Some(Bytes::from_static(&rlp::NULL_RLP));
        }
        self.nodes.get(&digest).cloned()
    }

    /// Whether `digest` can be dereferenced.
    pub fn contains_node(&self, digest: H256) -> bool {
        digest == EMPTY_TRIE_HASH || self.nodes.contains_key(&digest)
    }

    /// Fetches and decodes the node stored under `digest`.
    pub fn node(&self, digest: H256) -> TrieResult<Node> {
        let bytes = self
            .nodes
            .get(&digest)
            .ok_or(TrieError::MissingNode(digest))?;
        Node::decode(bytes)
    }

    /// Resolves a child reference: `Ok(None)` for an empty slot,
    /// [`TrieError::MissingNode`] when a digest has no backing bytes in the
    /// witness. Hashed and embedded children decode uniformly.
    pub fn resolve(&self, child: &NodeRef) -> TrieResult<Option<Node>> {
        match child {
            NodeRef::Empty => Ok(None),
            NodeRef::Hash(digest) => self.node(*digest).map(Some),
            NodeRef::Embedded(raw) => Node::decode(raw).map(Some),
        }
    }

    /// Like [`Self::resolve`], for references that cannot be empty in a
    /// well-formed trie (extension children, occupied branch slots).
    pub fn resolve_existing(&self, child: &NodeRef) -> TrieResult<Node> {
        self.resolve(child)?.ok_or_else(|| {
            DecoderError::Custom("empty child reference where a subnode is required").into()
        })
    }

    /// Encodes `node` and turns it into a child reference: inlined when the
    /// encoding is shorter than 32 bytes, stored and hashed otherwise.
    pub fn commit(&mut self, node: &Node) -> NodeRef {
        let encoded = node.encode();
        match encoded.len() < 32 {
            true => NodeRef::Embedded(encoded),
            false => NodeRef::Hash(self.insert_node(encoded)),
        }
    }

    /// Encodes and stores `node` as a trie root, returning its digest. Roots
    /// are always addressed by hash, even when their encoding is short.
    pub fn commit_root(&mut self, node: &Node) -> H256 {
        self.insert_node(node.encode())
    }

    /// Stores a contract bytecode under its Keccak digest.
    pub fn insert_code(&mut self, code: Vec<u8>) -> H256 {
        let digest = keccak(&code);
        self.codes.entry(digest).or_insert_with(|| Bytes::from(code));
        digest
    }

    /// The bytecode stored under `digest`, if any. The empty-code sentinel
    /// always answers with empty bytes.
    pub fn get_code(&self, digest: H256) -> Option<Bytes> {
        if digest == EMPTY_BYTES_HASH {
            return Some(Bytes::new());
        }
        self.codes.get(&digest).cloned()
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of stored bytecodes.
    pub fn code_count(&self) -> usize {
        self.codes.len()
    }

    /// Iterates over every stored `(digest, rlp_node)` pair, in no particular
    /// order. Useful for re-exporting a witness.
    pub fn nodes(&self) -> impl Iterator<Item = (&H256, &Bytes)> {
        self.nodes.iter()
    }
}
