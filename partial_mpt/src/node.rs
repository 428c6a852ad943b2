//! The three internal node shapes of a Merkle Patricia trie and their RLP
//! codec.
//!
//! Nodes never form cycles: every child is either absent, the Keccak digest
//! of its encoding, or that encoding inlined when it is shorter than 32
//! bytes. Which of the three a [`NodeRef`] is determines how the node store
//! dereferences it.

use std::fmt::{self, Debug};

use enum_as_inner::EnumAsInner;
use ethereum_types::H256;
use rlp::{DecoderError, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

use crate::{
    error::{InvariantViolation, TrieResult},
    nibbles::Nibbles,
};

/// A reference from a node to one of its children.
#[derive(Clone, Default, Deserialize, EnumAsInner, Eq, Hash, PartialEq, Serialize)]
pub enum NodeRef {
    /// No child at this position; encoded as the RLP empty string.
    #[default]
    Empty,

    /// A 32-byte content address, dereferenced through the node store.
    Hash(H256),

    /// A child whose full RLP encoding is inlined in its parent because it is
    /// shorter than 32 bytes.
    Embedded(Vec<u8>),
}

impl NodeRef {
    fn decode(item: &Rlp<'_>) -> TrieResult<Self> {
        if item.is_list() {
            return Ok(NodeRef::Embedded(item.as_raw().to_vec()));
        }
        let data = item.data()?;
        match data.len() {
            0 => Ok(NodeRef::Empty),
            32 => Ok(NodeRef::Hash(H256::from_slice(data))),
            _ => Err(DecoderError::Custom(
                "child reference is neither empty, a digest, nor an embedded node",
            )
            .into()),
        }
    }

    fn append_to(&self, stream: &mut RlpStream) {
        match self {
            NodeRef::Empty => stream.append_empty_data(),
            NodeRef::Hash(digest) => stream.append(digest),
            NodeRef::Embedded(raw) => stream.append_raw(raw, 1),
        };
    }
}

impl Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Empty => write!(f, "Empty"),
            NodeRef::Hash(digest) => write!(f, "Hash(0x{digest:x})"),
            NodeRef::Embedded(raw) => write!(f, "Embedded(0x{})", hex::encode(raw)),
        }
    }
}

/// An internal trie node. The set is closed: every node in a canonical
/// Ethereum trie is one of these three shapes, and matching is exhaustive
/// everywhere.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Node {
    /// A terminal node carrying the remainder of its key and a value.
    Leaf {
        /// The nibbles of the key not consumed by the path above this node.
        key: Nibbles,
        /// The RLP-encoded payload stored under the key.
        value: Vec<u8>,
    },

    /// A run of nibbles shared by every key below it, followed by a single
    /// child (a branch, in any canonical trie).
    Extension {
        /// The shared key segment; never empty.
        segment: Nibbles,
        /// The node the segment leads to; never [`NodeRef::Empty`].
        child: NodeRef,
    },

    /// A 16-way fork, one child slot per next nibble.
    Branch {
        /// The children of this node, indexed by nibble.
        children: [NodeRef; 16],
        /// The branch value; always empty in Ethereum state and storage
        /// tries, but decoded faithfully so the diff engine can reject it
        /// with the right error kind.
        value: Vec<u8>,
    },
}

impl Node {
    /// Decodes an RLP-encoded node, dispatching on the decoded list arity:
    /// 17 items is a branch, 2 items is a leaf or an extension depending on
    /// the hex-prefix flag.
    pub fn decode(bytes: &[u8]) -> TrieResult<Self> {
        let rlp = Rlp::new(bytes);
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList.into());
        }

        match rlp.item_count()? {
            17 => {
                let mut children: [NodeRef; 16] = Default::default();
                for (idx, slot) in children.iter_mut().enumerate() {
                    *slot = NodeRef::decode(&rlp.at(idx)?)?;
                }
                if children.iter().filter(|child| !child.is_empty()).count() < 2 {
                    return Err(InvariantViolation::LTTwoNonNullSubnodes.into());
                }
                let value = rlp.at(16)?.data()?.to_vec();
                Ok(Node::Branch { children, value })
            }
            2 => {
                let (path, is_leaf) = Nibbles::from_hex_prefix_encoding(rlp.at(0)?.data()?)?;
                match is_leaf {
                    true => Ok(Node::Leaf {
                        key: path,
                        value: rlp.at(1)?.data()?.to_vec(),
                    }),
                    false => {
                        if path.is_empty() {
                            return Err(InvariantViolation::EmptyKeySegment.into());
                        }
                        let child = NodeRef::decode(&rlp.at(1)?)?;
                        if child.is_empty() {
                            return Err(
                                DecoderError::Custom("extension node with an empty child").into()
                            );
                        }
                        Ok(Node::Extension {
                            segment: path,
                            child,
                        })
                    }
                }
            }
            _ => Err(DecoderError::RlpIncorrectListLen.into()),
        }
    }

    /// The RLP encoding of this node; the exact inverse of [`Self::decode`].
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Node::Leaf { key, value } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&key.to_hex_prefix_encoding(true));
                stream.append(value);
                stream.out().to_vec()
            }
            Node::Extension { segment, child } => {
                let mut stream = RlpStream::new_list(2);
                stream.append(&segment.to_hex_prefix_encoding(false));
                child.append_to(&mut stream);
                stream.out().to_vec()
            }
            Node::Branch { children, value } => {
                let mut stream = RlpStream::new_list(17);
                for child in children {
                    child.append_to(&mut stream);
                }
                match value.is_empty() {
                    true => stream.append_empty_data(),
                    false => stream.append(value),
                };
                stream.out().to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethereum_types::H256;

    use super::{Node, NodeRef};
    use crate::{
        error::{InvariantViolation, TrieError},
        nibbles::Nibbles,
    };

    fn round_trips(node: Node) {
        let encoded = node.encode();
        assert_eq!(Node::decode(&encoded).unwrap(), node);
    }

    #[test]
    fn leaf_round_trips() {
        round_trips(Node::Leaf {
            key: Nibbles::from_str("0xabc").unwrap(),
            value: vec![0x01, 0x02, 0x03],
        });
        round_trips(Node::Leaf {
            key: Nibbles::default(),
            value: vec![0xff; 40],
        });
    }

    #[test]
    fn extension_round_trips() {
        round_trips(Node::Extension {
            segment: Nibbles::from_str("0x12").unwrap(),
            child: NodeRef::Hash(H256::repeat_byte(7)),
        });

        let embedded = Node::Leaf {
            key: Nibbles::from_str("0x3").unwrap(),
            value: vec![0x2a],
        }
        .encode();
        assert!(embedded.len() < 32);
        round_trips(Node::Extension {
            segment: Nibbles::from_str("0x12").unwrap(),
            child: NodeRef::Embedded(embedded),
        });
    }

    #[test]
    fn branch_round_trips() {
        let mut children: [NodeRef; 16] = Default::default();
        children[0x3] = NodeRef::Hash(H256::repeat_byte(1));
        children[0xc] = NodeRef::Embedded(
            Node::Leaf {
                key: Nibbles::from_str("0x4").unwrap(),
                value: vec![0x09],
            }
            .encode(),
        );
        round_trips(Node::Branch {
            children,
            value: Vec::new(),
        });
    }

    #[test]
    fn unexpected_arity_is_rejected() {
        let three_items = {
            let mut stream = rlp::RlpStream::new_list(3);
            stream.append_empty_data();
            stream.append_empty_data();
            stream.append_empty_data();
            stream.out().to_vec()
        };
        assert!(matches!(
            Node::decode(&three_items),
            Err(TrieError::MalformedNode(_))
        ));
        assert!(matches!(
            Node::decode(&rlp::NULL_RLP),
            Err(TrieError::MalformedNode(_))
        ));
    }

    #[test]
    fn underfilled_branch_is_rejected() {
        let mut children: [NodeRef; 16] = Default::default();
        children[0] = NodeRef::Hash(H256::repeat_byte(1));
        let encoded = Node::Branch {
            children,
            value: Vec::new(),
        }
        .encode();

        assert_eq!(
            Node::decode(&encoded),
            Err(TrieError::Invariant(
                InvariantViolation::LTTwoNonNullSubnodes
            ))
        );
    }

    #[test]
    fn empty_extension_segment_is_rejected() {
        let mut stream = rlp::RlpStream::new_list(2);
        stream.append(&Nibbles::default().to_hex_prefix_encoding(false));
        stream.append(&H256::repeat_byte(2));
        let encoded = stream.out().to_vec();

        assert_eq!(
            Node::decode(&encoded),
            Err(TrieError::Invariant(InvariantViolation::EmptyKeySegment))
        );
    }

    #[test]
    fn mainnet_witness_nodes_decode() {
        use hex_literal::hex;

        // An account leaf and a branch node lifted from a real execution
        // witness.
        let leaf_rlp = hex!(
            "f869a0206aea581b220579a2b99819299dd32c7c28a420018ecb0bde93af007a"
            "d89a31b846f8440180a056e81f171bcc55a6ff8345e692c0f86e5b48e01b996c"
            "adc001622fb5e363b421a078c6cb5202685228bbcbfb992b1c4e116c7ec5ef11"
            "e25b8e92716cfc628ddd60"
        );
        match Node::decode(&leaf_rlp).unwrap() {
            Node::Leaf { key, value } => {
                // A 0x20-prefixed key packs 62 nibbles: this leaf sits two
                // nibbles below the state root.
                assert_eq!(key.len(), 62);
                assert_eq!(key.at(0), 0x6);
                assert_eq!(value.len(), 70);
            }
            other => panic!("expected an account leaf, got {other:?}"),
        }

        let branch_rlp = hex!(
            "f851808080a0de090f75dbe520ac527f21140ede3807a7dc416a0bae24c33dde"
            "9fe04300a08c808080808080808080a0f215e6bc9ca85972bc2488943dca8031"
            "3a019f5eb569cc6ee3dc8c2af68734af808080"
        );
        match Node::decode(&branch_rlp).unwrap() {
            Node::Branch { children, value } => {
                assert!(value.is_empty());
                assert!(children[0x3].is_hash());
                assert!(children[0xd].is_hash());
                assert_eq!(
                    children.iter().filter(|child| !child.is_empty()).count(),
                    2
                );
            }
            other => panic!("expected a branch, got {other:?}"),
        }
    }

    #[test]
    fn nonempty_branch_value_decodes() {
        // Hostile witnesses may carry one; rejecting it is the diff engine's
        // job, with its own error kind.
        let mut children: [NodeRef; 16] = Default::default();
        children[1] = NodeRef::Hash(H256::repeat_byte(1));
        children[2] = NodeRef::Hash(H256::repeat_byte(2));
        let node = Node::Branch {
            children,
            value: vec![0x2a],
        };

        assert_eq!(Node::decode(&node.encode()).unwrap(), node);
    }
}
