//! Serde model of the ZK-PI witness bundle.
//!
//! Every byte string in the bundle is `0x`-prefixed lowercase hex. Block
//! headers, transactions, withdrawals and receipts are opaque to this engine:
//! only the `stateRoot` field of a header is interpreted, everything else is
//! ignored on the way in.

use ethereum_types::{Address, H256, U256};
use serde::Deserialize;

use crate::error::{StateError, StateResult};

/// One proving-input bundle for a single block.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkPiBundle {
    /// Chain parameters; only the id is meaningful here.
    pub chain_config: ChainConfig,
    /// The witnessed trie nodes, ancestor headers and contract codes.
    pub witness: Witness,
    /// The block(s) this bundle proves; the first block's header carries the
    /// post-state root.
    pub blocks: Vec<Block>,
    /// Every address and storage key the block touches.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
    /// Post-state material, present when the bundle supports diff mode.
    #[serde(default)]
    pub extra: Option<Extra>,
}

/// Chain parameters.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
}

/// The witness proper: pre-state nodes, codes and the ancestor headers.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Witness {
    /// Ancestor headers, parent first; `ancestors[0].stateRoot` is the
    /// pre-state root.
    pub ancestors: Vec<BlockHeader>,
    /// RLP-encoded trie nodes (main and storage tries, mixed).
    #[serde(with = "hex_blobs")]
    pub state: Vec<Vec<u8>>,
    /// Contract bytecodes.
    #[serde(default, with = "hex_blobs")]
    pub codes: Vec<Vec<u8>>,
}

/// A block header, of which only the state root is read.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Root of the world-state trie after this block.
    pub state_root: H256,
}

/// A block to prove.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// The block's header.
    pub header: BlockHeader,
}

/// One access-list entry: an address and the storage keys touched under it.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    /// The touched address.
    pub address: Address,
    /// The touched storage keys; `null` and absent both mean none.
    #[serde(default)]
    pub storage_keys: Option<Vec<H256>>,
}

/// Post-state material for diff mode.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extra {
    /// Post-state trie nodes committed by the preflight.
    #[serde(default, with = "hex_blobs")]
    pub committed: Vec<Vec<u8>>,
    /// Additional accesses observed while committing the post state.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
    /// The diff the preflight already computed, kept for cross-checking.
    #[serde(default)]
    pub state_diffs: Vec<DeclaredAccountDiff>,
}

/// An account diff entry as declared by the preflight.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredAccountDiff {
    /// The changed address.
    pub address: Address,
    /// The account before the block, absent when it did not exist.
    #[serde(default)]
    pub pre_account: Option<DeclaredAccount>,
    /// The account after the block, absent when it was erased.
    #[serde(default)]
    pub post_account: Option<DeclaredAccount>,
}

/// The account fields a declared diff entry carries.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredAccount {
    /// Transaction count.
    pub nonce: U256,
    /// Balance in wei.
    pub balance: U256,
    /// Keccak of the bytecode, when declared.
    #[serde(default)]
    pub code_hash: Option<H256>,
    /// Storage trie root, when declared.
    #[serde(default)]
    pub storage_root: Option<H256>,
}

impl ZkPiBundle {
    /// Parses a bundle from its JSON bytes.
    pub fn from_json(bytes: &[u8]) -> StateResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The pre-state root: the state root of the direct parent header.
    pub fn pre_state_root(&self) -> StateResult<H256> {
        self.witness
            .ancestors
            .first()
            .map(|header| header.state_root)
            .ok_or_else(|| StateError::MalformedInput("witness.ancestors is empty".into()))
    }

    /// The post-state root: the state root declared by the first block.
    pub fn post_state_root(&self) -> StateResult<H256> {
        self.blocks
            .first()
            .map(|block| block.header.state_root)
            .ok_or_else(|| StateError::MalformedInput("blocks is empty".into()))
    }
}

/// `["0xdead...", ...] <-> Vec<Vec<u8>>`.
mod hex_blobs {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(de)?
            .iter()
            .map(|blob| {
                hex::decode(blob.strip_prefix("0x").unwrap_or(blob))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}
