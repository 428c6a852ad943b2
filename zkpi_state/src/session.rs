//! A proving session: the witness node store, preimage directory and state
//! roots for one block.

use ethereum_types::H256;
use log::debug;

use partial_mpt::store::NodeStore;

use crate::{
    apply::apply_state_diff,
    diff::{state_diff, StateDiff},
    error::{StateError, StateResult},
    preimages::PreimageDirectory,
    world::World,
    zkpi::ZkPiBundle,
};

/// Everything one block's proving run needs to read, mutate and diff its
/// world state.
///
/// The store and preimage directory are built once at ingestion and are
/// read-mostly afterward; mutation grows the store but never maintains a
/// mutable "current root". Roots are values the caller passes around.
#[derive(Clone, Debug)]
pub struct Session {
    /// The content-addressed node and code store.
    pub store: NodeStore,
    /// Reverse lookups for hashed addresses and storage keys.
    pub preimages: PreimageDirectory,
    /// EIP-155 chain id, straight from the bundle.
    pub chain_id: u64,
    /// State root before the block (the parent header's).
    pub pre_root: H256,
    /// State root after the block (the block header's).
    pub post_root: H256,
}

impl Session {
    /// Ingests a bundle per the witness contract: nodes keyed by their
    /// Keccak digest, codes keyed by their hash, preimages collected from
    /// every access list.
    ///
    /// The pre-state root must be covered by the ingested nodes; the
    /// post-state root must be too when the bundle carries post-state
    /// material (`extra`).
    pub fn from_bundle(bundle: &ZkPiBundle) -> StateResult<Self> {
        let mut store = NodeStore::new();
        for encoded in &bundle.witness.state {
            store.insert_node(encoded.clone());
        }
        if let Some(extra) = &bundle.extra {
            for encoded in &extra.committed {
                store.insert_node(encoded.clone());
            }
        }
        for code in &bundle.witness.codes {
            store.insert_code(code.clone());
        }

        let mut preimages = PreimageDirectory::default();
        let extra_accesses = bundle
            .extra
            .iter()
            .flat_map(|extra| extra.access_list.iter());
        for entry in bundle.access_list.iter().chain(extra_accesses) {
            preimages.record_address(entry.address);
            for key in entry.storage_keys.iter().flatten() {
                preimages.record_storage_key(*key);
            }
        }

        let pre_root = bundle.pre_state_root()?;
        if !store.contains_node(pre_root) {
            return Err(StateError::MissingStateRoot(pre_root));
        }
        let post_root = bundle.post_state_root()?;
        if bundle.extra.is_some() && !store.contains_node(post_root) {
            return Err(StateError::MissingStateRoot(post_root));
        }

        debug!(
            "ingested witness: {} nodes, {} codes, {} address / {} key preimages",
            store.node_count(),
            store.code_count(),
            preimages.address_count(),
            preimages.storage_key_count(),
        );

        Ok(Self {
            store,
            preimages,
            chain_id: bundle.chain_config.chain_id,
            pre_root,
            post_root,
        })
    }

    /// Materializes the pre-state world view.
    pub fn world(&self) -> StateResult<World> {
        World::materialize(&self.store, &self.preimages, self.pre_root)
    }

    /// Diffs the pre- and post-state tries into ordered entry streams.
    pub fn diff(&self) -> StateResult<StateDiff> {
        state_diff(&self.store, &self.preimages, self.pre_root, self.post_root)
    }

    /// Applies `diff` on top of the pre-state root, returning the resulting
    /// root. New nodes land in the session store; the pre-state root stays
    /// valid.
    pub fn apply(&mut self, diff: &StateDiff) -> StateResult<H256> {
        apply_state_diff(&mut self.store, self.pre_root, diff)
    }
}
