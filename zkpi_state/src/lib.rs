//! Reconstruction, mutation and diffing of Ethereum world state from a ZK-PI
//! witness bundle.
//!
//! A preflight execution distills one block into a bundle: the RLP-encoded
//! trie nodes the block actually touched, the contract codes, and the access
//! list naming every address and storage key involved. [`session::Session`]
//! ingests that bundle into a content-addressed
//! [`NodeStore`](partial_mpt::store::NodeStore); on top of it this crate
//! offers:
//!
//! - typed account and storage reads/writes that re-root through the account
//!   record ([`state_ops`]),
//! - a lockstep trie diff with verifier-grade output ordering ([`diff`],
//!   [`ordering`]),
//! - a materialized `address -> account` world view ([`world`]),
//! - and a diff applier that replays entries onto a working root ([`apply`]).
//!
//! Witnesses are partial: subtrees off the accessed paths exist
//! only as digests. Reads report exclusions as `None`, the diff skips what
//! neither side can see, and only a digest dereferenced on a directly
//! requested path may fail hard.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]

pub mod account;
pub mod apply;
pub mod diff;
pub mod error;
pub mod ordering;
pub mod preimages;
pub mod session;
pub mod state_ops;
pub mod world;
pub mod zkpi;
