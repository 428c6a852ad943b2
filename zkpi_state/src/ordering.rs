//! Output ordering contracts for diff entries.
//!
//! Account entries sort by the address read as a little-endian integer;
//! storage entries sort by `poseidon_hash_many([address_le, key_low,
//! key_high])`. Both orders feed a hash-chained verifier downstream and must
//! hold bit-exactly; Poseidon (rather than Keccak) because that verifier is a
//! ZK circuit.

use ethereum_types::{Address, H256, U256};
use starknet_crypto::{poseidon_hash_many, Felt};

/// Sort key for account diff entries: the address bytes read as a
/// little-endian unsigned integer.
pub fn account_order_key(address: Address) -> U256 {
    U256::from_little_endian(address.as_bytes())
}

/// Sort key for storage diff entries: the big-endian bytes of the Poseidon
/// digest over `(address_le, key_low, key_high)`.
///
/// The slot key is read as a big-endian 256-bit integer and split at bit 128;
/// only the address is little-endian.
pub fn storage_order_key(address: Address, key: H256) -> [u8; 32] {
    let address_felt = Felt::from_bytes_be(&le_int_bytes(address));

    let key_int = U256::from_big_endian(key.as_bytes());
    let key_low = Felt::from(key_int.low_u128());
    let key_high = Felt::from((key_int >> 128).low_u128());

    poseidon_hash_many(&[address_felt, key_low, key_high]).to_bytes_be()
}

/// Big-endian byte representation of `le_int(address)`: the address bytes
/// reversed into the low end of a 32-byte word.
fn le_int_bytes(address: Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (slot, byte) in out[12..].iter_mut().zip(address.as_bytes().iter().rev()) {
        *slot = *byte;
    }
    out
}
