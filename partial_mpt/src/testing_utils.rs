use ethereum_types::H256;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::nibbles::Nibbles;

pub(crate) type TestEntry = (Nibbles, Vec<u8>);

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

/// Random 32-byte keys (64-nibble paths, as in real state tries) with small
/// random values. 32 random bytes make key collisions a non-concern.
pub(crate) fn generate_n_random_fixed_key_entries(
    n: usize,
    seed: u64,
) -> impl Iterator<Item = TestEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(move |_| {
        let mut key = [0u8; 32];
        rng.fill(&mut key);
        let value: Vec<u8> = (0..rng.gen_range(1..=40)).map(|_| rng.gen()).collect();
        (Nibbles::from_h256(H256(key)), value)
    })
}
