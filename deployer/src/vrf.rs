//! Deterministic random words for the mock coordinator.
//!
//! The mock can be fulfilled with caller-chosen words. Deriving them with
//! HMAC-SHA256 from a test secret keeps winner selection reproducible while
//! still spreading values uniformly over the word space.

use ethers::types::{Address, U256};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute `num_words` random words for a request.
///
/// ```text
/// word[i] = HMAC-SHA256(secret, request_id_be32 || consumer || i_le)
/// ```
pub fn derive_random_words(
    secret: &[u8],
    request_id: U256,
    consumer: Address,
    num_words: u32,
) -> Vec<U256> {
    let mut id_bytes = [0u8; 32];
    request_id.to_big_endian(&mut id_bytes);

    (0..num_words)
        .map(|i| {
            let mut mac =
                HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
            mac.update(&id_bytes);
            mac.update(consumer.as_bytes());
            mac.update(&i.to_le_bytes());
            U256::from_big_endian(&mac.finalize().into_bytes())
        })
        .collect()
}
