//! Seed pairs, hash commitments, and the binding game hash.
//!
//! Commit-reveal scheme: the SHA-256 of the server seed is published before
//! the round starts; the seed itself is withheld until the round reaches a
//! terminal state. The combined seed (HMAC-SHA256 keyed by the server seed
//! over the client seed) is the sole input to outcome derivation, so any
//! third party can reproduce the outcome once the server seed is revealed.
//!
//! Both seeds are generated server-side. Letting clients pick their seed
//! after seeing the commitment would let them grind favourable outcomes;
//! the trade-off is documented here rather than hidden.

use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SERVER_SEED_BYTES: usize = 32;
const CLIENT_SEED_BYTES: usize = 16;

/// Server/client seed pair. The server seed is secret until reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPair {
    pub server_seed: String,
    pub client_seed: String,
}

impl SeedPair {
    /// Generate a fresh pair from the OS entropy source, hex encoded.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let mut server = [0u8; SERVER_SEED_BYTES];
        let mut client = [0u8; CLIENT_SEED_BYTES];
        rng.fill_bytes(&mut server);
        rng.fill_bytes(&mut client);
        Self {
            server_seed: hex::encode(server),
            client_seed: hex::encode(client),
        }
    }

    /// Public commitment to the server seed.
    pub fn commitment(&self) -> String {
        commit(&self.server_seed)
    }

    /// Combined seed driving all outcome derivation for the round.
    pub fn combined(&self) -> [u8; 32] {
        combine_seeds(&self.server_seed, &self.client_seed)
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// One-way commitment: SHA-256 over the hex seed string.
pub fn commit(server_seed: &str) -> String {
    sha256_hex(server_seed.as_bytes())
}

/// Check a revealed seed against its stored commitment.
pub fn verify_commitment(server_seed: &str, stored_hash: &str) -> bool {
    commit(server_seed) == stored_hash
}

/// HMAC-SHA256(key = server seed, msg = client seed).
pub fn combine_seeds(server_seed: &str, client_seed: &str) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(server_seed.as_bytes()).expect("HMAC accepts any key length");
    mac.update(client_seed.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Hash binding every parameter that affects the payout.
///
/// Canonical serialization: fixed field order, `|` separated, floats at
/// eight decimal places. Any single-field tamper changes the hash, and an
/// external verifier can reproduce it bit-for-bit.
pub fn bind_game_hash(
    outcome: &str,
    mode: &str,
    bet: f64,
    server_seed: &str,
    client_seed: &str,
    mine_count: u32,
    total_tiles: u32,
) -> String {
    let canonical = format!(
        "{outcome}|{mode}|{bet:.8}|{server_seed}|{client_seed}|{mine_count}|{total_tiles}"
    );
    sha256_hex(canonical.as_bytes())
}

/// Canonical outcome string for a mine layout.
pub fn canonical_mines_outcome(positions: &[u32]) -> String {
    let joined = positions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("m:{joined}")
}

/// Canonical outcome string for a crash point.
pub fn canonical_crash_outcome(crash_point: f64) -> String {
    format!("c:{crash_point:.8}")
}

/// Canonical outcome string for a slide sequence and its realized index.
pub fn canonical_slide_outcome(sequence: &[f64], realized_index: usize) -> String {
    let joined = sequence
        .iter()
        .map(|v| format!("{v:.8}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("s:{joined};{realized_index}")
}
