//! Provable-fairness primitives: seed pairs and commitments, deterministic
//! outcome derivation, and the public verification service.

pub mod derive;
pub mod seed;
pub mod verify;

pub use derive::{derive_positions, SeedStream};
pub use seed::{bind_game_hash, combine_seeds, commit, SeedPair};
pub use verify::{verify, VerificationReport};
