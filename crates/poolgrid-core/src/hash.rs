//! Step input hashing.
//!
//! The replay log stores the SHA-256 of each step's input next to its
//! result. Inputs are hashed over their JSON form, so every map in a hashed
//! type must be ordered (`BTreeMap`).

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the JSON encoding of `input`.
pub fn input_hash<T: Serialize + ?Sized>(input: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(input)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
