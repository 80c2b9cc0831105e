//! Hash commitments submitted to the registrar.

use crate::mystery::Mystery;
use crate::proof_tree::ProofTree;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub mystery_id: String,
    pub mystery_key: String,
    pub answer_hash: String,
    pub proof_hash: String,
}

impl Commitment {
    pub fn for_mystery(mystery: &Mystery) -> Self {
        Self {
            mystery_id: mystery.id().to_string(),
            mystery_key: sha256_hex(mystery.id().as_bytes()),
            answer_hash: answer_hash(mystery.answer()),
            proof_hash: proof_hash(mystery.proof_tree()),
        }
    }

    /// Whether `guess` hashes to the committed answer.
    pub fn matches_answer(&self, guess: &str) -> bool {
        answer_hash(guess) == self.answer_hash
    }
}

/// `0x`-prefixed lowercase hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(2 + digest.len() * 2);
    out.push_str("0x");
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn answer_hash(answer: &str) -> String {
    sha256_hex(answer.trim().to_lowercase().as_bytes())
}

/// Hash of the canonical JSON of the proof tree (object keys sorted).
pub fn proof_hash(tree: &ProofTree) -> String {
    // serde_json::Value keeps object keys in a BTreeMap, so this is canonical.
    let canonical = serde_json::to_value(tree)
        .map(|v| v.to_string())
        .unwrap_or_default();
    sha256_hex(canonical.as_bytes())
}
