//! Assertion signing and verification.
//!
//! An assertion signs the UTF-8 bytes of its claim's identifier string, never
//! the claim object itself: the identifier already covers the claim's whole
//! DAG through the canonical encoding. Keys and signatures travel as
//! lowercase hex.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identifier::Identifier;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed {role} key: {reason}")]
    MalformedKey { role: &'static str, reason: String },
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature does not verify for claim {claim}")]
    Invalid { claim: Identifier },
}

/// An agent's key pair, as stored in the agent profile store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    #[serde(rename = "public-key")]
    pub public_key: String,
    #[serde(rename = "private-key")]
    pub private_key: String,
}

impl AgentProfile {
    /// Generate a fresh ed25519 key pair.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        Self {
            public_key: hex::encode(signing.verifying_key().to_bytes()),
            private_key: hex::encode(signing.to_bytes()),
        }
    }
}

fn decode_key(role: &'static str, hex_key: &str) -> Result<[u8; 32], SignatureError> {
    let bytes = hex::decode(hex_key).map_err(|e| SignatureError::MalformedKey {
        role,
        reason: e.to_string(),
    })?;
    bytes
        .try_into()
        .map_err(|_| SignatureError::MalformedKey {
            role,
            reason: "expected 32 bytes".to_string(),
        })
}

/// Sign a claim identifier with the agent's private key.
pub fn sign_claim(agent: &AgentProfile, claim: &Identifier) -> Result<String, SignatureError> {
    let secret = decode_key("private", &agent.private_key)?;
    let signing = SigningKey::from_bytes(&secret);
    let signature = signing.sign(claim.as_str().as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Verify a claim signature against the embedded public key.
pub fn verify_claim(
    public_key: &str,
    claim: &Identifier,
    signature: &str,
) -> Result<(), SignatureError> {
    let key = VerifyingKey::from_bytes(&decode_key("public", public_key)?).map_err(|e| {
        SignatureError::MalformedKey {
            role: "public",
            reason: e.to_string(),
        }
    })?;
    let raw = hex::decode(signature)
        .map_err(|e| SignatureError::MalformedSignature(e.to_string()))?;
    let raw: [u8; 64] = raw
        .try_into()
        .map_err(|_| SignatureError::MalformedSignature("expected 64 bytes".to_string()))?;
    key.verify(claim.as_str().as_bytes(), &Signature::from_bytes(&raw))
        .map_err(|_| SignatureError::Invalid {
            claim: claim.clone(),
        })
}

/// Public fingerprint of an agent key, for consumer-facing output.
pub fn fingerprint(public_key: &str) -> String {
    hex::encode(Sha256::digest(public_key.as_bytes()))
}
