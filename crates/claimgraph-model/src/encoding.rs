//! Canonical encoding and identifier derivation.
//!
//! Canonical bytes are the CBOR encoding of the typed [`Node`]. Determinism
//! holds because struct fields encode in declaration order, opaque values are
//! `serde_json::Value` whose object keys iterate in sorted order, and nested
//! references encode as link markers rather than inlined child bytes. The
//! identifier is the SHA-256 digest of the canonical bytes.

use sha2::{Digest, Sha256};

use crate::identifier::Identifier;
use crate::node::Node;

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("canonical encoding failed: {0}")]
    Encode(String),
    #[error("canonical decoding failed: {0}")]
    Decode(String),
}

/// Encode a node to its canonical bytes.
pub fn encode_node(node: &Node) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    ciborium::into_writer(node, &mut out).map_err(|e| EncodingError::Encode(e.to_string()))?;
    Ok(out)
}

/// Decode a node from canonical bytes.
pub fn decode_node(bytes: &[u8]) -> Result<Node, EncodingError> {
    ciborium::from_reader(bytes).map_err(|e| EncodingError::Decode(e.to_string()))
}

/// Identifier of a raw block.
pub fn identify_bytes(bytes: &[u8]) -> Identifier {
    Identifier::from_digest(Sha256::digest(bytes).into())
}

/// Identifier of a node: digest of its canonical encoding.
pub fn identify(node: &Node) -> Result<Identifier, EncodingError> {
    Ok(identify_bytes(&encode_node(node)?))
}
