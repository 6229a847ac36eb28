//! Claimgraph data model
//!
//! The types in this crate define the wire contract of the claimgraph object
//! graph: every published object is one of the recognized formats in
//! [`node::Node`], encoded canonically to CBOR and addressed by the SHA-256
//! digest of those bytes ([`encoding::identify`]).
//!
//! Published objects are immutable. Identity is the content identifier, so
//! re-encoding the same logical object in any session reproduces the same
//! identifier; the publish engine's idempotence rests on that property.

pub mod encoding;
pub mod identifier;
pub mod node;
pub mod signature;

pub use encoding::{decode_node, encode_node, identify, identify_bytes, EncodingError};
pub use identifier::{Identifier, IdentifierError};
pub use node::{Format, Link, ModeKeyword, ModeValue, Node, Parameter};
pub use signature::{fingerprint, sign_claim, verify_claim, AgentProfile, SignatureError};
