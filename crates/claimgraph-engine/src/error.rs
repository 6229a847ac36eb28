//! Engine error taxonomy.
//!
//! Every failure class has its own type; this enum aggregates them at the
//! public API boundary. No sub-step failure is swallowed: any error aborts
//! the enclosing publish/retrieve/apply call with no partial commit and no
//! partial bundle.

use claimgraph_model::{EncodingError, SignatureError};
use claimgraph_store::{ResolutionError, StoreError};

use crate::apply::ParameterMismatchError;
use crate::retrieve::ShapeError;
use crate::validate::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incomplete local object, with a dotted path.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown local name or unresolvable profile lookup.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Content store unavailable or block missing after the gateway
    /// fallback.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Claim signature failed to verify during retrieval.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Published object found with the wrong format during retrieval.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// Apply-time arity/language/fingerprint mismatch.
    #[error(transparent)]
    ParameterMismatch(#[from] ParameterMismatchError),

    /// Canonical encode/decode failure.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
