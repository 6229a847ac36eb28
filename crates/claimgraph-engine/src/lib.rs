//! Claimgraph engines
//!
//! Three engines over the content-addressed object graph:
//!
//! - [`validate`]: tree-recursive schema checks of local input documents,
//!   with path-qualified diagnostics.
//! - [`publish`]: bottom-up resolution of a local object graph to content
//!   identifiers, with per-session memoization and a single atomic batch
//!   commit.
//! - [`retrieve`]: top-down reconstitution of a published DAG into a
//!   deduplicated [`retrieve::Bundle`], verifying assertion signatures.
//!
//! [`apply`] builds on publish to instantiate a parameterized abstraction
//! with concrete arguments, recording both derivations as signed assertions.

pub mod apply;
pub mod error;
pub mod publish;
pub mod retrieve;
pub mod validate;


pub use apply::{apply, ApplyOutcome, ParameterMismatchError, INSTANTIATION_MODE};
pub use error::Error;
pub use publish::publish;
pub use retrieve::{reconstitute, Bundle, BundlePayload, ShapeError};
pub use validate::{validate_document, ValidationError, Validator};
