//! Published object formats.
//!
//! One [`Node`] variant per recognized format, serde-tagged on `"format"`.
//! The field sets are the wire contract: other tools resolve and re-encode
//! these shapes bit-exact. Links are the one-key map `{"/": "<identifier>"}`
//! so the canonical encoding covers descendants without inlining their bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

// ============================================================================
// Links
// ============================================================================

/// A link field: `{"/": "<identifier>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "/")]
    pub target: Identifier,
}

impl Link {
    pub fn to(target: Identifier) -> Self {
        Self { target }
    }
}

impl From<Identifier> for Link {
    fn from(target: Identifier) -> Self {
        Self { target }
    }
}

// ============================================================================
// Production modes
// ============================================================================

/// Sentinel production modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKeyword {
    Axiom,
    Conjecture,
}

/// A non-null production mode: a sentinel keyword or a link to a tool.
///
/// The full mode field is `Option<ModeValue>`, with `None` encoding the
/// wire-level `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModeValue {
    Keyword(ModeKeyword),
    Tool(Link),
}

// ============================================================================
// Abstraction parameters
// ============================================================================

/// One positional parameter of an abstraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub identifier: String,
    pub fingerprint: String,
}

// ============================================================================
// Nodes
// ============================================================================

/// A published object, in exactly the shape it is encoded and addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum Node {
    Language {
        content: serde_json::Value,
    },
    Tool {
        content: serde_json::Value,
    },
    Context {
        language: Link,
        content: Vec<String>,
    },
    AnnotatedContext {
        context: Link,
        annotation: serde_json::Value,
    },
    Formula {
        language: Link,
        content: String,
        context: Vec<Link>,
    },
    AnnotatedFormula {
        formula: Link,
        annotation: serde_json::Value,
    },
    Sequent {
        dependencies: Vec<Link>,
        conclusion: Link,
    },
    AnnotatedSequent {
        sequent: Link,
        annotation: serde_json::Value,
    },
    Production {
        sequent: Link,
        mode: Option<ModeValue>,
    },
    AnnotatedProduction {
        production: Link,
        annotation: serde_json::Value,
    },
    Assertion {
        agent: String,
        claim: Link,
        signature: String,
    },
    Collection {
        name: String,
        elements: Vec<Link>,
    },
    Abstraction {
        formula: Link,
        #[serde(rename = "abstracted-formula")]
        abstracted_formula: Link,
        parameters: Vec<Parameter>,
    },
    Argument {
        language: Link,
        identifier: String,
        fingerprint: String,
        context: Link,
    },
}

impl Node {
    pub fn format(&self) -> Format {
        match self {
            Node::Language { .. } => Format::Language,
            Node::Tool { .. } => Format::Tool,
            Node::Context { .. } => Format::Context,
            Node::AnnotatedContext { .. } => Format::AnnotatedContext,
            Node::Formula { .. } => Format::Formula,
            Node::AnnotatedFormula { .. } => Format::AnnotatedFormula,
            Node::Sequent { .. } => Format::Sequent,
            Node::AnnotatedSequent { .. } => Format::AnnotatedSequent,
            Node::Production { .. } => Format::Production,
            Node::AnnotatedProduction { .. } => Format::AnnotatedProduction,
            Node::Assertion { .. } => Format::Assertion,
            Node::Collection { .. } => Format::Collection,
            Node::Abstraction { .. } => Format::Abstraction,
            Node::Argument { .. } => Format::Argument,
        }
    }

    /// All identifiers this node links to, in field order.
    pub fn links(&self) -> Vec<Identifier> {
        match self {
            Node::Language { .. } | Node::Tool { .. } => Vec::new(),
            Node::Context { language, .. } => vec![language.target.clone()],
            Node::AnnotatedContext { context, .. } => vec![context.target.clone()],
            Node::Formula {
                language, context, ..
            } => {
                let mut out = vec![language.target.clone()];
                out.extend(context.iter().map(|l| l.target.clone()));
                out
            }
            Node::AnnotatedFormula { formula, .. } => vec![formula.target.clone()],
            Node::Sequent {
                dependencies,
                conclusion,
            } => {
                let mut out: Vec<_> = dependencies.iter().map(|l| l.target.clone()).collect();
                out.push(conclusion.target.clone());
                out
            }
            Node::AnnotatedSequent { sequent, .. } => vec![sequent.target.clone()],
            Node::Production { sequent, mode } => {
                let mut out = vec![sequent.target.clone()];
                if let Some(ModeValue::Tool(link)) = mode {
                    out.push(link.target.clone());
                }
                out
            }
            Node::AnnotatedProduction { production, .. } => vec![production.target.clone()],
            Node::Assertion { claim, .. } => vec![claim.target.clone()],
            Node::Collection { elements, .. } => {
                elements.iter().map(|l| l.target.clone()).collect()
            }
            Node::Abstraction {
                formula,
                abstracted_formula,
                ..
            } => vec![formula.target.clone(), abstracted_formula.target.clone()],
            Node::Argument {
                language, context, ..
            } => vec![language.target.clone(), context.target.clone()],
        }
    }
}

// ============================================================================
// Format tags
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown format: {0:?}")]
pub struct UnknownFormat(pub String);

/// The format tag of a published or local object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    Language,
    Tool,
    Context,
    AnnotatedContext,
    Formula,
    AnnotatedFormula,
    Sequent,
    AnnotatedSequent,
    Production,
    AnnotatedProduction,
    Assertion,
    Collection,
    Abstraction,
    Argument,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Language => "language",
            Format::Tool => "tool",
            Format::Context => "context",
            Format::AnnotatedContext => "annotated-context",
            Format::Formula => "formula",
            Format::AnnotatedFormula => "annotated-formula",
            Format::Sequent => "sequent",
            Format::AnnotatedSequent => "annotated-sequent",
            Format::Production => "production",
            Format::AnnotatedProduction => "annotated-production",
            Format::Assertion => "assertion",
            Format::Collection => "collection",
            Format::Abstraction => "abstraction",
            Format::Argument => "argument",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "language" => Ok(Format::Language),
            "tool" => Ok(Format::Tool),
            "context" => Ok(Format::Context),
            "annotated-context" => Ok(Format::AnnotatedContext),
            "formula" => Ok(Format::Formula),
            "annotated-formula" => Ok(Format::AnnotatedFormula),
            "sequent" => Ok(Format::Sequent),
            "annotated-sequent" => Ok(Format::AnnotatedSequent),
            "production" => Ok(Format::Production),
            "annotated-production" => Ok(Format::AnnotatedProduction),
            "assertion" => Ok(Format::Assertion),
            "collection" => Ok(Format::Collection),
            "abstraction" => Ok(Format::Abstraction),
            "argument" => Ok(Format::Argument),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}
