//! Top-down reconstitution of published DAGs.
//!
//! Retrieval is two passes. [`ensure_dag`] walks the link graph breadth-first
//! and makes every reachable block locally readable (pulling through the
//! store's remote fallback where it has one), so the typed walk that follows
//! never blocks on the network. The walk itself decodes each node into a
//! consumer-facing view and collects shared structure into deduplicated
//! bundle sections keyed by identifier.
//!
//! Assertion signatures are verified before the claim is walked; a bundle
//! never contains claim content whose signature did not check out. Agents
//! appear only as key fingerprints.

use std::collections::{BTreeMap, HashSet, VecDeque};

use claimgraph_model::{
    decode_node, fingerprint, verify_claim, Format, Identifier, ModeKeyword, ModeValue, Node,
    Parameter,
};
use claimgraph_store::ContentStore;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// A published object whose format does not fit where the walk found it.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("object {id} is a {found}, expected a {expected}")]
pub struct ShapeError {
    pub id: Identifier,
    pub expected: &'static str,
    pub found: Format,
}

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageInfo {
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextView {
    pub language: Identifier,
    pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaView {
    pub language: Identifier,
    pub content: String,
    pub context: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequentView {
    pub dependencies: Vec<Identifier>,
    pub conclusion: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModeView {
    Keyword(ModeKeyword),
    Tool(Identifier),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionView {
    pub sequent: SequentView,
    pub mode: Option<ModeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimView {
    pub production: ProductionView,
    pub annotation: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssertionView {
    /// Fingerprint of the asserting key, never the key itself.
    pub agent: String,
    pub claim: ClaimView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbstractionView {
    pub formula: Identifier,
    #[serde(rename = "abstracted-formula")]
    pub abstracted_formula: Identifier,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentView {
    pub language: Identifier,
    pub identifier: String,
    pub fingerprint: String,
    pub context: Identifier,
}

/// The typed rendering of the bundle root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum BundlePayload {
    Context(ContextView),
    AnnotatedContext {
        context: ContextView,
        annotation: Value,
    },
    Formula(FormulaView),
    AnnotatedFormula {
        formula: FormulaView,
        annotation: Value,
    },
    Sequent(SequentView),
    AnnotatedSequent {
        sequent: SequentView,
        annotation: Value,
    },
    Production(ProductionView),
    AnnotatedProduction {
        production: ProductionView,
        annotation: Value,
    },
    Assertion(AssertionView),
    Abstraction(AbstractionView),
    Argument(ArgumentView),
    Collection {
        name: String,
        elements: Vec<BundlePayload>,
    },
}

/// A fully reconstituted DAG: the root's typed payload plus deduplicated
/// sections of everything it shares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bundle {
    pub root: Identifier,
    pub payload: BundlePayload,
    pub languages: BTreeMap<Identifier, LanguageInfo>,
    pub contexts: BTreeMap<Identifier, ContextView>,
    pub formulas: BTreeMap<Identifier, FormulaView>,
    pub tools: BTreeMap<Identifier, ToolInfo>,
}

// ============================================================================
// Availability pass
// ============================================================================

/// Make every block reachable from `root` locally readable.
pub async fn ensure_dag(store: &dyn ContentStore, root: &Identifier) -> Result<(), Error> {
    let mut queue = VecDeque::from([root.clone()]);
    let mut seen: HashSet<Identifier> = HashSet::from([root.clone()]);
    while let Some(id) = queue.pop_front() {
        store.ensure_available(&id).await?;
        let node = decode_node(&store.get(&id).await?)?;
        for child in node.links() {
            if seen.insert(child.clone()) {
                queue.push_back(child);
            }
        }
    }
    tracing::debug!(root = %root, blocks = seen.len(), "dag available");
    Ok(())
}

// ============================================================================
// Typed walk
// ============================================================================

fn unexpected(id: &Identifier, found: &Node, expected: &'static str) -> Error {
    Error::from(ShapeError {
        id: id.clone(),
        expected,
        found: found.format(),
    })
}

struct Walker<'a> {
    store: &'a dyn ContentStore,
    languages: BTreeMap<Identifier, LanguageInfo>,
    contexts: BTreeMap<Identifier, ContextView>,
    formulas: BTreeMap<Identifier, FormulaView>,
    tools: BTreeMap<Identifier, ToolInfo>,
}

impl<'a> Walker<'a> {
    fn new(store: &'a dyn ContentStore) -> Self {
        Self {
            store,
            languages: BTreeMap::new(),
            contexts: BTreeMap::new(),
            formulas: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }

    async fn fetch(&self, id: &Identifier) -> Result<Node, Error> {
        Ok(decode_node(&self.store.get(id).await?)?)
    }

    async fn record_language(&mut self, id: &Identifier) -> Result<(), Error> {
        if self.languages.contains_key(id) {
            return Ok(());
        }
        match self.fetch(id).await? {
            Node::Language { content } => {
                self.languages.insert(id.clone(), LanguageInfo { content });
                Ok(())
            }
            other => Err(unexpected(id, &other, "language")),
        }
    }

    async fn record_tool(&mut self, id: &Identifier) -> Result<(), Error> {
        if self.tools.contains_key(id) {
            return Ok(());
        }
        match self.fetch(id).await? {
            Node::Tool { content } => {
                self.tools.insert(id.clone(), ToolInfo { content });
                Ok(())
            }
            other => Err(unexpected(id, &other, "tool")),
        }
    }

    async fn context_view(&mut self, id: &Identifier) -> Result<ContextView, Error> {
        if let Some(view) = self.contexts.get(id) {
            return Ok(view.clone());
        }
        match self.fetch(id).await? {
            Node::Context { language, content } => {
                self.record_language(&language.target).await?;
                let view = ContextView {
                    language: language.target,
                    content,
                };
                self.contexts.insert(id.clone(), view.clone());
                Ok(view)
            }
            other => Err(unexpected(id, &other, "context")),
        }
    }

    async fn formula_view(&mut self, id: &Identifier) -> Result<FormulaView, Error> {
        if let Some(view) = self.formulas.get(id) {
            return Ok(view.clone());
        }
        match self.fetch(id).await? {
            Node::Formula {
                language,
                content,
                context,
            } => {
                self.record_language(&language.target).await?;
                let mut context_ids = Vec::with_capacity(context.len());
                for link in context {
                    self.context_view(&link.target).await?;
                    context_ids.push(link.target);
                }
                let view = FormulaView {
                    language: language.target,
                    content,
                    context: context_ids,
                };
                self.formulas.insert(id.clone(), view.clone());
                Ok(view)
            }
            other => Err(unexpected(id, &other, "formula")),
        }
    }

    async fn sequent_view(&mut self, id: &Identifier) -> Result<SequentView, Error> {
        match self.fetch(id).await? {
            Node::Sequent {
                dependencies,
                conclusion,
            } => {
                let mut dependency_ids = Vec::with_capacity(dependencies.len());
                for link in dependencies {
                    self.sequent_member(&link.target).await?;
                    dependency_ids.push(link.target);
                }
                self.sequent_member(&conclusion.target).await?;
                Ok(SequentView {
                    dependencies: dependency_ids,
                    conclusion: conclusion.target,
                })
            }
            other => Err(unexpected(id, &other, "sequent")),
        }
    }

    /// Instantiation derivations record sequents over abstraction and
    /// argument nodes, not only formulas.
    async fn sequent_member(&mut self, id: &Identifier) -> Result<(), Error> {
        match self.fetch(id).await? {
            Node::Formula { .. } => {
                self.formula_view(id).await?;
            }
            Node::Abstraction {
                formula,
                abstracted_formula,
                ..
            } => {
                self.formula_view(&formula.target).await?;
                self.formula_view(&abstracted_formula.target).await?;
            }
            Node::Argument {
                language, context, ..
            } => {
                self.record_language(&language.target).await?;
                self.context_view(&context.target).await?;
            }
            other => return Err(unexpected(id, &other, "formula, abstraction, or argument")),
        }
        Ok(())
    }

    async fn production_view(&mut self, id: &Identifier) -> Result<ProductionView, Error> {
        match self.fetch(id).await? {
            Node::Production { sequent, mode } => {
                let sequent = self.sequent_view(&sequent.target).await?;
                let mode = match mode {
                    None => None,
                    Some(ModeValue::Keyword(keyword)) => Some(ModeView::Keyword(keyword)),
                    Some(ModeValue::Tool(link)) => {
                        self.record_tool(&link.target).await?;
                        Some(ModeView::Tool(link.target))
                    }
                };
                Ok(ProductionView { sequent, mode })
            }
            other => Err(unexpected(id, &other, "production")),
        }
    }

    async fn claim_view(&mut self, id: &Identifier) -> Result<ClaimView, Error> {
        match self.fetch(id).await? {
            Node::Production { .. } => Ok(ClaimView {
                production: self.production_view(id).await?,
                annotation: None,
            }),
            Node::AnnotatedProduction {
                production,
                annotation,
            } => Ok(ClaimView {
                production: self.production_view(&production.target).await?,
                annotation: Some(annotation),
            }),
            other => Err(unexpected(id, &other, "production")),
        }
    }

    async fn assertion_view(&mut self, id: &Identifier) -> Result<AssertionView, Error> {
        match self.fetch(id).await? {
            Node::Assertion {
                agent,
                claim,
                signature,
            } => {
                // Verify before touching the claim: an unverifiable
                // assertion contributes nothing to the bundle.
                verify_claim(&agent, &claim.target, &signature)?;
                Ok(AssertionView {
                    agent: fingerprint(&agent),
                    claim: self.claim_view(&claim.target).await?,
                })
            }
            other => Err(unexpected(id, &other, "assertion")),
        }
    }

    /// Payload of one non-collection element.
    async fn element_payload(&mut self, id: &Identifier) -> Result<BundlePayload, Error> {
        match self.fetch(id).await? {
            Node::Context { .. } => Ok(BundlePayload::Context(self.context_view(id).await?)),
            Node::AnnotatedContext {
                context,
                annotation,
            } => Ok(BundlePayload::AnnotatedContext {
                context: self.context_view(&context.target).await?,
                annotation,
            }),
            Node::Formula { .. } => Ok(BundlePayload::Formula(self.formula_view(id).await?)),
            Node::AnnotatedFormula {
                formula,
                annotation,
            } => Ok(BundlePayload::AnnotatedFormula {
                formula: self.formula_view(&formula.target).await?,
                annotation,
            }),
            Node::Sequent { .. } => Ok(BundlePayload::Sequent(self.sequent_view(id).await?)),
            Node::AnnotatedSequent {
                sequent,
                annotation,
            } => Ok(BundlePayload::AnnotatedSequent {
                sequent: self.sequent_view(&sequent.target).await?,
                annotation,
            }),
            Node::Production { .. } => {
                Ok(BundlePayload::Production(self.production_view(id).await?))
            }
            Node::AnnotatedProduction {
                production,
                annotation,
            } => Ok(BundlePayload::AnnotatedProduction {
                production: self.production_view(&production.target).await?,
                annotation,
            }),
            Node::Assertion { .. } => {
                Ok(BundlePayload::Assertion(self.assertion_view(id).await?))
            }
            Node::Abstraction {
                formula,
                abstracted_formula,
                parameters,
            } => {
                self.formula_view(&formula.target).await?;
                self.formula_view(&abstracted_formula.target).await?;
                Ok(BundlePayload::Abstraction(AbstractionView {
                    formula: formula.target,
                    abstracted_formula: abstracted_formula.target,
                    parameters,
                }))
            }
            Node::Argument {
                language,
                identifier,
                fingerprint: print,
                context,
            } => {
                self.record_language(&language.target).await?;
                self.context_view(&context.target).await?;
                Ok(BundlePayload::Argument(ArgumentView {
                    language: language.target,
                    identifier,
                    fingerprint: print,
                    context: context.target,
                }))
            }
            other => Err(unexpected(id, &other, "retrievable object")),
        }
    }

    async fn root_payload(&mut self, id: &Identifier) -> Result<BundlePayload, Error> {
        match self.fetch(id).await? {
            Node::Collection { name, elements } => {
                let mut payloads = Vec::with_capacity(elements.len());
                for link in elements {
                    payloads.push(self.element_payload(&link.target).await?);
                }
                Ok(BundlePayload::Collection {
                    name,
                    elements: payloads,
                })
            }
            _ => self.element_payload(id).await,
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Reconstitute the DAG under `root` into a [`Bundle`].
pub async fn reconstitute(store: &dyn ContentStore, root: &Identifier) -> Result<Bundle, Error> {
    ensure_dag(store, root).await?;
    let mut walker = Walker::new(store);
    let payload = walker.root_payload(root).await?;
    tracing::info!(
        root = %root,
        formulas = walker.formulas.len(),
        contexts = walker.contexts.len(),
        "reconstituted bundle"
    );
    Ok(Bundle {
        root: root.clone(),
        payload,
        languages: walker.languages,
        contexts: walker.contexts,
        formulas: walker.formulas,
        tools: walker.tools,
    })
}
