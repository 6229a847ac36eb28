//! Bottom-up publication of local input documents.
//!
//! Publication resolves every reference in a validated document to a content
//! identifier, staging the canonical bytes of each newly constructed node in
//! a session batch. Children are staged before their parents, and nothing
//! reaches the store until the single [`Session::commit`] at the end, so a
//! failed publish leaves no partial graph behind.
//!
//! Two memo layers keep re-publication cheap and correct:
//!
//! - [`Session`] memoizes language, tool, and agent profile lookups for the
//!   whole call, since those names mean the same thing everywhere.
//! - [`DocScope`] memoizes local `contexts`/`formulas` names per document,
//!   since the same short name may denote different objects in different
//!   documents.

use std::collections::{HashMap, HashSet};

use claimgraph_model::{
    decode_node, encode_node, identify_bytes, sign_claim, AgentProfile, Format, Identifier, Link,
    ModeKeyword, ModeValue, Node,
};
use claimgraph_store::{Block, ContentStore, ProfileStore, ResolutionError};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::validate::{validate_document, ValidationError};

// ============================================================================
// Field extraction
// ============================================================================

// Documents are validated before these run; failures here still surface as
// path-tagged validation errors rather than panics.

pub(crate) fn str_field<'v>(obj: &'v Value, key: &str) -> Result<&'v str, Error> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::new(key, "not a string").into())
}

pub(crate) fn array_field<'v>(obj: &'v Value, key: &str) -> Result<&'v Vec<Value>, Error> {
    obj.get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::new(key, "not an array").into())
}

pub(crate) fn parse_reference(s: &str, at: &str) -> Result<Identifier, Error> {
    s.parse()
        .map_err(|e: claimgraph_model::IdentifierError| ValidationError::new(at, e.to_string()).into())
}

// ============================================================================
// Session
// ============================================================================

/// One publish call's worth of state: profile memos plus the block batch.
pub(crate) struct Session<'a> {
    store: &'a dyn ContentStore,
    profiles: &'a dyn ProfileStore,
    languages: HashMap<String, Identifier>,
    tools: HashMap<String, Identifier>,
    agents: HashMap<String, AgentProfile>,
    context_languages: HashMap<Identifier, Identifier>,
    batch: Vec<Block>,
    batch_ids: HashSet<Identifier>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(store: &'a dyn ContentStore, profiles: &'a dyn ProfileStore) -> Self {
        Self {
            store,
            profiles,
            languages: HashMap::new(),
            tools: HashMap::new(),
            agents: HashMap::new(),
            context_languages: HashMap::new(),
            batch: Vec::new(),
            batch_ids: HashSet::new(),
        }
    }

    /// Stage a node's canonical bytes; returns its identifier. Duplicate
    /// nodes stage once.
    pub(crate) fn add_node(&mut self, node: &Node) -> Result<Identifier, Error> {
        let bytes = encode_node(node)?;
        let id = identify_bytes(&bytes);
        if self.batch_ids.insert(id.clone()) {
            tracing::debug!(id = %id, format = node.format().as_str(), "staged block");
            self.batch.push((id.clone(), bytes));
        }
        Ok(id)
    }

    pub(crate) fn staged(&self) -> usize {
        self.batch.len()
    }

    /// Persist the whole batch as a unit.
    pub(crate) async fn commit(self) -> Result<(), Error> {
        if !self.batch.is_empty() {
            self.store.put_many(self.batch).await?;
        }
        Ok(())
    }

    /// Resolve a language reference: a published identifier passes through,
    /// anything else is a profile name.
    pub(crate) async fn language_id(&mut self, name: &str) -> Result<Identifier, Error> {
        if Identifier::is_reference(name) {
            return parse_reference(name, "language");
        }
        if let Some(id) = self.languages.get(name) {
            return Ok(id.clone());
        }
        let id = self.profiles.resolve_language(name).await?;
        self.languages.insert(name.to_string(), id.clone());
        Ok(id)
    }

    pub(crate) async fn tool_id(&mut self, name: &str) -> Result<Identifier, Error> {
        if Identifier::is_reference(name) {
            return parse_reference(name, "mode");
        }
        if let Some(id) = self.tools.get(name) {
            return Ok(id.clone());
        }
        let id = self.profiles.resolve_tool(name).await?;
        self.tools.insert(name.to_string(), id.clone());
        Ok(id)
    }

    /// Language of an already-published context, read back from the store.
    pub(crate) async fn context_language(&mut self, id: &Identifier) -> Result<Identifier, Error> {
        if let Some(language) = self.context_languages.get(id) {
            return Ok(language.clone());
        }
        match decode_node(&self.store.get(id).await?)? {
            Node::Context { language, .. } => {
                self.context_languages
                    .insert(id.clone(), language.target.clone());
                Ok(language.target)
            }
            other => Err(ValidationError::new(
                id.as_str(),
                format!("expected a context, found {}", other.format()),
            )
            .into()),
        }
    }

    pub(crate) async fn agent_profile(&mut self, name: &str) -> Result<AgentProfile, Error> {
        if let Some(profile) = self.agents.get(name) {
            return Ok(profile.clone());
        }
        let profile = self.profiles.resolve_agent(name).await?;
        self.agents.insert(name.to_string(), profile.clone());
        Ok(profile)
    }
}

// ============================================================================
// Document scope
// ============================================================================

/// Per-document local name tables and their publication memos.
pub(crate) struct DocScope<'d> {
    contexts_table: Option<&'d Map<String, Value>>,
    formulas_table: Option<&'d Map<String, Value>>,
    contexts: HashMap<String, Identifier>,
    formulas: HashMap<String, Identifier>,
}

impl<'d> DocScope<'d> {
    pub(crate) fn for_document(doc: &'d Value) -> Self {
        let table = |key: &str| doc.get(key).and_then(Value::as_object);
        Self {
            contexts_table: table("contexts"),
            formulas_table: table("formulas"),
            contexts: HashMap::new(),
            formulas: HashMap::new(),
        }
    }

    pub(crate) fn local_context(&self, name: &str) -> Result<&'d Value, ResolutionError> {
        self.contexts_table
            .and_then(|t| t.get(name))
            .ok_or_else(|| ResolutionError::UnknownLocal {
                table: "contexts",
                name: name.to_string(),
            })
    }

    fn local_formula(&self, name: &str) -> Result<&'d Value, ResolutionError> {
        self.formulas_table
            .and_then(|t| t.get(name))
            .ok_or_else(|| ResolutionError::UnknownLocal {
                table: "formulas",
                name: name.to_string(),
            })
    }
}

// ============================================================================
// Per-format publication
// ============================================================================

pub(crate) async fn publish_context(
    session: &mut Session<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let language = session.language_id(str_field(obj, "language")?).await?;
    let content = array_field(obj, "content")?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ValidationError::new("content", "not a string").into())
        })
        .collect::<Result<Vec<_>, Error>>()?;
    session.add_node(&Node::Context {
        language: Link::to(language),
        content,
    })
}

pub(crate) async fn resolve_context(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    reference: &str,
) -> Result<Identifier, Error> {
    if Identifier::is_reference(reference) {
        return parse_reference(reference, "context");
    }
    if let Some(id) = scope.contexts.get(reference) {
        return Ok(id.clone());
    }
    let local = scope.local_context(reference)?;
    let id = publish_context(session, local).await?;
    scope.contexts.insert(reference.to_string(), id.clone());
    Ok(id)
}

pub(crate) async fn publish_formula(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let language = session.language_id(str_field(obj, "language")?).await?;
    let content = str_field(obj, "content")?.to_string();
    let mut context = Vec::new();
    for (index, reference) in array_field(obj, "context")?.iter().enumerate() {
        let name = reference
            .as_str()
            .ok_or_else(|| ValidationError::new("context", "not a string"))?;
        let id = resolve_context(session, scope, name).await?;
        // Every context of a formula shares the formula's language. Local
        // contexts are checked against their declared language, published
        // references against the stored node.
        let context_language = if Identifier::is_reference(name) {
            session.context_language(&id).await?
        } else {
            let local = scope.local_context(name)?;
            session.language_id(str_field(local, "language")?).await?
        };
        if context_language != language {
            return Err(ValidationError::new(
                format!("context.{index}"),
                format!(
                    "context language {context_language} does not match formula language {language}"
                ),
            )
            .into());
        }
        context.push(Link::to(id));
    }
    session.add_node(&Node::Formula {
        language: Link::to(language),
        content,
        context,
    })
}

async fn resolve_formula(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    reference: &str,
) -> Result<Identifier, Error> {
    if Identifier::is_reference(reference) {
        return parse_reference(reference, "formula");
    }
    if let Some(id) = scope.formulas.get(reference) {
        return Ok(id.clone());
    }
    let local = scope.local_formula(reference)?;
    let id = publish_formula(session, scope, local).await?;
    scope.formulas.insert(reference.to_string(), id.clone());
    Ok(id)
}

pub(crate) async fn publish_sequent(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let mut dependencies = Vec::new();
    for dependency in array_field(obj, "dependencies")? {
        let name = dependency
            .as_str()
            .ok_or_else(|| ValidationError::new("dependencies", "not a string"))?;
        dependencies.push(Link::to(resolve_formula(session, scope, name).await?));
    }
    let conclusion = resolve_formula(session, scope, str_field(obj, "conclusion")?).await?;
    session.add_node(&Node::Sequent {
        dependencies,
        conclusion: Link::to(conclusion),
    })
}

pub(crate) async fn publish_production(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let sequent = match obj.get("sequent") {
        Some(Value::String(reference)) => parse_reference(reference, "sequent")?,
        Some(inline) => publish_sequent(session, scope, inline).await?,
        None => return Err(ValidationError::new("", "lacks a \"sequent\" key").into()),
    };
    let mode = match obj.get("mode") {
        None | Some(Value::Null) => None,
        Some(Value::String(mode)) => match mode.as_str() {
            "axiom" => Some(ModeValue::Keyword(ModeKeyword::Axiom)),
            "conjecture" => Some(ModeValue::Keyword(ModeKeyword::Conjecture)),
            name => Some(ModeValue::Tool(Link::to(session.tool_id(name).await?))),
        },
        Some(_) => return Err(ValidationError::new("mode", "not null or a string").into()),
    };
    session.add_node(&Node::Production {
        sequent: Link::to(sequent),
        mode,
    })
}

pub(crate) async fn publish_assertion(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let claim = match obj.get("claim") {
        Some(Value::String(reference)) => parse_reference(reference, "claim")?,
        Some(inline) => match str_field(inline, "format")? {
            "production" => publish_production(session, scope, inline).await?,
            "annotated-production" => {
                publish_annotated(session, scope, Format::Production, inline).await?
            }
            other => {
                return Err(ValidationError::new(
                    "claim.format",
                    format!("claim must be a production, found {other:?}"),
                )
                .into())
            }
        },
        None => return Err(ValidationError::new("", "lacks a \"claim\" key").into()),
    };
    let agent = session.agent_profile(str_field(obj, "agent")?).await?;
    let signature = sign_claim(&agent, &claim)?;
    session.add_node(&Node::Assertion {
        agent: agent.public_key,
        claim: Link::to(claim),
        signature,
    })
}

pub(crate) async fn publish_annotated(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    inner: Format,
    obj: &Value,
) -> Result<Identifier, Error> {
    let key = inner.as_str();
    let target = match obj.get(key) {
        Some(Value::String(reference)) => parse_reference(reference, key)?,
        Some(inline) => match inner {
            Format::Context => publish_context(session, inline).await?,
            Format::Formula => publish_formula(session, scope, inline).await?,
            Format::Sequent => publish_sequent(session, scope, inline).await?,
            Format::Production => publish_production(session, scope, inline).await?,
            other => {
                return Err(
                    ValidationError::new(key, format!("{other} cannot be annotated")).into(),
                )
            }
        },
        None => return Err(ValidationError::new("", format!("lacks a {key:?} key")).into()),
    };
    let annotation = obj
        .get("annotation")
        .cloned()
        .ok_or_else(|| ValidationError::new("", "lacks an \"annotation\" key"))?;
    let link = Link::to(target);
    let node = match inner {
        Format::Context => Node::AnnotatedContext {
            context: link,
            annotation,
        },
        Format::Formula => Node::AnnotatedFormula {
            formula: link,
            annotation,
        },
        Format::Sequent => Node::AnnotatedSequent {
            sequent: link,
            annotation,
        },
        Format::Production => Node::AnnotatedProduction {
            production: link,
            annotation,
        },
        other => {
            return Err(ValidationError::new(key, format!("{other} cannot be annotated")).into())
        }
    };
    session.add_node(&node)
}

/// Publish one non-collection publishable object.
pub(crate) async fn publish_element(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let format: Format = str_field(obj, "format")?
        .parse()
        .map_err(|e: claimgraph_model::node::UnknownFormat| {
            Error::from(ValidationError::new("format", e.to_string()))
        })?;
    match format {
        Format::Context => publish_context(session, obj).await,
        Format::Formula => publish_formula(session, scope, obj).await,
        Format::Sequent => publish_sequent(session, scope, obj).await,
        Format::Production => publish_production(session, scope, obj).await,
        Format::Assertion => publish_assertion(session, scope, obj).await,
        Format::AnnotatedContext => {
            publish_annotated(session, scope, Format::Context, obj).await
        }
        Format::AnnotatedFormula => {
            publish_annotated(session, scope, Format::Formula, obj).await
        }
        Format::AnnotatedSequent => {
            publish_annotated(session, scope, Format::Sequent, obj).await
        }
        Format::AnnotatedProduction => {
            publish_annotated(session, scope, Format::Production, obj).await
        }
        other => Err(ValidationError::new(
            "format",
            format!("{other} is not a publishable input format"),
        )
        .into()),
    }
}

async fn publish_collection(
    session: &mut Session<'_>,
    scope: &mut DocScope<'_>,
    obj: &Value,
) -> Result<Identifier, Error> {
    let name = str_field(obj, "name")?.to_string();
    let mut elements = Vec::new();
    for element in array_field(obj, "elements")? {
        elements.push(Link::to(publish_element(session, scope, element).await?));
    }
    session.add_node(&Node::Collection { name, elements })
}

// ============================================================================
// Entry point
// ============================================================================

/// Validate and publish one input document; returns the root identifier.
///
/// All staged blocks commit together after the whole document resolves, so
/// any failure leaves the store untouched.
pub async fn publish(
    store: &dyn ContentStore,
    profiles: &dyn ProfileStore,
    document: &Value,
) -> Result<Identifier, Error> {
    validate_document(document)?;
    let mut session = Session::new(store, profiles);
    let mut scope = DocScope::for_document(document);
    let root = if str_field(document, "format")? == "collection" {
        publish_collection(&mut session, &mut scope, document).await?
    } else {
        publish_element(&mut session, &mut scope, document).await?
    };
    let blocks = session.staged();
    session.commit().await?;
    tracing::info!(root = %root, blocks, "published document");
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimgraph_model::{decode_node, verify_claim};
    use claimgraph_store::{MemoryProfiles, MemoryStore};
    use serde_json::json;

    fn language() -> Identifier {
        Identifier::from_digest([1u8; 32])
    }

    fn tool() -> Identifier {
        Identifier::from_digest([2u8; 32])
    }

    fn profiles() -> (MemoryProfiles, AgentProfile) {
        let agent = AgentProfile::generate();
        let profiles = MemoryProfiles::new()
            .with_language("fol", language())
            .with_tool("prover", tool())
            .with_agent("alice", agent.clone());
        (profiles, agent)
    }

    fn formula_doc() -> Value {
        json!({
            "format": "formula",
            "language": "fol",
            "content": "p -> q",
            "context": ["base"],
            "contexts": {
                "base": { "language": "fol", "content": ["p : prop.", "q : prop."] }
            }
        })
    }

    #[tokio::test]
    async fn formula_publishes_context_first() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let root = publish(&store, &profiles, &formula_doc()).await.unwrap();

        assert_eq!(store.len(), 2);
        let node = decode_node(&store.get(&root).await.unwrap()).unwrap();
        match node {
            Node::Formula {
                language: lang,
                content,
                context,
            } => {
                assert_eq!(lang.target, language());
                assert_eq!(content, "p -> q");
                assert_eq!(context.len(), 1);
                assert!(store.has(&context[0].target).await);
            }
            other => panic!("expected formula, got {:?}", other.format()),
        }
    }

    #[tokio::test]
    async fn republishing_is_idempotent() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let first = publish(&store, &profiles, &formula_doc()).await.unwrap();
        let blocks = store.len();
        let second = publish(&store, &profiles, &formula_doc()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), blocks);
    }

    #[tokio::test]
    async fn shared_local_context_publishes_once() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let doc = json!({
            "format": "sequent",
            "conclusion": "q",
            "dependencies": ["p"],
            "formulas": {
                "p": { "language": "fol", "content": "p", "context": ["base"] },
                "q": { "language": "fol", "content": "q", "context": ["base"] }
            },
            "contexts": {
                "base": { "language": "fol", "content": ["p : prop.", "q : prop."] }
            }
        });
        publish(&store, &profiles, &doc).await.unwrap();
        // one context, two formulas, one sequent
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn assertion_signature_verifies_against_the_claim() {
        let store = MemoryStore::new();
        let (profiles, agent) = profiles();
        let doc = json!({
            "format": "assertion",
            "agent": "alice",
            "claim": {
                "format": "production",
                "mode": "prover",
                "sequent": { "conclusion": "goal", "dependencies": [] }
            },
            "formulas": {
                "goal": { "language": "fol", "content": "q", "context": [] }
            }
        });
        let root = publish(&store, &profiles, &doc).await.unwrap();
        match decode_node(&store.get(&root).await.unwrap()).unwrap() {
            Node::Assertion {
                agent: key,
                claim,
                signature,
            } => {
                assert_eq!(key, agent.public_key);
                verify_claim(&key, &claim.target, &signature).unwrap();
                match decode_node(&store.get(&claim.target).await.unwrap()).unwrap() {
                    Node::Production { mode, .. } => {
                        assert_eq!(mode, Some(ModeValue::Tool(Link::to(tool()))));
                    }
                    other => panic!("expected production, got {:?}", other.format()),
                }
            }
            other => panic!("expected assertion, got {:?}", other.format()),
        }
    }

    #[tokio::test]
    async fn collection_preserves_element_order() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let doc = json!({
            "format": "collection",
            "name": "library",
            "elements": [
                { "format": "formula", "language": "fol", "content": "a", "context": [] },
                { "format": "formula", "language": "fol", "content": "b", "context": [] }
            ]
        });
        let root = publish(&store, &profiles, &doc).await.unwrap();
        match decode_node(&store.get(&root).await.unwrap()).unwrap() {
            Node::Collection { name, elements } => {
                assert_eq!(name, "library");
                let contents: Vec<String> = {
                    let mut out = Vec::new();
                    for link in &elements {
                        match decode_node(&store.get(&link.target).await.unwrap()).unwrap() {
                            Node::Formula { content, .. } => out.push(content),
                            other => panic!("expected formula, got {:?}", other.format()),
                        }
                    }
                    out
                };
                assert_eq!(contents, ["a", "b"]);
            }
            other => panic!("expected collection, got {:?}", other.format()),
        }
    }

    #[tokio::test]
    async fn formula_rejects_context_of_another_language() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let profiles = profiles.with_language("hol", Identifier::from_digest([9u8; 32]));
        let doc = json!({
            "format": "formula",
            "language": "fol",
            "content": "p",
            "context": ["base"],
            "contexts": {
                "base": { "language": "hol", "content": ["p : prop."] }
            }
        });
        let err = publish(&store, &profiles, &doc).await.unwrap_err();
        match err {
            Error::Validation(err) => {
                assert_eq!(err.path, "context.0");
                assert!(err.message.contains("does not match formula language"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn formula_rejects_published_context_of_another_language() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let profiles = profiles.with_language("hol", Identifier::from_digest([9u8; 32]));
        let context = publish(
            &store,
            &profiles,
            &json!({ "format": "context", "language": "hol", "content": ["p : prop."] }),
        )
        .await
        .unwrap();
        let doc = json!({
            "format": "formula",
            "language": "fol",
            "content": "p",
            "context": [context.as_str()],
        });
        let err = publish(&store, &profiles, &doc).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // only the earlier context publish is in the store
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_profile_name_commits_nothing() {
        let store = MemoryStore::new();
        let profiles = MemoryProfiles::new();
        let err = publish(&store, &profiles, &formula_doc()).await.unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalid_document_is_rejected_before_any_work() {
        let store = MemoryStore::new();
        let (profiles, _) = profiles();
        let doc = json!({ "format": "formula", "language": "fol", "context": [] });
        let err = publish(&store, &profiles, &doc).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty());
    }
}
