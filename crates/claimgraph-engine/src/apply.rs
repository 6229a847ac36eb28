//! Instantiation of parameterized derivations.
//!
//! An abstraction document carries two formulas (the concrete one and the
//! parameterized one), a positional parameter list, and the agent under whose
//! signature the derivations are recorded. Applying it to arguments publishes
//! the abstraction itself, one argument object per parameter, the
//! instantiated formula obtained by token substitution, and two assertions:
//!
//! 1. `formula ⊢ abstraction`, under the abstraction's own mode.
//! 2. `abstraction, argument₁, …, argumentₙ ⊢ instantiated-formula`, under
//!    the [`INSTANTIATION_MODE`] tool.
//!
//! Every precondition is checked before any block is staged, and all blocks
//! commit in one batch, so a failed apply has no side effects at all.
//!
//! Substitution is whole-token: a parameter's identifier is replaced only
//! where it stands alone between whitespace, in parameter order, across the
//! abstracted formula's content, its local context declarations, and every
//! argument's context declarations. Contexts referenced by published
//! identifier are immutable and pass through untouched. A parameter token
//! that occurs inside another parameter's token makes the rewrite
//! order-dependent, so that case is rejected up front.

use claimgraph_model::{Identifier, Link, Node, Parameter};
use claimgraph_store::{ContentStore, ProfileStore};
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::publish::{
    array_field, publish_assertion, publish_formula, str_field, DocScope, Session,
};
use crate::validate::{ValidationError, Validator};

/// Tool name recorded as the mode of every instantiation derivation.
pub const INSTANTIATION_MODE: &str = "instantiation";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParameterMismatchError {
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index} language {actual:?} does not match parameter language {expected:?}")]
    Language {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("argument {index} fingerprint {actual:?} does not match parameter fingerprint {expected:?}")]
    Fingerprint {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("parameter {first} token {token:?} occurs inside parameter {second}'s token")]
    AmbiguousToken {
        first: usize,
        second: usize,
        token: String,
    },
}

/// Everything one `apply` call published.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub abstraction: Identifier,
    pub abstraction_assertion: Identifier,
    pub arguments: Vec<Identifier>,
    pub instantiated_formula: Identifier,
    pub instantiation_assertion: Identifier,
}

// ============================================================================
// Token substitution
// ============================================================================

/// Replace whole-token occurrences of `token` with `replacement`.
/// Whitespace, including runs, is preserved exactly as written.
fn substitute_token(content: &str, token: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut word_start = None;
    for (index, c) in content.char_indices() {
        if c.is_whitespace() {
            if let Some(start) = word_start.take() {
                let word = &content[start..index];
                out.push_str(if word == token { replacement } else { word });
            }
            out.push(c);
        } else if word_start.is_none() {
            word_start = Some(index);
        }
    }
    if let Some(start) = word_start {
        let word = &content[start..];
        out.push_str(if word == token { replacement } else { word });
    }
    out
}

fn substitute_all(content: &str, parameters: &[Parameter], arguments: &[Identifier]) -> String {
    let mut out = content.to_string();
    for (parameter, argument) in parameters.iter().zip(arguments) {
        out = substitute_token(&out, &parameter.identifier, argument.as_str());
    }
    out
}

fn substitute_declarations(
    declarations: &[String],
    parameters: &[Parameter],
    arguments: &[Identifier],
) -> Vec<String> {
    declarations
        .iter()
        .map(|declaration| substitute_all(declaration, parameters, arguments))
        .collect()
}

// ============================================================================
// Input checks
// ============================================================================

struct ArgumentSpec {
    language: String,
    identifier: String,
    fingerprint: String,
    context: Vec<String>,
}

fn extract_parameters(abstraction: &Value) -> Result<Vec<Parameter>, Error> {
    let raw = abstraction
        .get("parameters")
        .cloned()
        .ok_or_else(|| ValidationError::new("parameters", "lacks a \"parameters\" key"))?;
    serde_json::from_value(raw)
        .map_err(|e| ValidationError::new("parameters", e.to_string()).into())
}

fn extract_argument(index: usize, argument: &Value) -> Result<ArgumentSpec, Error> {
    let path = format!("arguments.{index}");
    let field = |key: &str| -> Result<String, Error> {
        argument
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::new(format!("{path}.{key}"), "not a string").into())
    };
    let context = argument
        .get("context")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::new(format!("{path}.context"), "not an array"))?
        .iter()
        .map(|declaration| {
            declaration
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ValidationError::new(format!("{path}.context"), "not a string"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ArgumentSpec {
        language: field("language")?,
        identifier: field("identifier")?,
        fingerprint: field("fingerprint")?,
        context,
    })
}

fn check_parameters(
    parameters: &[Parameter],
    language: &str,
    arguments: &[ArgumentSpec],
) -> Result<(), ParameterMismatchError> {
    if parameters.len() != arguments.len() {
        return Err(ParameterMismatchError::Arity {
            expected: parameters.len(),
            actual: arguments.len(),
        });
    }
    for (index, (parameter, argument)) in parameters.iter().zip(arguments).enumerate() {
        if argument.language != language {
            return Err(ParameterMismatchError::Language {
                index,
                expected: language.to_string(),
                actual: argument.language.clone(),
            });
        }
        if argument.fingerprint != parameter.fingerprint {
            return Err(ParameterMismatchError::Fingerprint {
                index,
                expected: parameter.fingerprint.clone(),
                actual: argument.fingerprint.clone(),
            });
        }
    }
    for (first, a) in parameters.iter().enumerate() {
        for (second, b) in parameters.iter().enumerate() {
            if first != second && b.identifier.contains(&a.identifier) {
                return Err(ParameterMismatchError::AmbiguousToken {
                    first,
                    second,
                    token: a.identifier.clone(),
                });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Derivation assertions
// ============================================================================

fn assertion_doc(
    agent: &str,
    mode: Value,
    annotation: Option<Value>,
    dependencies: &[Identifier],
    conclusion: &Identifier,
) -> Value {
    let production = json!({
        "format": "production",
        "mode": mode,
        "sequent": {
            "conclusion": conclusion.as_str(),
            "dependencies": dependencies
                .iter()
                .map(|id| Value::String(id.as_str().to_string()))
                .collect::<Vec<_>>(),
        }
    });
    let claim = match annotation {
        Some(annotation) => json!({
            "format": "annotated-production",
            "production": production,
            "annotation": annotation,
        }),
        None => production,
    };
    json!({
        "format": "assertion",
        "agent": agent,
        "claim": claim,
    })
}

async fn publish_derivation(
    session: &mut Session<'_>,
    doc: &Value,
) -> Result<Identifier, Error> {
    let mut scope = DocScope::for_document(doc);
    publish_assertion(session, &mut scope, doc).await
}

// ============================================================================
// Entry point
// ============================================================================

/// Instantiate `abstraction` with `arguments`, publishing the whole
/// derivation in one batch.
pub async fn apply(
    store: &dyn ContentStore,
    profiles: &dyn ProfileStore,
    abstraction: &Value,
    arguments: &[Value],
) -> Result<ApplyOutcome, Error> {
    // Everything that can fail without I/O fails here, before any block is
    // staged.
    let parameters = extract_parameters(abstraction)?;
    let agent = str_field(abstraction, "agent")?.to_string();
    let formula_language = str_field(&abstraction["formula"], "language")?.to_string();
    let arguments = arguments
        .iter()
        .enumerate()
        .map(|(index, argument)| extract_argument(index, argument))
        .collect::<Result<Vec<_>, Error>>()?;
    check_parameters(&parameters, &formula_language, &arguments)?;

    let mut validator = Validator::for_document(abstraction);
    validator.validate_formula(&abstraction["formula"], "formula")?;
    validator.validate_formula(&abstraction["abstracted-formula"], "abstracted-formula")?;

    let mode = abstraction.get("mode").cloned().unwrap_or(Value::Null);
    let annotation = abstraction.get("annotation").cloned();

    let mut session = Session::new(store, profiles);
    let mut scope = DocScope::for_document(abstraction);

    // The abstraction packages both formulas with the parameter list.
    let formula_id = publish_formula(&mut session, &mut scope, &abstraction["formula"]).await?;
    let abstracted_id =
        publish_formula(&mut session, &mut scope, &abstraction["abstracted-formula"]).await?;
    let abstraction_id = session.add_node(&Node::Abstraction {
        formula: Link::to(formula_id.clone()),
        abstracted_formula: Link::to(abstracted_id),
        parameters: parameters.clone(),
    })?;

    // First derivation: formula ⊢ abstraction, under the abstraction's mode.
    let abstraction_assertion = publish_derivation(
        &mut session,
        &assertion_doc(
            &agent,
            mode,
            annotation.clone(),
            std::slice::from_ref(&formula_id),
            &abstraction_id,
        ),
    )
    .await?;

    // Arguments publish with their contexts as written; substituted copies
    // are attached to the instantiated formula below.
    let language_id = session.language_id(&formula_language).await?;
    let mut argument_ids = Vec::with_capacity(arguments.len());
    for argument in &arguments {
        let context_id = session.add_node(&Node::Context {
            language: Link::to(language_id.clone()),
            content: argument.context.clone(),
        })?;
        argument_ids.push(session.add_node(&Node::Argument {
            language: Link::to(language_id.clone()),
            identifier: argument.identifier.clone(),
            fingerprint: argument.fingerprint.clone(),
            context: Link::to(context_id),
        })?);
    }

    // Rewrite the abstracted formula and reattach every context it names,
    // plus one substituted context per argument.
    let abstracted = &abstraction["abstracted-formula"];
    let content = substitute_all(str_field(abstracted, "content")?, &parameters, &argument_ids);

    let mut context_list = Vec::new();
    let mut contexts_table = Map::new();
    for reference in array_field(abstracted, "context")? {
        let name = reference
            .as_str()
            .ok_or_else(|| ValidationError::new("abstracted-formula.context", "not a string"))?;
        if Identifier::is_reference(name) {
            context_list.push(Value::String(name.to_string()));
            continue;
        }
        let local = scope.local_context(name)?;
        let declarations = array_field(local, "content")?
            .iter()
            .map(|declaration| {
                declaration.as_str().map(str::to_string).ok_or_else(|| {
                    ValidationError::new(format!("contexts.{name}.content"), "not a string")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        contexts_table.insert(
            name.to_string(),
            json!({
                "language": str_field(local, "language")?,
                "content": substitute_declarations(&declarations, &parameters, &argument_ids),
            }),
        );
        context_list.push(Value::String(name.to_string()));
    }
    for (index, argument) in arguments.iter().enumerate() {
        let name = format!("argument-{index}");
        contexts_table.insert(
            name.clone(),
            json!({
                "language": formula_language,
                "content": substitute_declarations(&argument.context, &parameters, &argument_ids),
            }),
        );
        context_list.push(Value::String(name));
    }

    let instantiated_doc = json!({
        "format": "formula",
        "language": str_field(abstracted, "language")?,
        "content": content,
        "context": context_list,
        "contexts": contexts_table,
    });
    let mut instantiated_scope = DocScope::for_document(&instantiated_doc);
    let instantiated_formula =
        publish_formula(&mut session, &mut instantiated_scope, &instantiated_doc).await?;

    // Second derivation: abstraction, arguments ⊢ instantiated formula.
    let mut dependencies = vec![abstraction_id.clone()];
    dependencies.extend(argument_ids.iter().cloned());
    let instantiation_assertion = publish_derivation(
        &mut session,
        &assertion_doc(
            &agent,
            Value::String(INSTANTIATION_MODE.to_string()),
            annotation,
            &dependencies,
            &instantiated_formula,
        ),
    )
    .await?;

    session.commit().await?;
    tracing::info!(
        abstraction = %abstraction_id,
        formula = %instantiated_formula,
        arguments = argument_ids.len(),
        "applied abstraction"
    );
    Ok(ApplyOutcome {
        abstraction: abstraction_id,
        abstraction_assertion,
        arguments: argument_ids,
        instantiated_formula,
        instantiation_assertion,
    })
}
