//! Schema validation of local input documents.
//!
//! Tree-recursive and state-machine free: each recognized format has one
//! checker that verifies required keys, primitive types, and reference
//! shape, recursing into locally named sub-objects through the document's
//! `contexts`/`formulas` side tables. Shared sub-structure is validated once
//! per call via an explicit visited-set; already-published references
//! (identifier strings) are accepted without dereferencing. Any violation
//! fails immediately with a dotted path from the document root.

use std::collections::HashSet;
use std::str::FromStr;

use claimgraph_model::{Format, Identifier};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("validation failed at {path:?}: {message}")]
pub struct ValidationError {
    /// Dotted path from the document root to the offending field.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn fail<T>(path: &str, message: impl Into<String>) -> Result<T, ValidationError> {
    Err(ValidationError::new(path, message))
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

// ============================================================================
// Field access helpers
// ============================================================================

fn as_object<'v>(value: &'v Value, path: &str) -> Result<&'v Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "not an object"))
}

fn get_key<'v>(
    obj: &'v Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'v Value, ValidationError> {
    obj.get(key)
        .ok_or_else(|| ValidationError::new(path, format!("lacks a {key:?} key")))
}

fn get_str<'v>(
    obj: &'v Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'v str, ValidationError> {
    let value = get_key(obj, path, key)?;
    value
        .as_str()
        .ok_or_else(|| ValidationError::new(join(path, key), "not a string"))
}

fn get_array<'v>(
    obj: &'v Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<&'v Vec<Value>, ValidationError> {
    let value = get_key(obj, path, key)?;
    value
        .as_array()
        .ok_or_else(|| ValidationError::new(join(path, key), "not an array"))
}

/// Check a reference string. Returns `true` for a published identifier,
/// `false` for a local name; rejects malformed identifier spellings and
/// empty names.
fn check_reference(s: &str, path: &str) -> Result<bool, ValidationError> {
    if s.starts_with("sha256:") {
        s.parse::<Identifier>()
            .map_err(|e| ValidationError::new(path, e.to_string()))?;
        return Ok(true);
    }
    if s.is_empty() {
        return fail(path, "empty reference");
    }
    Ok(false)
}

// ============================================================================
// Validator
// ============================================================================

/// Formats accepted as top-level published inputs (and collection elements).
const PUBLISHABLE: &[Format] = &[
    Format::Context,
    Format::AnnotatedContext,
    Format::Formula,
    Format::AnnotatedFormula,
    Format::Sequent,
    Format::AnnotatedSequent,
    Format::Production,
    Format::AnnotatedProduction,
    Format::Assertion,
];

/// Recursive checker over one document's local symbol tables.
pub struct Validator<'d> {
    contexts: Option<&'d Map<String, Value>>,
    formulas: Option<&'d Map<String, Value>>,
    visited_contexts: HashSet<String>,
    visited_formulas: HashSet<String>,
}

/// Validate a complete input document (format tag plus side tables).
pub fn validate_document(doc: &Value) -> Result<(), ValidationError> {
    let obj = as_object(doc, "")?;
    let format_str = get_str(obj, "", "format")?;
    let format = Format::from_str(format_str)
        .map_err(|e| ValidationError::new("format", e.to_string()))?;

    let mut validator = Validator::for_document(doc);
    if format == Format::Collection {
        return validator.validate_collection(doc, "");
    }
    if !PUBLISHABLE.contains(&format) {
        return fail("format", format!("{format} is not a publishable input format"));
    }
    validator.validate_format(format, doc, "")
}

impl<'d> Validator<'d> {
    /// Build a validator over `doc`'s `contexts`/`formulas` side tables.
    pub fn for_document(doc: &'d Value) -> Self {
        let table = |key: &str| doc.get(key).and_then(Value::as_object);
        Self {
            contexts: table("contexts"),
            formulas: table("formulas"),
            visited_contexts: HashSet::new(),
            visited_formulas: HashSet::new(),
        }
    }

    fn validate_format(
        &mut self,
        format: Format,
        obj: &Value,
        path: &str,
    ) -> Result<(), ValidationError> {
        match format {
            Format::Context => self.validate_context(obj, path),
            Format::AnnotatedContext => self.validate_annotated(Format::Context, obj, path),
            Format::Formula => self.validate_formula(obj, path),
            Format::AnnotatedFormula => self.validate_annotated(Format::Formula, obj, path),
            Format::Sequent => self.validate_sequent(obj, path),
            Format::AnnotatedSequent => self.validate_annotated(Format::Sequent, obj, path),
            Format::Production => self.validate_production(obj, path),
            Format::AnnotatedProduction => self.validate_annotated(Format::Production, obj, path),
            Format::Assertion => self.validate_assertion(obj, path),
            other => fail(path, format!("{other} is not a publishable input format")),
        }
    }

    pub fn validate_context(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let obj = as_object(obj, path)?;
        let language = get_str(obj, path, "language")?;
        check_reference(language, &join(path, "language"))?;
        let content = get_array(obj, path, "content")?;
        for (i, declaration) in content.iter().enumerate() {
            if !declaration.is_string() {
                return fail(&join(path, &format!("content.{i}")), "not a string");
            }
        }
        Ok(())
    }

    pub fn validate_formula(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let obj = as_object(obj, path)?;
        let language = get_str(obj, path, "language")?;
        check_reference(language, &join(path, "language"))?;
        get_str(obj, path, "content")?;
        let context = get_array(obj, path, "context")?;
        for (i, reference) in context.iter().enumerate() {
            let ref_path = join(path, &format!("context.{i}"));
            let name = reference
                .as_str()
                .ok_or_else(|| ValidationError::new(&ref_path, "not a string"))?;
            if check_reference(name, &ref_path)? {
                continue;
            }
            self.local_context(name, &ref_path)?;
        }
        Ok(())
    }

    fn local_context(&mut self, name: &str, at: &str) -> Result<(), ValidationError> {
        if self.visited_contexts.contains(name) {
            return Ok(());
        }
        let local = self
            .contexts
            .and_then(|t| t.get(name))
            .ok_or_else(|| ValidationError::new(at, format!("unknown local context {name:?}")))?;
        self.validate_context(local, &format!("contexts.{name}"))?;
        self.visited_contexts.insert(name.to_string());
        Ok(())
    }

    fn local_formula(&mut self, name: &str, at: &str) -> Result<(), ValidationError> {
        if self.visited_formulas.contains(name) {
            return Ok(());
        }
        let local = self
            .formulas
            .and_then(|t| t.get(name))
            .ok_or_else(|| ValidationError::new(at, format!("unknown local formula {name:?}")))?;
        // Mark before recursing: a formula cannot reference itself, but two
        // sequents may share it.
        self.visited_formulas.insert(name.to_string());
        self.validate_formula(local, &format!("formulas.{name}"))
    }

    pub fn validate_sequent(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let obj = as_object(obj, path)?;
        let conclusion = get_str(obj, path, "conclusion")?;
        let conclusion_path = join(path, "conclusion");
        if !check_reference(conclusion, &conclusion_path)? {
            self.local_formula(conclusion, &conclusion_path)?;
        }
        let dependencies = get_array(obj, path, "dependencies")?;
        for (i, dependency) in dependencies.iter().enumerate() {
            let dep_path = join(path, &format!("dependencies.{i}"));
            let name = dependency
                .as_str()
                .ok_or_else(|| ValidationError::new(&dep_path, "not a string"))?;
            if !check_reference(name, &dep_path)? {
                self.local_formula(name, &dep_path)?;
            }
        }
        Ok(())
    }

    pub fn validate_production(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let obj = as_object(obj, path)?;
        match get_key(obj, path, "mode")? {
            Value::Null => {}
            Value::String(mode) => {
                // "axiom" and "conjecture" are sentinels; any other string is
                // a tool name or a published tool identifier.
                if mode != "axiom" && mode != "conjecture" {
                    check_reference(mode, &join(path, "mode"))?;
                }
            }
            _ => return fail(&join(path, "mode"), "not null or a string"),
        }
        let sequent_path = join(path, "sequent");
        match get_key(obj, path, "sequent")? {
            Value::String(reference) => {
                if !check_reference(reference, &sequent_path)? {
                    return fail(&sequent_path, "not a published identifier");
                }
                Ok(())
            }
            inline => self.validate_sequent(inline, &sequent_path),
        }
    }

    pub fn validate_assertion(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let obj = as_object(obj, path)?;
        let agent = get_str(obj, path, "agent")?;
        if agent.is_empty() {
            return fail(&join(path, "agent"), "empty agent name");
        }
        let claim_path = join(path, "claim");
        match get_key(obj, path, "claim")? {
            Value::String(reference) => {
                if !check_reference(reference, &claim_path)? {
                    return fail(&claim_path, "not a published identifier");
                }
                Ok(())
            }
            claim => {
                let claim_obj = as_object(claim, &claim_path)?;
                let format = get_str(claim_obj, &claim_path, "format")?;
                match format {
                    "production" => self.validate_production(claim, &claim_path),
                    "annotated-production" => {
                        self.validate_annotated(Format::Production, claim, &claim_path)
                    }
                    other => fail(
                        &join(&claim_path, "format"),
                        format!("claim must be a production, found {other:?}"),
                    ),
                }
            }
        }
    }

    fn validate_annotated(
        &mut self,
        inner: Format,
        obj: &Value,
        path: &str,
    ) -> Result<(), ValidationError> {
        let map = as_object(obj, path)?;
        let inner_path = join(path, inner.as_str());
        match get_key(map, path, inner.as_str())? {
            Value::String(reference) => {
                if !check_reference(reference, &inner_path)? {
                    return fail(&inner_path, "not a published identifier");
                }
            }
            inner_obj => self.validate_format(inner, inner_obj, &inner_path)?,
        }
        get_key(map, path, "annotation")?;
        Ok(())
    }

    pub fn validate_collection(&mut self, obj: &Value, path: &str) -> Result<(), ValidationError> {
        let map = as_object(obj, path)?;
        get_str(map, path, "name")?;
        let elements = get_array(map, path, "elements")?;
        for (i, element) in elements.iter().enumerate() {
            let elem_path = join(path, &format!("elements.{i}"));
            let elem_obj = as_object(element, &elem_path)?;
            let format_str = get_str(elem_obj, &elem_path, "format")?;
            let format = Format::from_str(format_str)
                .map_err(|e| ValidationError::new(join(&elem_path, "format"), e.to_string()))?;
            if format == Format::Collection {
                return fail(&elem_path, "collections cannot nest");
            }
            if !PUBLISHABLE.contains(&format) {
                return fail(
                    &join(&elem_path, "format"),
                    format!("{format} is not a publishable element format"),
                );
            }
            self.validate_format(format, element, &elem_path)?;
        }
        Ok(())
    }
}
