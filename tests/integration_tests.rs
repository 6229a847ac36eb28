//! Integration tests for the complete claimgraph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Input document → Validator → Publish → Content store
//! - Root identifier → Retrieval → Bundle (with signature verification)
//! - Abstraction + arguments → Apply → two derivations
//!
//! Run with: cargo test --test integration_tests

use claimgraph_engine::retrieve::{reconstitute, BundlePayload};
use claimgraph_engine::{apply, publish, validate_document, Error, INSTANTIATION_MODE};
use claimgraph_model::{
    decode_node, encode_node, fingerprint, identify, verify_claim, AgentProfile, Identifier, Node,
};
use claimgraph_store::{ContentStore, JsonProfiles, MemoryProfiles, MemoryStore, ProfileStore};
use serde_json::{json, Value};

// ============================================================================
// Fixtures
// ============================================================================

async fn seeded_store() -> (MemoryStore, Identifier, Identifier) {
    let store = MemoryStore::new();
    let language = store
        .put(encode_node(&Node::Language { content: json!({"name": "fol"}) }).unwrap())
        .await
        .unwrap();
    let tool = store
        .put(encode_node(&Node::Tool { content: json!({"name": "prover"}) }).unwrap())
        .await
        .unwrap();
    (store, language, tool)
}

async fn seeded() -> (MemoryStore, MemoryProfiles, AgentProfile) {
    let (store, language, tool) = seeded_store().await;
    let instantiation = store
        .put(encode_node(&Node::Tool { content: json!({"name": "instantiation"}) }).unwrap())
        .await
        .unwrap();
    let agent = AgentProfile::generate();
    let profiles = MemoryProfiles::new()
        .with_language("fol", language)
        .with_tool("prover", tool)
        .with_tool(INSTANTIATION_MODE, instantiation)
        .with_agent("alice", agent.clone());
    (store, profiles, agent)
}

fn context_doc() -> Value {
    json!({
        "format": "context",
        "language": "fol",
        "content": ["Kind nat type.", "Type z nat."]
    })
}

// ============================================================================
// Determinism and idempotence
// ============================================================================

#[test]
fn test_identify_is_deterministic_across_sessions() {
    let node = Node::Context {
        language: claimgraph_model::Link::to(Identifier::from_digest([3u8; 32])),
        content: vec!["Kind nat type.".into()],
    };
    assert_eq!(identify(&node).unwrap(), identify(&node).unwrap());
    assert_eq!(identify(&node.clone()).unwrap(), identify(&node).unwrap());
}

#[tokio::test]
async fn test_publishing_the_same_context_twice_stores_one_block() {
    let (store, profiles, _) = seeded().await;
    let before = store.len();
    let first = publish(&store, &profiles, &context_doc()).await.unwrap();
    let second = publish(&store, &profiles, &context_doc()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.len(), before + 1);
}

// ============================================================================
// Validation totality
// ============================================================================

#[test]
fn test_every_missing_field_is_named_by_path() {
    let cases = [
        (json!({"format": "context", "content": []}), "language"),
        (json!({"format": "context", "language": "fol"}), "content"),
        (
            json!({"format": "formula", "language": "fol", "context": []}),
            "content",
        ),
        (
            json!({"format": "sequent", "dependencies": []}),
            "conclusion",
        ),
        (
            json!({"format": "production", "sequent": {"conclusion": "f", "dependencies": []}}),
            "mode",
        ),
        (json!({"format": "assertion", "claim": "x"}), "agent"),
        (json!({"format": "collection", "elements": []}), "name"),
    ];
    for (doc, field) in cases {
        let err = validate_document(&doc).unwrap_err();
        assert!(
            err.message.contains(field) || err.path.contains(field),
            "expected {field:?} in {err}"
        );
    }
}

#[test]
fn test_well_formed_documents_validate() {
    assert!(validate_document(&context_doc()).is_ok());
    let sequent = json!({
        "format": "annotated-sequent",
        "sequent": {
            "conclusion": "goal",
            "dependencies": []
        },
        "annotation": "checked by hand",
        "formulas": {
            "goal": { "language": "fol", "content": "q", "context": [] }
        }
    });
    assert!(validate_document(&sequent).is_ok());
}

// ============================================================================
// Signatures
// ============================================================================

#[tokio::test]
async fn test_published_assertion_signature_round_trips() {
    let (store, profiles, agent) = seeded().await;
    let doc = json!({
        "format": "assertion",
        "agent": "alice",
        "claim": {
            "format": "production",
            "mode": "axiom",
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
            verify_claim(&key, &claim.target, &signature).unwrap();
            // flip one bit of the claim identifier
            let mut digest = [0u8; 32];
            hex::decode_to_slice(&claim.target.as_str()["sha256:".len()..], &mut digest).unwrap();
            digest[0] ^= 1;
            let tampered = Identifier::from_digest(digest);
            assert!(verify_claim(&key, &tampered, &signature).is_err());
            // wrong agent key
            let other = AgentProfile::generate();
            assert!(verify_claim(&other.public_key, &claim.target, &signature).is_err());
            assert_eq!(key, agent.public_key);
        }
        other => panic!("expected assertion, got {:?}", other.format()),
    }
}

// ============================================================================
// Retrieval completeness
// ============================================================================

#[tokio::test]
async fn test_collection_retrieval_is_complete_and_deduplicated() {
    let (store, profiles, _) = seeded().await;
    let n = 5;
    let elements: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "format": "formula",
                "language": "fol",
                "content": format!("f{i}"),
                "context": ["shared"]
            })
        })
        .collect();
    let doc = json!({
        "format": "collection",
        "name": "library",
        "elements": elements,
        "contexts": {
            "shared": { "language": "fol", "content": ["Kind nat type."] }
        }
    });
    let root = publish(&store, &profiles, &doc).await.unwrap();
    let bundle = reconstitute(&store, &root).await.unwrap();

    match &bundle.payload {
        BundlePayload::Collection { name, elements } => {
            assert_eq!(name, "library");
            assert_eq!(elements.len(), n);
            for (i, element) in elements.iter().enumerate() {
                match element {
                    BundlePayload::Formula(view) => assert_eq!(view.content, format!("f{i}")),
                    other => panic!("expected formula element, got {other:?}"),
                }
            }
        }
        other => panic!("expected collection payload, got {other:?}"),
    }
    // every element references the same context and language; each appears
    // exactly once
    assert_eq!(bundle.contexts.len(), 1);
    assert_eq!(bundle.languages.len(), 1);
    assert_eq!(bundle.formulas.len(), n);
}

#[tokio::test]
async fn test_retrieval_reports_agents_as_fingerprints() {
    let (store, profiles, agent) = seeded().await;
    let doc = json!({
        "format": "assertion",
        "agent": "alice",
        "claim": {
            "format": "production",
            "mode": null,
            "sequent": { "conclusion": "goal", "dependencies": [] }
        },
        "formulas": {
            "goal": { "language": "fol", "content": "q", "context": [] }
        }
    });
    let root = publish(&store, &profiles, &doc).await.unwrap();
    let bundle = reconstitute(&store, &root).await.unwrap();
    match &bundle.payload {
        BundlePayload::Assertion(view) => {
            assert_eq!(view.agent, fingerprint(&agent.public_key));
            assert_ne!(view.agent, agent.public_key);
        }
        other => panic!("expected assertion payload, got {other:?}"),
    }
}

// ============================================================================
// Apply
// ============================================================================

#[tokio::test]
async fn test_apply_substitutes_and_records_dependencies() {
    let (store, profiles, _) = seeded().await;
    let abstraction = json!({
        "format": "abstraction",
        "agent": "alice",
        "mode": "conjecture",
        "formula": { "language": "fol", "content": "Q", "context": [] },
        "abstracted-formula": { "language": "fol", "content": "P x", "context": [] },
        "parameters": [ { "identifier": "x", "fingerprint": "f1" } ]
    });
    let argument = json!({
        "language": "fol",
        "identifier": "x",
        "fingerprint": "f1",
        "context": []
    });
    let outcome = apply(&store, &profiles, &abstraction, &[argument])
        .await
        .unwrap();

    let argument_id = &outcome.arguments[0];
    match decode_node(&store.get(&outcome.instantiated_formula).await.unwrap()).unwrap() {
        Node::Formula { content, .. } => assert_eq!(content, format!("P {argument_id}")),
        other => panic!("expected formula, got {:?}", other.format()),
    }

    match decode_node(&store.get(&outcome.instantiation_assertion).await.unwrap()).unwrap() {
        Node::Assertion { claim, .. } => {
            let sequent = match decode_node(&store.get(&claim.target).await.unwrap()).unwrap() {
                Node::Production { sequent, .. } => sequent.target,
                other => panic!("expected production, got {:?}", other.format()),
            };
            match decode_node(&store.get(&sequent).await.unwrap()).unwrap() {
                Node::Sequent {
                    dependencies,
                    conclusion,
                } => {
                    let targets: Vec<_> = dependencies.iter().map(|l| l.target.clone()).collect();
                    assert_eq!(
                        targets,
                        vec![outcome.abstraction.clone(), argument_id.clone()]
                    );
                    assert_eq!(conclusion.target, outcome.instantiated_formula);
                }
                other => panic!("expected sequent, got {:?}", other.format()),
            }
        }
        other => panic!("expected assertion, got {:?}", other.format()),
    }
}

#[tokio::test]
async fn test_apply_arity_mismatch_has_no_side_effects() {
    let store = MemoryStore::new();
    let profiles = MemoryProfiles::new()
        .with_language("fol", Identifier::from_digest([1u8; 32]))
        .with_agent("alice", AgentProfile::generate());
    let abstraction = json!({
        "format": "abstraction",
        "agent": "alice",
        "mode": null,
        "formula": { "language": "fol", "content": "Q", "context": [] },
        "abstracted-formula": { "language": "fol", "content": "P x y", "context": [] },
        "parameters": [
            { "identifier": "x", "fingerprint": "f1" },
            { "identifier": "y", "fingerprint": "f2" }
        ]
    });
    let argument = json!({
        "language": "fol",
        "identifier": "x",
        "fingerprint": "f1",
        "context": []
    });
    let err = apply(&store, &profiles, &abstraction, &[argument])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ParameterMismatch(_)));
    assert!(store.is_empty());
}

// ============================================================================
// Profile directory layout
// ============================================================================

#[tokio::test]
async fn test_publish_with_json_profile_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (store, language, _) = seeded_store().await;
    let agent = AgentProfile::generate();
    std::fs::write(
        dir.path().join("languages.json"),
        serde_json::to_string(&json!({"fol": {"language": language.as_str()}})).unwrap(),
    )
    .unwrap();
    std::fs::write(dir.path().join("toolprofiles.json"), "{}").unwrap();
    std::fs::write(
        dir.path().join("agentprofiles.json"),
        serde_json::to_string(&json!({
            "alice": { "public-key": agent.public_key, "private-key": agent.private_key }
        }))
        .unwrap(),
    )
    .unwrap();

    let profiles = JsonProfiles::open(dir.path());
    assert_eq!(profiles.resolve_language("fol").await.unwrap(), language);

    let root = publish(&store, &profiles, &context_doc()).await.unwrap();
    let bundle = reconstitute(&store, &root).await.unwrap();
    match &bundle.payload {
        BundlePayload::Context(view) => {
            assert_eq!(view.language, language);
            assert_eq!(view.content.len(), 2);
        }
        other => panic!("expected context payload, got {other:?}"),
    }
}
