//! Name-to-identifier profile stores.
//!
//! Publishing refers to languages, tools, and agents by short local names;
//! the profile store maps those names to published identifiers (languages,
//! tools) or key pairs (agents). The store is read-only from the engines'
//! perspective.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use claimgraph_model::{AgentProfile, Identifier};
use serde::Deserialize;

/// Which namespace a resolution failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Language,
    Tool,
    Agent,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileKind::Language => "language",
            ProfileKind::Tool => "tool",
            ProfileKind::Agent => "agent",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("unknown {kind} name: {name:?}")]
    Unknown { kind: ProfileKind, name: String },
    #[error("unknown local {table} name: {name:?}")]
    UnknownLocal { table: &'static str, name: String },
    #[error("profile store unreadable: {0}")]
    Unreadable(String),
}

/// Read-only lookups of profile names.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn resolve_language(&self, name: &str) -> Result<Identifier, ResolutionError>;
    async fn resolve_tool(&self, name: &str) -> Result<Identifier, ResolutionError>;
    async fn resolve_agent(&self, name: &str) -> Result<AgentProfile, ResolutionError>;
}

// ============================================================================
// In-memory profiles
// ============================================================================

/// Profile store backed by in-process maps. Built once, then read-only.
#[derive(Debug, Default)]
pub struct MemoryProfiles {
    languages: HashMap<String, Identifier>,
    tools: HashMap<String, Identifier>,
    agents: HashMap<String, AgentProfile>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, name: impl Into<String>, id: Identifier) -> Self {
        self.languages.insert(name.into(), id);
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, id: Identifier) -> Self {
        self.tools.insert(name.into(), id);
        self
    }

    pub fn with_agent(mut self, name: impl Into<String>, agent: AgentProfile) -> Self {
        self.agents.insert(name.into(), agent);
        self
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn resolve_language(&self, name: &str) -> Result<Identifier, ResolutionError> {
        self.languages
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::Unknown {
                kind: ProfileKind::Language,
                name: name.to_string(),
            })
    }

    async fn resolve_tool(&self, name: &str) -> Result<Identifier, ResolutionError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::Unknown {
                kind: ProfileKind::Tool,
                name: name.to_string(),
            })
    }

    async fn resolve_agent(&self, name: &str) -> Result<AgentProfile, ResolutionError> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::Unknown {
                kind: ProfileKind::Agent,
                name: name.to_string(),
            })
    }
}

// ============================================================================
// JSON-file profiles
// ============================================================================

#[derive(Deserialize)]
struct LanguageProfile {
    language: Identifier,
}

#[derive(Deserialize)]
struct ToolProfile {
    tool: Identifier,
}

/// Profile store backed by the on-disk layout of a profile directory:
/// `languages.json`, `toolprofiles.json`, and `agentprofiles.json`, each a
/// map from name to profile object.
#[derive(Debug, Clone)]
pub struct JsonProfiles {
    languages_path: PathBuf,
    tools_path: PathBuf,
    agents_path: PathBuf,
}

impl JsonProfiles {
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            languages_path: dir.join("languages.json"),
            tools_path: dir.join("toolprofiles.json"),
            agents_path: dir.join("agentprofiles.json"),
        }
    }

    async fn read_table<T: serde::de::DeserializeOwned>(
        path: &Path,
    ) -> Result<HashMap<String, T>, ResolutionError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ResolutionError::Unreadable(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| ResolutionError::Unreadable(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl ProfileStore for JsonProfiles {
    async fn resolve_language(&self, name: &str) -> Result<Identifier, ResolutionError> {
        let mut table: HashMap<String, LanguageProfile> =
            Self::read_table(&self.languages_path).await?;
        table
            .remove(name)
            .map(|p| p.language)
            .ok_or_else(|| ResolutionError::Unknown {
                kind: ProfileKind::Language,
                name: name.to_string(),
            })
    }

    async fn resolve_tool(&self, name: &str) -> Result<Identifier, ResolutionError> {
        let mut table: HashMap<String, ToolProfile> = Self::read_table(&self.tools_path).await?;
        table
            .remove(name)
            .map(|p| p.tool)
            .ok_or_else(|| ResolutionError::Unknown {
                kind: ProfileKind::Tool,
                name: name.to_string(),
            })
    }

    async fn resolve_agent(&self, name: &str) -> Result<AgentProfile, ResolutionError> {
        let mut table: HashMap<String, AgentProfile> =
            Self::read_table(&self.agents_path).await?;
        table.remove(name).ok_or_else(|| ResolutionError::Unknown {
            kind: ProfileKind::Agent,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_id() -> Identifier {
        Identifier::from_digest([9u8; 32])
    }

    #[tokio::test]
    async fn memory_profiles_resolve_registered_names() {
        let agent = AgentProfile::generate();
        let profiles = MemoryProfiles::new()
            .with_language("fol", some_id())
            .with_tool("prover", some_id())
            .with_agent("alice", agent.clone());

        assert_eq!(profiles.resolve_language("fol").await.unwrap(), some_id());
        assert_eq!(profiles.resolve_tool("prover").await.unwrap(), some_id());
        assert_eq!(
            profiles.resolve_agent("alice").await.unwrap().public_key,
            agent.public_key
        );
    }

    #[tokio::test]
    async fn unknown_names_report_their_kind() {
        let profiles = MemoryProfiles::new();
        let err = profiles.resolve_tool("nope").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::Unknown {
                kind: ProfileKind::Tool,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn json_profiles_read_the_original_layout() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentProfile::generate();
        std::fs::write(
            dir.path().join("languages.json"),
            serde_json::to_string(&serde_json::json!({
                "fol": { "language": some_id().as_str() }
            }))
            .unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("toolprofiles.json"),
            serde_json::to_string(&serde_json::json!({
                "prover": { "tool": some_id().as_str() }
            }))
            .unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("agentprofiles.json"),
            serde_json::to_string(&serde_json::json!({
                "alice": {
                    "public-key": agent.public_key,
                    "private-key": agent.private_key,
                }
            }))
            .unwrap(),
        )
        .unwrap();

        let profiles = JsonProfiles::open(dir.path());
        assert_eq!(profiles.resolve_language("fol").await.unwrap(), some_id());
        assert_eq!(profiles.resolve_tool("prover").await.unwrap(), some_id());
        assert_eq!(
            profiles.resolve_agent("alice").await.unwrap().private_key,
            agent.private_key
        );
        assert!(profiles.resolve_language("hol").await.is_err());
    }
}
