//! Content identifiers.
//!
//! An identifier is the SHA-256 digest of an object's canonical encoding,
//! rendered as `"sha256:<64 lowercase hex digits>"`. The textual form is the
//! only form that travels: link fields, input documents, and signatures all
//! carry the string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix of every serialized identifier.
pub const IDENTIFIER_PREFIX: &str = "sha256:";

/// Number of hex digits following the prefix (SHA-256 = 32 bytes).
pub const DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier must start with {IDENTIFIER_PREFIX:?}: {0:?}")]
    MissingPrefix(String),
    #[error("identifier digest must be {DIGEST_HEX_LEN} lowercase hex digits: {0:?}")]
    MalformedDigest(String),
}

/// A content identifier: deterministic reference to one published object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Build an identifier from a raw SHA-256 digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(format!("{IDENTIFIER_PREFIX}{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `s` is a published reference (as opposed to a local name).
    pub fn is_reference(s: &str) -> bool {
        s.parse::<Identifier>().is_ok()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s
            .strip_prefix(IDENTIFIER_PREFIX)
            .ok_or_else(|| IdentifierError::MissingPrefix(s.to_string()))?;
        let well_formed = digest.len() == DIGEST_HEX_LEN
            && digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(IdentifierError::MalformedDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_identifier() {
        let s = format!("{IDENTIFIER_PREFIX}{}", "ab".repeat(32));
        let id: Identifier = s.parse().expect("should parse");
        assert_eq!(id.as_str(), s);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = "ab".repeat(32).parse::<Identifier>().unwrap_err();
        assert!(matches!(err, IdentifierError::MissingPrefix(_)));
    }

    #[test]
    fn rejects_short_uppercase_and_nonhex_digests() {
        for digest in ["abc", &"AB".repeat(32), &"zz".repeat(32)] {
            let err = format!("{IDENTIFIER_PREFIX}{digest}")
                .parse::<Identifier>()
                .unwrap_err();
            assert!(matches!(err, IdentifierError::MalformedDigest(_)));
        }
    }

    #[test]
    fn local_names_are_not_references() {
        assert!(!Identifier::is_reference("fib"));
        assert!(!Identifier::is_reference("sha256:nope"));
        assert!(Identifier::is_reference(&format!(
            "{IDENTIFIER_PREFIX}{}",
            "00".repeat(32)
        )));
    }
}
