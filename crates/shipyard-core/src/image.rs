//! Container image references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

const MAX_TAG_LEN: usize = 128;

/// Image tag derived from the run's commit identifier.
///
/// Follows the container tag grammar: 1–128 characters of `[A-Za-z0-9_.-]`,
/// not starting with `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag(String);

impl ImageTag {
    pub fn parse(tag: &str) -> Result<Self> {
        let tag = tag.trim();
        let invalid = |reason: &str| DeployError::InvalidTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        };

        if tag.is_empty() {
            return Err(invalid("tag must not be empty"));
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(invalid("tag is longer than 128 characters"));
        }
        if tag.starts_with('.') || tag.starts_with('-') {
            return Err(invalid("tag must not start with '.' or '-'"));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(invalid("tag may only contain [A-Za-z0-9_.-]"));
        }
        Ok(Self(tag.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageTag {
    type Error = DeployError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ImageTag> for String {
    fn from(tag: ImageTag) -> Self {
        tag.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified, immutable image reference: `registry/repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: ImageTag,
}

impl ImageReference {
    pub fn new(registry: impl Into<String>, repository: impl Into<String>, tag: ImageTag) -> Self {
        Self {
            registry: registry.into().trim_end_matches('/').to_string(),
            repository: repository.into().trim_matches('/').to_string(),
            tag,
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Repository path inside the registry (e.g. `production/alpha`).
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &ImageTag {
        &self.tag
    }

    /// `registry/repository` without the tag.
    pub fn name(&self) -> String {
        if self.registry.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.registry, self.repository)
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tags() {
        for tag in ["abc123", "v1.2.3", "release_2024-01", "A"] {
            assert!(ImageTag::parse(tag).is_ok(), "{tag} should be valid");
        }
    }

    #[test]
    fn test_invalid_tags() {
        for tag in ["", "-abc", ".abc", "a/b", "a:b", "has space"] {
            assert!(ImageTag::parse(tag).is_err(), "{tag:?} should be invalid");
        }
        let long = "a".repeat(129);
        assert!(ImageTag::parse(&long).is_err());
    }

    #[test]
    fn test_reference_display() {
        let tag = ImageTag::parse("abc123").unwrap();
        let image = ImageReference::new("registry.example.com/", "/production/alpha", tag);
        assert_eq!(image.to_string(), "registry.example.com/production/alpha:abc123");
        assert_eq!(image.repository(), "production/alpha");
        assert_eq!(image.name(), "registry.example.com/production/alpha");
    }

    #[test]
    fn test_reference_without_registry() {
        let tag = ImageTag::parse("abc").unwrap();
        let image = ImageReference::new("", "alpha", tag);
        assert_eq!(image.to_string(), "alpha:abc");
    }

    #[test]
    fn test_same_inputs_same_reference() {
        let a = ImageReference::new("r", "p/x", ImageTag::parse("t1").unwrap());
        let b = ImageReference::new("r", "p/x", ImageTag::parse("t1").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_tag_serde_validates() {
        let ok: ImageTag = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(ok.as_str(), "abc");
        assert!(serde_json::from_str::<ImageTag>("\"-bad\"").is_err());
    }
}
