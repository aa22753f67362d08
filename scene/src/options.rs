use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::node::NodeId;

/// Errors from building scene options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Invalid cull pattern '{pattern}': {source}")]
    InvalidCullPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Name filter that hides matching nodes. An empty pattern matches nothing.
#[derive(Debug, Clone, Default)]
pub struct CullPattern {
    regex: Option<Regex>,
}

impl CullPattern {
    pub fn new(pattern: &str) -> Result<Self, OptionsError> {
        if pattern.is_empty() {
            return Ok(Self::default());
        }
        let regex = Regex::new(pattern).map_err(|source| OptionsError::InvalidCullPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_ref().map_or("", |r| r.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    /// Returns true if the pattern is set and matches anywhere in `name`.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(name))
    }
}

impl PartialEq for CullPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for CullPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CullPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        CullPattern::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Scene-wide display toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneOptions {
    /// Draw nodes regardless of hidden flags and the cull pattern
    pub show_hidden: bool,
    /// Give every node a zero-radius bound at its position
    pub show_nodes: bool,
    pub highlight: bool,
    pub current_node: Option<NodeId>,
    /// Run controllers during transform passes
    pub animate: bool,
    pub cull: CullPattern,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            show_nodes: false,
            highlight: true,
            current_node: None,
            animate: true,
            cull: CullPattern::default(),
        }
    }
}

impl SceneOptions {
    /// Compiles and installs a new cull pattern. On error the previous
    /// pattern stays in place.
    pub fn set_cull_pattern(&mut self, pattern: &str) -> Result<(), OptionsError> {
        self.cull = CullPattern::new(pattern)?;
        Ok(())
    }

    /// Returns true if `id` is the node to highlight.
    pub fn is_highlighted(&self, id: NodeId) -> bool {
        self.highlight && self.current_node == Some(id)
    }
}
