//! Reference and delta type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single search or ask result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Target URL, unique within one result set
    pub url: String,
    /// Title of the matched section
    pub title: String,
    /// Contextual titles (e.g. the page title when it differs from `title`)
    #[serde(default)]
    pub titles: Vec<String>,
    /// Highlighted excerpt of the match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Tags attached to the parent page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
}

impl Reference {
    /// Create a new reference
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            titles: vec![],
            excerpt: None,
            tags: None,
        }
    }

    /// Add contextual titles
    pub fn with_titles(mut self, titles: Vec<String>) -> Self {
        self.titles = titles;
        self
    }

    /// Add an excerpt
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    /// Add tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// One incremental update of an ask response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AskDelta {
    /// Text chunk appended to the running answer
    Progress { content: String },
    /// Batch replacing the current reference list
    References { items: Vec<Reference> },
}

impl AskDelta {
    pub fn progress(content: impl Into<String>) -> Self {
        Self::Progress {
            content: content.into(),
        }
    }

    pub fn references(items: Vec<Reference>) -> Self {
        Self::References { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_wire_format() {
        let delta: AskDelta =
            serde_json::from_str(r#"{"type":"progress","content":"He"}"#).unwrap();
        assert_eq!(delta, AskDelta::progress("He"));

        let delta: AskDelta = serde_json::from_str(
            r#"{"type":"references","items":[{"url":"/a","title":"A"}]}"#,
        )
        .unwrap();
        assert_eq!(delta, AskDelta::references(vec![Reference::new("/a", "A")]));
    }

    #[test]
    fn test_reference_skips_empty_optionals() {
        let json = serde_json::to_value(Reference::new("/a", "A")).unwrap();
        assert!(json.get("excerpt").is_none());
        assert!(json.get("tags").is_none());
        assert_eq!(json["titles"], serde_json::json!([]));
    }

    #[test]
    fn test_tags_are_a_set() {
        let reference = Reference::new("/a", "A").with_tags(["rust", "docs", "rust"]);
        assert_eq!(reference.tags.unwrap().len(), 2);
    }
}
