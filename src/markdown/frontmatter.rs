//! Frontmatter extraction for markdown primitives.
//!
//! Follows the teacher crate's two-step approach: a custom `gray_matter`
//! engine extracts the raw frontmatter text and strips it from the body
//! without attempting to parse it, then `serde_yaml` parses that raw text
//! under our own error handling. Malformed YAML never aborts discovery: it
//! degrades to an empty metadata map plus a warning, per the
//! `FrontmatterMalformed` error taxonomy entry.

use gray_matter::{Matter, Pod, engine::Engine};
use std::collections::HashMap;

/// `gray_matter` engine that returns the raw frontmatter text unparsed, so
/// extraction never fails even when the YAML inside is malformed.
struct RawFrontmatter;

impl Engine for RawFrontmatter {
    fn parse(content: &str) -> Result<Pod, gray_matter::Error> {
        Ok(Pod::String(content.to_string()))
    }
}

/// The result of splitting a markdown file into frontmatter and body.
#[derive(Debug, Clone)]
pub struct ParsedFrontmatter {
    /// Frontmatter fields, or empty if absent or malformed.
    pub metadata: HashMap<String, serde_yaml::Value>,
    /// The markdown body with frontmatter removed.
    pub body: String,
    /// Set when frontmatter was present but failed to parse as YAML.
    pub warning: Option<String>,
}

impl ParsedFrontmatter {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Parse `content` as `---\n<yaml>\n---\n<body>`.
pub fn parse(content: &str) -> ParsedFrontmatter {
    let raw_matter: Matter<RawFrontmatter> = Matter::new();

    // RawFrontmatter never fails, so `.content` (the body) is always
    // available regardless of whether the frontmatter YAML itself parses.
    let (body, raw_frontmatter) = match raw_matter.parse::<String>(content) {
        Ok(parsed) => (parsed.content, parsed.data.filter(|s| !s.trim().is_empty())),
        Err(_) => (content.to_string(), None),
    };

    let Some(raw) = raw_frontmatter else {
        return ParsedFrontmatter {
            metadata: HashMap::new(),
            body,
            warning: None,
        };
    };

    match serde_yaml::from_str::<HashMap<String, serde_yaml::Value>>(&raw) {
        Ok(metadata) => ParsedFrontmatter {
            metadata,
            body,
            warning: None,
        },
        Err(e) => ParsedFrontmatter {
            metadata: HashMap::new(),
            body,
            warning: Some(format!("frontmatter is not well-formed YAML: {e}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_body() {
        let content = "---\ndescription: reviews code\napplyTo: \"**/*.rs\"\n---\n# Body\ntext\n";
        let parsed = parse(content);
        assert_eq!(parsed.get_str("description").unwrap(), "reviews code");
        assert_eq!(parsed.get_str("applyTo").unwrap(), "**/*.rs");
        assert!(parsed.body.trim().starts_with("# Body"));
        assert!(parsed.warning.is_none());
    }

    #[test]
    fn missing_frontmatter_yields_empty_metadata() {
        let content = "# Just a heading\nno frontmatter here\n";
        let parsed = parse(content);
        assert!(parsed.metadata.is_empty());
        assert!(parsed.warning.is_none());
        assert!(parsed.body.contains("Just a heading"));
    }

    #[test]
    fn malformed_yaml_degrades_to_warning() {
        let content = "---\ndescription: [unterminated\n---\nbody\n";
        let parsed = parse(content);
        assert!(parsed.metadata.is_empty());
        assert!(parsed.warning.is_some());
    }
}
