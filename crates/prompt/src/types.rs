//! Prompt types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A prompt definition loaded from YAML.
///
/// `template` is a Handlebars template rendered with `header`, `question`,
/// `has_context` and `contexts` (each with `index`, `label`, `text`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Instruction block made available to the template as `{{header}}`
    #[serde(default)]
    pub header: String,

    /// Template string with Handlebars syntax
    pub template: String,
}

/// One retrieved passage offered to the assembler, in rank order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptContext {
    /// Short provenance line, e.g. specialty and description
    pub label: String,

    /// Passage text
    pub text: String,
}

impl PromptContext {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Contexts were dropped to keep the prompt within its size budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TruncationWarning {
    /// Number of lowest-ranked contexts left out
    pub dropped: usize,

    /// Budget that forced the drop, in characters
    pub max_chars: usize,
}

impl fmt::Display for TruncationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dropped {} lowest-ranked context(s) to fit the {} character prompt limit",
            self.dropped, self.max_chars
        )
    }
}

/// A rendered prompt ready for generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssembledPrompt {
    /// Final prompt text
    pub text: String,

    /// Number of contexts rendered (always the top-ranked ones)
    pub included: usize,

    /// Number of contexts dropped for size
    pub dropped: usize,

    /// Set when `dropped > 0`
    pub warning: Option<TruncationWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: clinic.answer
title: Clinic Answer
apiVersion: "1.0"
header: "Answer briefly."
template: "{{header}} {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "clinic.answer");
        assert_eq!(def.api_version, "1.0");
        assert_eq!(def.header, "Answer briefly.");
    }

    #[test]
    fn test_header_is_optional() {
        let yaml = r#"
id: bare
title: Bare
apiVersion: "1.0"
template: "{{question}}"
"#;
        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.header.is_empty());
    }

    #[test]
    fn test_truncation_warning_display() {
        let warning = TruncationWarning {
            dropped: 2,
            max_chars: 4000,
        };
        assert_eq!(
            warning.to_string(),
            "dropped 2 lowest-ranked context(s) to fit the 4000 character prompt limit"
        );
    }
}
