//! Prompt shipped with the binary.

use crate::types::PromptDefinition;

/// Identifier of the built-in answer prompt.
pub const DEFAULT_PROMPT_ID: &str = "medrag.answer.default";

const DEFAULT_HEADER: &str = "You are a clinical assistant answering questions about medical \
transcriptions. Use only the numbered sources below and cite them as [Source n]. \
If the sources do not contain the answer, say that you do not know.";

const DEFAULT_TEMPLATE: &str = r#"{{header}}

{{#if has_context}}
Sources:

{{#each contexts}}
[Source {{index}}] {{label}}
{{text}}

{{/each}}
{{else}}
No relevant context was found in the knowledge base for this question. State this plainly and do not invent clinical facts.

{{/if}}
Question: {{question}}

Answer:"#;

/// The default grounded-answer prompt.
pub fn default_prompt() -> PromptDefinition {
    PromptDefinition {
        id: DEFAULT_PROMPT_ID.to_string(),
        title: "Grounded answer over medical transcriptions".to_string(),
        api_version: "1.0".to_string(),
        header: DEFAULT_HEADER.to_string(),
        template: DEFAULT_TEMPLATE.to_string(),
    }
}
