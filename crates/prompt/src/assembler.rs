//! Size-bounded prompt assembly.
//!
//! Contexts arrive in rank order. When the rendered prompt exceeds the
//! character budget, whole contexts are removed from the tail until it
//! fits. The question itself is never shortened.

use crate::types::{AssembledPrompt, PromptContext, PromptDefinition, TruncationWarning};
use handlebars::Handlebars;
use medrag_core::{AppError, AppResult};
use serde_json::json;

const TEMPLATE_NAME: &str = "prompt";

/// Renders a prompt definition against a question and ranked contexts.
pub struct PromptAssembler {
    definition: PromptDefinition,
    max_prompt_chars: usize,
    handlebars: Handlebars<'static>,
}

impl PromptAssembler {
    /// Compile `definition` once; fails on template syntax errors.
    pub fn new(definition: PromptDefinition, max_prompt_chars: usize) -> AppResult<Self> {
        if max_prompt_chars == 0 {
            return Err(AppError::InvalidInput(
                "max_prompt_chars must be greater than 0".to_string(),
            ));
        }

        let mut handlebars = Handlebars::new();

        // Disable HTML escaping for plain text
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars
            .register_template_string(TEMPLATE_NAME, &definition.template)
            .map_err(|e| {
                AppError::Prompt(format!(
                    "Failed to register template '{}': {}",
                    definition.id, e
                ))
            })?;

        Ok(Self {
            definition,
            max_prompt_chars,
            handlebars,
        })
    }

    pub fn prompt_id(&self) -> &str {
        &self.definition.id
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Build the prompt for `question` from as many leading contexts as fit.
    ///
    /// # Errors
    /// `InvalidInput` when even the context-free prompt exceeds the budget.
    pub fn assemble(&self, question: &str, contexts: &[PromptContext]) -> AppResult<AssembledPrompt> {
        let mut included = contexts.len();

        loop {
            let text = self.render(question, &contexts[..included])?;
            let length = text.chars().count();

            if length <= self.max_prompt_chars {
                let dropped = contexts.len() - included;
                let warning = (dropped > 0).then_some(TruncationWarning {
                    dropped,
                    max_chars: self.max_prompt_chars,
                });

                if let Some(warning) = &warning {
                    tracing::warn!(
                        prompt_id = %self.definition.id,
                        dropped = warning.dropped,
                        included,
                        max_chars = warning.max_chars,
                        "Prompt truncated: {}",
                        warning
                    );
                }

                return Ok(AssembledPrompt {
                    text,
                    included,
                    dropped,
                    warning,
                });
            }

            if included == 0 {
                return Err(AppError::InvalidInput(format!(
                    "question does not fit the prompt limit: {} characters without any context, limit is {}",
                    length, self.max_prompt_chars
                )));
            }

            included -= 1;
        }
    }

    fn render(&self, question: &str, contexts: &[PromptContext]) -> AppResult<String> {
        let contexts: Vec<_> = contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| {
                json!({
                    "index": i + 1,
                    "label": ctx.label,
                    "text": ctx.text,
                })
            })
            .collect();

        let data = json!({
            "header": self.definition.header,
            "question": question,
            "has_context": !contexts.is_empty(),
            "contexts": contexts,
        });

        self.handlebars
            .render(TEMPLATE_NAME, &data)
            .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::default_prompt;

    fn contexts(n: usize) -> Vec<PromptContext> {
        (0..n)
            .map(|i| PromptContext::new(format!("label {}", i), format!("passage number {}", i)))
            .collect()
    }

    #[test]
    fn test_sources_are_numbered_by_rank() {
        let assembler = PromptAssembler::new(default_prompt(), 10_000).unwrap();
        let prompt = assembler.assemble("What was prescribed?", &contexts(2)).unwrap();

        let first = prompt.text.find("[Source 1] label 0").unwrap();
        let second = prompt.text.find("[Source 2] label 1").unwrap();
        assert!(first < second);
        assert!(prompt.text.contains("passage number 1"));
        assert!(prompt.text.contains("Question: What was prescribed?"));
        assert_eq!(prompt.included, 2);
        assert!(prompt.warning.is_none());
    }

    #[test]
    fn test_zero_contexts_renders_explicit_notice() {
        let assembler = PromptAssembler::new(default_prompt(), 10_000).unwrap();
        let prompt = assembler.assemble("Any findings?", &[]).unwrap();

        assert!(prompt.text.contains("No relevant context was found"));
        assert!(!prompt.text.contains("[Source"));
    }

    #[test]
    fn test_truncation_drops_lowest_ranked_whole_contexts() {
        let assembler = PromptAssembler::new(default_prompt(), 10_000).unwrap();
        let question = "What was prescribed?";
        let all = contexts(4);

        // Budget exactly fits the first two contexts.
        let two = assembler.assemble(question, &all[..2]).unwrap();
        let limit = two.text.chars().count();
        let bounded = PromptAssembler::new(default_prompt(), limit).unwrap();

        let prompt = bounded.assemble(question, &all).unwrap();
        assert_eq!(prompt.text, two.text);
        assert_eq!(prompt.included, 2);
        assert_eq!(prompt.dropped, 2);
        assert_eq!(
            prompt.warning,
            Some(TruncationWarning {
                dropped: 2,
                max_chars: limit
            })
        );
        assert!(!prompt.text.contains("passage number 2"));
    }

    #[test]
    fn test_question_alone_over_budget_is_invalid_input() {
        let assembler = PromptAssembler::new(default_prompt(), 50).unwrap();
        let err = assembler.assemble("short question", &contexts(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_no_html_escaping() {
        let assembler = PromptAssembler::new(default_prompt(), 10_000).unwrap();
        let ctx = vec![PromptContext::new("a & b", "BP <140/90>")];
        let prompt = assembler.assemble("Is BP > 140?", &ctx).unwrap();
        assert!(prompt.text.contains("BP <140/90>"));
        assert!(prompt.text.contains("Is BP > 140?"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let assembler = PromptAssembler::new(default_prompt(), 10_000).unwrap();
        let a = assembler.assemble("q", &contexts(3)).unwrap();
        let b = assembler.assemble("q", &contexts(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bad_template_is_prompt_error() {
        let mut def = default_prompt();
        def.template = "{{#if question}}unterminated".to_string();
        assert!(matches!(
            PromptAssembler::new(def, 100),
            Err(AppError::Prompt(_))
        ));
    }
}
