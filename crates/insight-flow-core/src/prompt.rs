//! Prompt assembly for retrieval-augmented answers.
//!
//! A template carries two placeholders, `{context}` and `{question}`.
//! Rendering is single-pass, so placeholder-like text inside the context
//! or the question is copied verbatim rather than expanded again.

use anyhow::{bail, Result};

use crate::models::Chunk;

const CONTEXT: &str = "{context}";
const QUESTION: &str = "{question}";

/// The answer the default template asks for when context is insufficient.
pub const UNKNOWN_MARKER: &str = "I don't know";

/// Grounded-answer template: context only, explicit "I don't know".
pub const DEFAULT_TEMPLATE: &str = "You are a senior data analyst.
Your goal is to answer questions based ONLY on the provided context below.
If the answer cannot be found in the context, strictly state \"I don't know\" without making up information.

Context: {context}

Question: {question}

Helpful Answer:";

/// A validated prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// # Errors
    ///
    /// Fails unless the template contains both `{context}` and `{question}`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT, QUESTION] {
            if !template.contains(placeholder) {
                bail!("prompt template is missing the {} placeholder", placeholder);
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute every placeholder occurrence in one left-to-right pass.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [(CONTEXT, context), (QUESTION, question)]
                .into_iter()
                .filter_map(|(placeholder, value)| {
                    rest.find(placeholder).map(|at| (at, placeholder, value))
                })
                .min_by_key(|(at, _, _)| *at);

            match next {
                Some((at, placeholder, value)) => {
                    out.push_str(&rest[..at]);
                    out.push_str(value);
                    rest = &rest[at + placeholder.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// Join retrieved chunk texts into one context block, best match first.
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
