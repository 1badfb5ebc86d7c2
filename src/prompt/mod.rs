//! Prompt Assembler.
//!
//! Renders retrieved evidence and the customer question into the
//! instruction-formatted prompt sent to the generation model. The evidence
//! block is bounded by a character budget.

use std::cmp::Ordering;

use crate::retrieval::RetrievedDocument;

/// Default evidence budget in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6000;

const SYSTEM_PREAMBLE: &str = "You are a helpful e-commerce customer support assistant. Answer the customer question based only on the provided information.\nIf you don't know the answer, say so politely and suggest contacting human support.";

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    max_context_chars: usize,
}

impl PromptAssembler {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    pub fn assemble(&self, query: &str, evidence: &[RetrievedDocument]) -> String {
        let context = self.bounded_context(evidence).join("\n\n");

        format!(
            "<|begin_of_text|><|system|>\n{}\n\nInformation:\n{}\n<|user|>\n{}\n<|assistant|>",
            SYSTEM_PREAMBLE, context, query
        )
    }

    /// Evidence contents that fit the budget, in retrieval order.
    ///
    /// While over budget the least similar document is dropped (the later
    /// one on equal scores). A lone survivor that is still too long is cut
    /// at the budget on a character boundary.
    pub fn bounded_context<'a>(&self, evidence: &'a [RetrievedDocument]) -> Vec<&'a str> {
        let mut kept: Vec<usize> = (0..evidence.len()).collect();
        let mut total: usize = evidence.iter().map(|doc| doc.content.chars().count()).sum();

        while total > self.max_context_chars && kept.len() > 1 {
            let Some(victim) = kept
                .iter()
                .enumerate()
                .min_by(|(_, &a), (_, &b)| {
                    evidence[a]
                        .score
                        .partial_cmp(&evidence[b].score)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| b.cmp(&a))
                })
                .map(|(slot, _)| slot)
            else {
                break;
            };

            let removed = kept.remove(victim);
            total -= evidence[removed].content.chars().count();
        }

        kept.into_iter()
            .map(|i| {
                let content = evidence[i].content.as_str();
                if total > self.max_context_chars {
                    truncate_chars(content, self.max_context_chars)
                } else {
                    content
                }
            })
            .collect()
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_CHARS)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}
