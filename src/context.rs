//! Budgeted context assembly with citation markers.
//!
//! Passages are packed greedily in score order. Each one is prefixed with
//! `[n]`, where `n` is the 1-based position of its document in the source
//! list, so the generator can cite and the user can follow the citation.

use crate::error::{RagError, Result};
use crate::models::{RetrievalResult, Source};

/// Rough characters-per-token ratio used for budgeting.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of `text`: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Context text plus the documents it draws on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// Distinct documents in first-inclusion order.
    pub sources: Vec<Source>,
    /// Each included passage as formatted into `text`, in order.
    pub passages: Vec<String>,
    /// Estimated tokens used.
    pub tokens: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Pack `result` into at most `token_budget` estimated tokens.
///
/// While nothing has been included yet, passages too large for the budget on
/// their own are skipped; after that, packing stops at the first passage
/// that does not fit. Fails with [`RagError::ContextBudget`] when `result`
/// is non-empty but no passage fits.
pub fn assemble(result: &RetrievalResult, token_budget: usize) -> Result<AssembledContext> {
    let mut context = AssembledContext::default();
    let mut smallest: Option<usize> = None;

    for item in &result.items {
        let chunk = &item.chunk;
        let existing = context
            .sources
            .iter()
            .position(|s| s.document_id == chunk.document_id);
        let citation = existing.unwrap_or(context.sources.len()) + 1;

        let passage = format_passage(citation, &chunk.document_path, &chunk.pages, &chunk.text);
        let cost = estimate_tokens(&passage);

        if context.tokens + cost > token_budget {
            if context.is_empty() {
                smallest = Some(smallest.map_or(cost, |s| s.min(cost)));
                continue;
            }
            break;
        }

        match existing {
            Some(i) => {
                let pages = &mut context.sources[i].pages;
                pages.extend(chunk.pages.iter().copied());
                pages.sort_unstable();
                pages.dedup();
            }
            None => context.sources.push(Source {
                document_id: chunk.document_id.clone(),
                document_path: chunk.document_path.clone(),
                pages: chunk.pages.clone(),
            }),
        }
        context.text.push_str(&passage);
        context.tokens += cost;
        context.passages.push(passage);
    }

    if context.is_empty() {
        if let Some(smallest) = smallest {
            return Err(RagError::ContextBudget {
                budget: token_budget,
                smallest,
            });
        }
    }
    Ok(context)
}

fn format_passage(citation: usize, path: &str, pages: &[u32], text: &str) -> String {
    if pages.is_empty() {
        return format!("[{}] {}\n{}\n\n", citation, path, text);
    }
    format!(
        "[{}] {} (p. {})\n{}\n\n",
        citation,
        path,
        format_pages(pages),
        text
    )
}

/// `[1, 2, 5]` → `"1, 2, 5"`.
pub fn format_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
