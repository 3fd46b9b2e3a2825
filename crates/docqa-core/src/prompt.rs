//! Prompt assembly: citation-annotated context plus recent conversation.

use crate::models::{RetrievedChunk, Turn};

/// Answer returned when retrieval finds nothing relevant.
pub const FALLBACK_ANSWER: &str = "I couldn't find any relevant information in the uploaded \
documents to answer this question. Try uploading documents that cover this topic or \
rephrasing the question.";

/// Number of remembered turns folded into each prompt.
pub const HISTORY_TURNS: usize = 3;

const BLOCK_RULE: &str = "\n\n---\n\n";

/// Render retrieved chunks as numbered, source-labelled blocks.
///
/// ```text
/// [Source 1: report.pdf]
/// first chunk text
///
/// ---
///
/// [Source 2: notes.txt]
/// second chunk text
/// ```
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let label = match c.metadata.page {
                Some(page) => format!("{}, page {}", c.metadata.source_name, page),
                None => c.metadata.source_name.clone(),
            };
            format!("[Source {}: {}]\n{}", i + 1, label, c.content)
        })
        .collect::<Vec<_>>()
        .join(BLOCK_RULE)
}

/// Combine instructions, recent turns, context, and the question.
///
/// `recent` is oldest first. An empty slice omits the conversation block.
pub fn build_prompt(question: &str, context: &str, recent: &[Turn]) -> String {
    let mut prompt = String::from(
        "You are a helpful assistant that answers questions using only the provided context.\n\
         If the context does not contain the answer, say that you could not find it in the \
         documents instead of guessing.\n\
         Cite sources by their [Source N] labels.\n\n",
    );

    if !recent.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for turn in recent {
            prompt.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
        }
        prompt.push('\n');
    }

    prompt.push_str("Context:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn retrieved(name: &str, content: &str, page: Option<u32>) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("{}#0", name),
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_document_id: name.to_string(),
                source_name: name.to_string(),
                chunk_index: 0,
                start_offset: 0,
                end_offset: content.len(),
                page,
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_format_context_numbers_sources() {
        let ctx = format_context(&[
            retrieved("a.txt", "alpha", None),
            retrieved("b.pdf", "beta", Some(3)),
        ]);
        assert_eq!(
            ctx,
            "[Source 1: a.txt]\nalpha\n\n---\n\n[Source 2: b.pdf, page 3]\nbeta"
        );
    }

    #[test]
    fn test_prompt_without_history() {
        let prompt = build_prompt("Why?", "[Source 1: a.txt]\nalpha", &[]);
        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.contains("Context:\n[Source 1: a.txt]\nalpha"));
        assert!(prompt.ends_with("Question: Why?\n\nAnswer:"));
    }

    #[test]
    fn test_prompt_folds_turns_in_order() {
        let turns = vec![Turn::new("first q", "first a"), Turn::new("second q", "second a")];
        let prompt = build_prompt("third q", "ctx", &turns);
        let first = prompt.find("Q: first q\nA: first a").unwrap();
        let second = prompt.find("Q: second q\nA: second a").unwrap();
        assert!(first < second);
        assert!(second < prompt.find("Context:").unwrap());
    }
}
