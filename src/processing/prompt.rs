//! Prompt assembly for grounded answers.

use crate::store::ScoredChunk;

/// Separator placed between retrieved chunks in the context block.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Build the generator prompt from retrieved chunks (best match first) and the user question.
///
/// The context block is empty when nothing was retrieved; the instruction to admit ignorance is
/// what keeps the generator from inventing an answer in that case.
pub(crate) fn build_prompt(chunks: &[ScoredChunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "You are a helpful assistant. Use the following context to answer the question.\n\
         If the answer is not in the context, say you don't know.\n\n\
         Context:\n{context}\n\n\
         Question:\n{question}\n\n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChunkMetadata, StoredChunk};

    fn hit(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: StoredChunk {
                id: "id".into(),
                text: text.into(),
                metadata: ChunkMetadata {
                    source: "uploads/a.pdf".into(),
                    document: "a.pdf".into(),
                    stored_path: "uploads/a.pdf".into(),
                    chunk_index: 0,
                    chunk_hash: String::new(),
                    ingested_at: String::new(),
                },
            },
            score,
        }
    }

    #[test]
    fn chunks_are_joined_in_rank_order() {
        let prompt = build_prompt(
            &[hit("Revenue was $5M.", 0.9), hit("Costs were $2M.", 0.5)],
            "What was revenue?",
        );
        assert!(prompt.contains("Context:\nRevenue was $5M.\n\nCosts were $2M.\n\nQuestion:"));
        assert!(prompt.ends_with("Question:\nWhat was revenue?\n\nAnswer:"));
        assert!(prompt.starts_with("You are a helpful assistant."));
    }

    #[test]
    fn empty_context_keeps_the_template() {
        let prompt = build_prompt(&[], "Anything?");
        assert!(prompt.contains("say you don't know"));
        assert!(prompt.contains("Context:\n\n\nQuestion:\nAnything?"));
    }

    #[test]
    fn placeholders_in_question_are_not_expanded() {
        let prompt = build_prompt(&[hit("ctx", 1.0)], "what is {context}?");
        assert!(prompt.contains("Question:\nwhat is {context}?"));
    }
}
