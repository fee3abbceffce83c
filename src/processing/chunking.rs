//! Semantic chunking with a configurable length unit.
//!
//! Documents are split with `semchunk-rs`, which prefers paragraph, sentence, then word
//! boundaries before cutting mid-word. Length is measured either in characters (the default,
//! matching how chunk sizes are usually quoted for these documents) or in `tiktoken` tokens
//! resolved from the embedding model name. After splitting, a sliding overlap copies the tail of
//! each chunk onto the start of the next one without exceeding the size budget.

use crate::config::ChunkUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::types::ChunkingError;

pub(crate) type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Split `text` into chunks of at most `chunk_size` units with `overlap` units carried forward.
///
/// Returns an empty vector when the input is blank.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    unit: ChunkUnit,
    model: &str,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_length_counter(unit, model)?;
    Ok(chunk_text_with_counter(text, chunk_size, overlap, counter))
}

/// Build the length function for `unit`.
///
/// Token counting resolves the encoding from `model` and falls back to whitespace words when no
/// encoding can be loaded, so ingestion keeps flowing for locally named Ollama models.
pub(crate) fn build_length_counter(
    unit: ChunkUnit,
    model: &str,
) -> Result<LengthCounter, ChunkingError> {
    match unit {
        ChunkUnit::Characters => Ok(character_counter()),
        ChunkUnit::Tokens => match build_tiktoken_counter(model) {
            Ok(counter) => Ok(counter),
            Err(error) => {
                tracing::warn!(
                    model,
                    error = %error,
                    "Tokenizer unavailable; falling back to whitespace counter"
                );
                Ok(whitespace_counter())
            }
        },
    }
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter(model: &str) -> Result<LengthCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::debug!(model, "Using 'cl100k_base' encoding for token counting");
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn whitespace_counter() -> LengthCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size - effective_overlap,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, effective_overlap, &counter)
}

/// Prefix every chunk after the first with up to `overlap` units from the previous chunk.
///
/// Base chunks are cut `overlap` units short of `chunk_size`, so the carried tail fits.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if overlap == 0 {
        return chunks;
    }

    let mut iter = chunks.into_iter();
    let Some(mut previous) = iter.next() else {
        return Vec::new();
    };
    let mut overlapped = vec![previous.clone()];

    for current in iter {
        overlapped.push(build_overlapped_chunk(
            &previous, &current, overlap, chunk_size, counter,
        ));
        previous = current;
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    tail_candidates(previous)
        .filter(|tail| counter.as_ref()(*tail) <= overlap)
        .map(|tail| join_tail(tail, current))
        .find(|combined| counter.as_ref()(combined.as_str()) <= chunk_size)
        .unwrap_or_else(|| current.to_string())
}

/// Suffixes of `text`, longest first: those starting on a word first, then any character.
fn tail_candidates(text: &str) -> impl Iterator<Item = &str> {
    let words = text
        .match_indices(char::is_whitespace)
        .map(move |(offset, ws)| &text[offset + ws.len()..])
        .filter(|rest| !starts_with_whitespace(rest));
    let chars = text
        .char_indices()
        .skip(1)
        .map(move |(offset, _)| text[offset..].trim_start());
    words.chain(chars).filter(|tail| !tail.is_empty())
}

fn join_tail(tail: &str, current: &str) -> String {
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(chunks: &[String]) -> Vec<&str> {
        chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace())
            .collect()
    }

    fn continues_from(previous: &str, chunk: &str) -> bool {
        chunk
            .match_indices(' ')
            .any(|(offset, _)| previous.ends_with(&chunk[..offset]))
    }

    #[test]
    fn whitespace_counter_respects_chunk_size() {
        let text = "one two three four five";
        let chunks = chunk_text_with_counter(text, 2, 0, whitespace_counter());
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn blank_input_produces_no_chunks() {
        assert!(chunk_text_with_counter("", 4, 0, whitespace_counter()).is_empty());
        let chunks =
            chunk_text("  \n\t ", 10, 2, ChunkUnit::Characters, "all-minilm").expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn overlap_carries_previous_tail() {
        let text = "one two three four five";
        let counter = whitespace_counter();
        let chunks = chunk_text_with_counter(text, 3, 1, counter.clone());
        assert_eq!(chunks, vec!["one two", "two three four", "four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = chunk_text("hello", 0, 0, ChunkUnit::Characters, "all-minilm").unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn character_chunks_stay_within_budget() {
        let text = "Revenue grew in the third quarter.\n\nCosts were flat.\n\nHeadcount rose by \
                    four percent while churn dropped to a record low.";
        let chunks = chunk_text(text, 40, 0, ChunkUnit::Characters, "all-minilm").expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
        assert_eq!(words(&chunks), text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn character_overlap_never_exceeds_budget() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunk_text(text, 20, 6, ChunkUnit::Characters, "all-minilm").expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn each_chunk_starts_with_tail_of_previous() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = chunk_text(text, 20, 6, ChunkUnit::Characters, "all-minilm").expect("chunks");
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        for pair in chunks.windows(2) {
            assert!(
                continues_from(&pair[0], &pair[1]),
                "{:?} does not continue from {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn full_chunks_keep_their_overlap() {
        let counter = character_counter();
        let chunks = chunk_text_with_counter("aaa bbb ccc ddd eee", 12, 4, counter.clone());
        assert_eq!(chunks, vec!["aaa bbb", "bbb ccc ddd", "ddd eee"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 12);
        }
    }

    #[test]
    fn overlap_never_swallows_the_whole_budget() {
        let counter = whitespace_counter();
        let chunks = chunk_text_with_counter("one two three four", 2, 5, counter.clone());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 2, "chunk too long: {chunk:?}");
        }
        for pair in chunks.windows(2) {
            assert!(continues_from(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn token_chunks_use_tiktoken_budget() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let chunks =
            chunk_text(text, 5, 0, ChunkUnit::Tokens, "text-embedding-3-small").expect("chunks");
        let counter = build_tiktoken_counter("text-embedding-3-small").expect("tokenizer");
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        assert_eq!(words(&chunks), text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn unknown_models_fall_back_to_cl100k() {
        let counter = build_length_counter(ChunkUnit::Tokens, "all-minilm").expect("counter");
        assert!(counter.as_ref()("hello world") >= 2);
    }

    #[test]
    fn tails_prefer_word_starts() {
        let tails: Vec<&str> = tail_candidates("abc   def gh").collect();
        assert_eq!(&tails[..2], ["def gh", "gh"]);
        assert!(tails[2..].contains(&"bc   def gh"));
        assert!(tails.iter().all(|tail| !tail.starts_with(' ')));
        assert_eq!(tail_candidates("x").count(), 0);
    }
}
