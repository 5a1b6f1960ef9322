//! Sentence-aware text chunking.
//!
//! Text is normalised to single spaces, split at Unicode sentence
//! boundaries and packed greedily into chunks of at most `chunk_size`
//! characters. Each chunk after the first starts with the trailing
//! sentences of its predecessor, up to `chunk_overlap` characters.

use unicode_segmentation::UnicodeSegmentation;

/// Splits `text` into overlapping, sentence-aligned chunks.
///
/// A single sentence longer than `chunk_size` is emitted as its own chunk
/// rather than being cut mid-sentence.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&normalized);
    let lengths: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < sentences.len() {
        let mut end = start;
        let mut size = 0;
        while end < sentences.len() {
            let addition = lengths[end] + usize::from(end > start);
            if end > start && size + addition > chunk_size {
                break;
            }
            size += addition;
            end += 1;
        }

        chunks.push(sentences[start..end].join(" "));

        if end >= sentences.len() {
            break;
        }

        let mut overlap_size = 0;
        let mut overlap_sentences = 0;
        for idx in (start..end).rev() {
            let len = lengths[idx] + usize::from(idx + 1 < end);
            if overlap_size + len > chunk_overlap {
                break;
            }
            overlap_size += len;
            overlap_sentences += 1;
        }

        // Always advance by at least one sentence.
        start = (end - overlap_sentences).max(start + 1);
    }

    chunks
}

/// Collapses all whitespace runs into single spaces and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.unicode_sentences()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 800, 100).is_empty());
        assert!(chunk_text("  \n\t ", 800, 100).is_empty());
    }

    #[test]
    fn short_text_is_single_normalized_chunk() {
        let chunks = chunk_text("Hello   world.\n\nSecond line here.", 800, 100);
        assert_eq!(chunks, vec!["Hello world. Second line here.".to_string()]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} talks about retrieval.", i))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = chunk_text(&text, 120, 30);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120, "chunk too long: {}", chunk);
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = "Alpha one is here. Bravo two is here. Charlie three is here. Delta four is here.";

        let chunks = chunk_text(text, 45, 25);

        assert_eq!(
            chunks,
            vec![
                "Alpha one is here. Bravo two is here.".to_string(),
                "Bravo two is here. Charlie three is here.".to_string(),
                "Charlie three is here. Delta four is here.".to_string(),
            ]
        );
    }

    #[test]
    fn zero_overlap_produces_disjoint_chunks() {
        let text = "One sentence here. Two sentence here. Three sentence here.";

        let chunks = chunk_text(text, 20, 0);

        assert_eq!(
            chunks,
            vec![
                "One sentence here.".to_string(),
                "Two sentence here.".to_string(),
                "Three sentence here.".to_string(),
            ]
        );
    }

    #[test]
    fn oversized_sentence_is_kept_whole_and_terminates() {
        let long = format!("{}.", "word ".repeat(60).trim_end());
        let text = format!("{} Short tail.", long);

        let chunks = chunk_text(&text, 50, 49);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], long);
        assert_eq!(chunks[1], "Short tail.");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "Éléphant résumé café. Naïve façade déjà vu.";
        let chunks = chunk_text(text, 43, 0);
        assert_eq!(chunks.len(), 1);
    }
}
