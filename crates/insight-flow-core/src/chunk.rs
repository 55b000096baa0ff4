//! Boundary-preferring sliding-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters
//! where consecutive chunks of one document share exactly `overlap_chars`
//! characters, so context that straddles a boundary appears in both.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so multibyte
//! text cannot be cut inside a character.
//!
//! # Algorithm
//!
//! 1. If the text fits in `max_chars`, emit it whole.
//! 2. Otherwise the window `[start, start + max_chars]` must end somewhere
//!    in `(start + overlap_chars, start + max_chars]`.
//! 3. Search that range for the latest occurrence of `"\n\n"`; if there is
//!    none, recurse with `"\n"`, then `" "`. The separator stays at the end
//!    of the chunk that precedes the break.
//! 4. If no separator occurs at all, hard-cut at `start + max_chars`.
//! 5. The next window starts `overlap_chars` before the break.
//!
//! Because every window restarts exactly `overlap_chars` before the
//! previous break, `chunk[0] + chunk[1][overlap..] + …` reproduces the
//! input text exactly.
//!
//! # Example
//!
//! ```rust
//! use insight_flow_core::chunk::{split_text, SplitParams};
//!
//! let params = SplitParams::default();
//! let pieces = split_text("name: Ada\ncity: London", &params);
//! assert_eq!(pieces, vec!["name: Ada\ncity: London".to_string()]);
//! ```

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, SourceDocument};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;
/// Default number of characters shared by adjacent chunks.
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Validated window parameters for [`split_text`] and [`chunk_documents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitParams {
    max_chars: usize,
    overlap_chars: usize,
}

impl SplitParams {
    /// # Errors
    ///
    /// Fails when `max_chars` is zero or `overlap_chars >= max_chars`
    /// (a window could then never advance).
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            bail!("max_chars must be > 0");
        }
        if overlap_chars >= max_chars {
            bail!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                overlap_chars,
                max_chars
            );
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

/// Split a single text into overlapping windows.
///
/// Always returns at least one piece; text no longer than `max_chars`
/// (including empty text) comes back unchanged as the only piece.
pub fn split_text(text: &str, params: &SplitParams) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    split_spans(&chars, params)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect())
        .collect()
}

/// Chunk every document, numbering chunks per document and globally.
///
/// Chunks inherit their document's metadata. Output order follows input
/// document order, then position within the document.
pub fn chunk_documents(documents: &[SourceDocument], params: &SplitParams) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut sequence: i64 = 0;

    for doc in documents {
        for (index, text) in split_text(&doc.text, params).into_iter().enumerate() {
            chunks.push(make_chunk(doc, index as i64, sequence, text));
            sequence += 1;
        }
    }

    chunks
}

/// Compute `[start, end)` character spans for every window.
fn split_spans(chars: &[char], params: &SplitParams) -> Vec<(usize, usize)> {
    let len = chars.len();
    if len <= params.max_chars {
        return vec![(0, len)];
    }

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let limit = start + params.max_chars;
        if limit >= len {
            spans.push((start, len));
            break;
        }
        let end = find_break(chars, start + params.overlap_chars + 1, limit, &SEPARATORS);
        spans.push((start, end));
        start = end - params.overlap_chars;
    }
    spans
}

/// Find the break position in `[lo, hi]`, preferring coarser separators.
///
/// A break at `p` means the chunk ends just before `chars[p]`, so the
/// separator occupies `chars[p - sep.len()..p]`.
fn find_break(chars: &[char], lo: usize, hi: usize, separators: &[&str]) -> usize {
    let Some((separator, finer)) = separators.split_first() else {
        return hi;
    };
    let sep: Vec<char> = separator.chars().collect();

    (lo..=hi)
        .rev()
        .find(|&p| p >= sep.len() && chars[p - sep.len()..p] == sep[..])
        .unwrap_or_else(|| find_break(chars, lo, hi, finer))
}

/// Create a single [`Chunk`] with a deterministic id and SHA-256 content hash.
fn make_chunk(doc: &SourceDocument, index: i64, sequence: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", doc.id, index).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        document_id: doc.id.clone(),
        chunk_index: index,
        sequence,
        text,
        hash,
        metadata: doc.metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn params(max: usize, overlap: usize) -> SplitParams {
        SplitParams::new(max, overlap).unwrap()
    }

    fn doc(id: &str, text: &str) -> SourceDocument {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), "data.csv".to_string());
        metadata.insert("row".to_string(), id.to_string());
        SourceDocument {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    fn reconstruct(pieces: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, piece) in pieces.iter().enumerate() {
            if i == 0 {
                out.push_str(piece);
            } else {
                out.extend(piece.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| {
                format!(
                    "Row {} reports revenue of {} units in region {}.",
                    i,
                    i * 17,
                    i % 4
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "\n\nSummary paragraph with closing remarks about every region."
    }

    #[test]
    fn test_small_text_single_chunk() {
        let pieces = split_text("Hello, world!", &SplitParams::default());
        assert_eq!(pieces, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        let pieces = split_text("", &SplitParams::default());
        assert_eq!(pieces, vec![String::new()]);
    }

    #[test]
    fn test_exact_max_is_single_chunk() {
        let text = "x".repeat(20);
        let pieces = split_text(&text, &params(20, 5));
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], text);
    }

    #[test]
    fn test_chunks_respect_max_chars() {
        let text = sample_text();
        let p = params(120, 30);
        let pieces = split_text(&text, &p);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 120, "too long: {:?}", piece);
        }
    }

    #[test]
    fn test_adjacent_chunks_share_exact_overlap() {
        let text = sample_text();
        let p = params(120, 30);
        let pieces = split_text(&text, &p);
        for pair in pieces.windows(2) {
            let tail: String = {
                let chars: Vec<char> = pair[0].chars().collect();
                chars[chars.len() - 30..].iter().collect()
            };
            let head: String = pair[1].chars().take(30).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_reconstruction_is_exact() {
        let text = sample_text();
        for (max, overlap) in [(50, 0), (80, 10), (120, 30), (300, 200)] {
            let pieces = split_text(&text, &params(max, overlap));
            assert_eq!(reconstruct(&pieces, overlap), text, "max={} overlap={}", max, overlap);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "aaaa bbbb\n\ncccc dddd eeee ffff";
        let pieces = split_text(text, &params(20, 5));
        assert_eq!(pieces[0], "aaaa bbbb\n\n");
        assert_eq!(reconstruct(&pieces, 5), text);
    }

    #[test]
    fn test_prefers_line_over_word() {
        let text = "alpha beta\ngamma delta epsilon";
        let pieces = split_text(text, &params(20, 2));
        assert_eq!(pieces[0], "alpha beta\n");
    }

    #[test]
    fn test_falls_back_to_word_boundary() {
        let text = "one two three four five six seven";
        let pieces = split_text(text, &params(12, 0));
        assert_eq!(pieces[0], "one two ");
        for piece in &pieces {
            assert!(piece.chars().count() <= 12);
        }
        assert_eq!(pieces.concat(), text);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(50);
        let pieces = split_text(&text, &params(20, 5));
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.chars().count() == 20));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello wörld      │\n└──────────────────┘";
        let pieces = split_text(text, &params(12, 3));
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 12);
        }
        assert_eq!(reconstruct(&pieces, 3), text);
    }

    #[test]
    fn test_split_params_validation() {
        assert!(SplitParams::new(0, 0).is_err());
        assert!(SplitParams::new(10, 10).is_err());
        assert!(SplitParams::new(10, 11).is_err());
        assert!(SplitParams::new(10, 9).is_ok());
        assert_eq!(SplitParams::default().max_chars(), 1000);
        assert_eq!(SplitParams::default().overlap_chars(), 200);
    }

    #[test]
    fn test_short_rows_yield_one_chunk_each() {
        let docs: Vec<SourceDocument> = (0..5)
            .map(|i| doc(&i.to_string(), &format!("name: item {}\nprice: {}", i, i * 3)))
            .collect();
        let chunks = chunk_documents(&docs, &SplitParams::default());
        assert_eq!(chunks.len(), 5);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, 0);
            assert_eq!(c.sequence, i as i64);
            assert_eq!(c.text, docs[i].text);
        }
    }

    #[test]
    fn test_chunks_inherit_metadata_and_number_globally() {
        let docs = vec![doc("a", &"word ".repeat(60)), doc("b", "short")];
        let chunks = chunk_documents(&docs, &params(100, 20));
        let from_a: Vec<&Chunk> = chunks.iter().filter(|c| c.document_id == "a").collect();
        assert!(from_a.len() > 1);
        for (i, c) in from_a.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.source(), Some("data.csv"));
            assert_eq!(c.metadata.get("row").map(String::as_str), Some("a"));
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.document_id, "b");
        assert_eq!(last.sequence, chunks.len() as i64 - 1);
    }

    #[test]
    fn test_deterministic() {
        let docs = vec![doc("a", &sample_text())];
        let p = params(90, 15);
        let c1 = chunk_documents(&docs, &p);
        let c2 = chunk_documents(&docs, &p);
        assert_eq!(c1, c2);
        assert_ne!(c1[0].id, c1[1].id);
    }
}
