//! Character-limited truncation of document text.

use fmea_core::Document;

/// Keeps at most `limit_chars` characters of `document`.
///
/// Counting is by Unicode scalar value, so a multi-byte character is never
/// split. Returns the (possibly shortened) document and whether anything was
/// cut. Applying it twice with the same limit changes nothing the second time.
#[must_use]
pub fn truncate(document: Document, limit_chars: usize) -> (Document, bool) {
    if document.char_len() <= limit_chars {
        return (document, false);
    }

    let content = document.into_content();
    let cut = content
        .char_indices()
        .nth(limit_chars)
        .map_or(content.len(), |(byte_offset, _)| byte_offset);

    (Document::new(&content[..cut]), true)
}

/// Bounds document size before segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTruncator {
    limit_chars: usize,
}

impl ContentTruncator {
    /// A truncator keeping at most `limit_chars` characters.
    #[must_use]
    pub fn new(limit_chars: usize) -> Self {
        Self { limit_chars }
    }

    /// The character limit.
    #[must_use]
    pub fn limit_chars(&self) -> usize {
        self.limit_chars
    }

    /// See [`truncate`].
    #[must_use]
    pub fn truncate(&self, document: Document) -> (Document, bool) {
        truncate(document, self.limit_chars)
    }
}
