//! Plain-text document loading.

use core::str::from_utf8;
use std::path::Path;

use anyhow::{Context as _, Result};
use fmea_core::{Document, DocumentLoader, LoadError};
use tokio::fs;
use tracing::debug;

/// Loads UTF-8 text files, one paragraph per line.
///
/// Line endings are normalised to `\n` and a leading byte-order mark is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, bytes: &[u8]) -> Result<Document, LoadError> {
        let text = from_utf8(bytes).map_err(|err| LoadError::Encoding(err.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

        Ok(Document::from_paragraphs(normalized.lines()))
    }
}

/// Reads `path` and decodes it with `loader`.
///
/// # Errors
/// Returns an error if the file cannot be read or decoded.
pub async fn load_document(loader: &dyn DocumentLoader, path: &Path) -> Result<Document> {
    let bytes = fs::read(path)
        .await
        .map_err(LoadError::from)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document = loader
        .load(&bytes)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    debug!(
        path = %path.display(),
        chars = document.char_len(),
        "loaded document"
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn test_normalises_line_endings() {
        let document = PlainTextLoader
            .load(b"First paragraph\r\nSecond paragraph\rThird\n")
            .unwrap();
        assert_eq!(document.content(), "First paragraph\nSecond paragraph\nThird");
    }

    #[test]
    fn test_strips_byte_order_mark() {
        let document = PlainTextLoader.load("\u{feff}Log".as_bytes()).unwrap();
        assert_eq!(document.content(), "Log");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let err = PlainTextLoader.load(&[0x66, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, LoadError::Encoding(_)));
    }

    #[test]
    fn test_empty_file_is_empty_document() {
        let document = PlainTextLoader.load(b"").unwrap();
        assert!(document.is_empty());
    }

    #[tokio::test]
    async fn test_load_document_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Main engine stopped\nCrew restarted it").unwrap();

        let document = load_document(&PlainTextLoader, file.path()).await.unwrap();
        assert_eq!(document.content(), "Main engine stopped\nCrew restarted it");
    }

    #[tokio::test]
    async fn test_load_document_missing_file() {
        let err = load_document(&PlainTextLoader, Path::new("/nonexistent/incidents.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("incidents.txt"));
    }
}
