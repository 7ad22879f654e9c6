use crate::error::IngestError;
use crate::extractor::TextExtractor;
use crate::models::NewDocument;
use std::path::{Path, PathBuf};

/// Extractor returning canned text, or failing like a scanned PDF would.
pub(crate) struct FixedTextExtractor(Option<String>);

impl FixedTextExtractor {
    pub(crate) fn text(text: &str) -> Self {
        Self(Some(text.to_string()))
    }

    pub(crate) fn failing() -> Self {
        Self(None)
    }
}

impl TextExtractor for FixedTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        self.0
            .clone()
            .ok_or_else(|| IngestError::NoExtractableText(path.display().to_string()))
    }
}

pub(crate) fn alice_document(path: &str) -> NewDocument {
    NewDocument {
        title: "Pump manual".to_string(),
        authors: None,
        year: None,
        category: None,
        file_path: PathBuf::from(path),
        file_size: 10,
        checksum: "abc".to_string(),
        owner_id: "alice".to_string(),
    }
}
