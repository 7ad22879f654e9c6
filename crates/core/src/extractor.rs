use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Converts a stored file into plain text. Implementations are blocking and
/// are driven from the blocking thread pool.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::Unreadable(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // A single undecodable page should not cost the rest of the document.
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    tracing::debug!(page = page_no, %error, "skipping unreadable page");
                    continue;
                }
            };

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::NoExtractableText(path.display().to_string()));
        }

        Ok(pages)
    }
}

impl TextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let pages = self.extract_pages(path)?;
        Ok(join_pages(&pages))
    }
}

pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.text);
        text.push('\n');
    }
    text
}
