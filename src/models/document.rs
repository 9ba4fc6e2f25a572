use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::SourceFormat;

/// Positional metadata: where a page/sheet begins in the normalized text.
/// Ordered by `offset` within the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    pub page: u32,
    /// Drawing sheet number when the source is a plan set (e.g. "E-101").
    pub sheet: Option<String>,
    /// Character offset of the page start in `Document::text`.
    pub offset: usize,
}

/// A normalized input document, immutable once produced by the external
/// ingestion step. The pipeline only reads `text` and `pages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub format: SourceFormat,
    pub text: String,
    pub pages: Vec<PageRef>,
    pub ingested_at: NaiveDateTime,
}

impl Document {
    /// Build a document from normalized text with no page metadata.
    pub fn from_text(title: &str, format: SourceFormat, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            format,
            text: text.to_string(),
            pages: Vec::new(),
            ingested_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Page/sheet containing the given character offset, if page metadata
    /// was supplied by the ingestion step.
    pub fn page_at(&self, offset: usize) -> Option<&PageRef> {
        self.pages
            .iter()
            .take_while(|p| p.offset <= offset)
            .last()
    }
}
