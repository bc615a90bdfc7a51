//! Document extraction and upload notices.

use crate::error::DocumentError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text pulled out of an uploaded file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Turns an uploaded file (PDF, DOCX, image, ...) into text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> std::result::Result<ExtractedDocument, DocumentError>;
}

/// A document upload as recorded in group history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub filename: String,
    pub target_agent: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub excerpt: String,
    pub message_id: i64,
}

impl DocumentRef {
    /// Read a document reference back out of an upload notice.
    pub fn from_message(message: &Message) -> Option<Self> {
        if !message.is_document_upload() {
            return None;
        }
        let field = |key: &str| {
            message
                .metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            document_id: field("document_id"),
            filename: field("filename"),
            target_agent: field("target_agent"),
            summary: field("content_summary"),
            excerpt: field("extracted_content"),
            message_id: message.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DOCUMENT_UPLOAD, NewMessage};
    use chrono::Utc;

    #[test]
    fn reads_upload_metadata() {
        let msg = NewMessage::system("g1", "Document uploaded: q3.pdf")
            .with_metadata("message_type", DOCUMENT_UPLOAD)
            .with_metadata("document_id", "doc-1")
            .with_metadata("filename", "q3.pdf")
            .with_metadata("target_agent", "analyst")
            .with_metadata("content_summary", "Quarterly numbers")
            .into_message(4, Utc::now());

        let doc = DocumentRef::from_message(&msg).unwrap();
        assert_eq!(doc.document_id, "doc-1");
        assert_eq!(doc.target_agent, "analyst");
        assert_eq!(doc.summary, "Quarterly numbers");
        assert!(doc.excerpt.is_empty());
        assert_eq!(doc.message_id, 4);
    }

    #[test]
    fn ignores_plain_messages() {
        let msg = NewMessage::user("g1", "hello").into_message(1, Utc::now());
        assert!(DocumentRef::from_message(&msg).is_none());
    }
}
