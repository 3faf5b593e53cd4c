//! Document types as returned by the documents endpoints

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document formats the backend can parse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Microsoft Word document (.docx)
    Docx,
    /// OpenDocument Text
    Odt,
    /// Plain text file
    Txt,
}

impl FileType {
    pub const ALL: [FileType; 3] = [FileType::Docx, FileType::Odt, FileType::Txt];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Odt => "odt",
            Self::Txt => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            Self::Odt => "application/vnd.oasis.opendocument.text",
            Self::Txt => "text/plain",
        }
    }
}

/// A file about to be uploaded
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let mime_type = mime_guess::from_path(&name)
            .first()
            .map(|m| m.essence_str().to_string());
        Self {
            size: bytes.len() as u64,
            name,
            bytes,
            mime_type,
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, data))
    }

    /// Lowercased extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// Response of `POST /documents`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub uploaded_at: DateTime<Utc>,
    pub parsed: bool,
    /// First few hundred characters of the parsed text
    #[serde(default)]
    pub parsed_preview: Option<String>,
}

/// Response of `GET /documents/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentDetail {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub size_bytes: u64,
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub uploaded_at: DateTime<Utc>,
    pub parsed: bool,
    #[serde(default)]
    pub parsed_text: Option<String>,
    #[serde(default)]
    pub storage_ref: Option<String>,
}

/// Entry of the document history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentListItem {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    #[serde(deserialize_with = "super::timestamp::deserialize")]
    pub uploaded_at: DateTime<Utc>,
    pub parsed: bool,
}

/// Response of `GET /documents`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentList {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub items: Vec<DocumentListItem>,
}
