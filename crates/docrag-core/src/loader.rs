//! Recursive document discovery and text extraction.
//!
//! `.txt` and `.md` files are read as UTF-8 with invalid bytes dropped.
//! `.pdf` files are extracted page by page; a page that fails to extract
//! contributes an empty string instead of failing the document. Files that
//! cannot be read at all are logged and skipped.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Pdf,
}

impl DocumentKind {
    /// Classifies by extension, case-insensitively. `None` means the file is
    /// not a supported document.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
}

impl DocumentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads every supported document under the root. A missing root yields
    /// no documents. Documents with no text after trimming are dropped.
    pub fn load(&self) -> Vec<Document> {
        if !self.root.is_dir() {
            warn!(root = %self.root.display(), "document root does not exist or is not a directory");
            return Vec::new();
        }

        let mut docs = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(kind) = DocumentKind::from_path(path) else { continue };

            match read_document(path, kind) {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => debug!(path = %path.display(), "dropping document with no text"),
                Err(err) => warn!(error = %err, "skipping unreadable document"),
            }
        }
        info!(root = %self.root.display(), documents = docs.len(), "loaded documents");
        docs
    }
}

/// Reads one file of a known kind. Returns `Ok(None)` when the file holds
/// no usable text.
pub fn read_document(path: &Path, kind: DocumentKind) -> Result<Option<Document>> {
    let text = match kind {
        DocumentKind::PlainText => read_text_lossy(path)?,
        DocumentKind::Pdf => read_pdf_text(path)?,
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(Document { path: path.to_string_lossy().to_string(), text: text.to_string() }))
}

/// Reads a file as UTF-8, discarding invalid byte sequences.
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(decode_utf8_discarding(&bytes))
}

fn decode_utf8_discarding(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Extracts a PDF's text with pages joined by `\n`.
pub fn read_pdf_text(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
    })?;
    // extract_text ends every page with a newline of its own.
    let pages = doc.get_pages().into_keys().map(|page_no| {
        doc.extract_text(&[page_no])
            .map(|text| text.trim_end_matches(['\r', '\n']).to_string())
            .map_err(|e| format!("page {page_no}: {e}"))
    });
    Ok(join_pages(path, pages))
}

/// Joins per-page extraction results with `\n`, substituting an empty
/// string for every page that failed.
pub fn join_pages<I, E>(path: &Path, pages: I) -> String
where
    I: IntoIterator<Item = std::result::Result<String, E>>,
    E: Display,
{
    pages
        .into_iter()
        .map(|page| {
            page.unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "failed to extract PDF page text");
                String::new()
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}
