//! Where documents come from
//!
//! The engine only needs a name and the bytes behind it. Fetching them
//! (local disk, a download step) is the caller's business.

use crate::error::RedactError;
use lopdf::Document;
use std::path::{Path, PathBuf};

pub trait DocumentSource {
    /// Name used in reports and error messages
    fn source_id(&self) -> String;

    /// Parse the document. Encrypted documents are rejected.
    fn load(&self) -> Result<Document, RedactError>;
}

/// A document on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Fails with [`RedactError::InputNotFound`] before anything is read
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, RedactError> {
        let path = path.into();
        if !path.is_file() {
            return Err(RedactError::InputNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentSource for FileSource {
    fn source_id(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Document, RedactError> {
        if !self.path.is_file() {
            return Err(RedactError::InputNotFound(self.path.clone()));
        }
        let doc = Document::load(&self.path).map_err(|e| RedactError::Open {
            source_id: self.source_id(),
            message: e.to_string(),
        })?;
        reject_encrypted(doc, self.source_id())
    }
}

/// Raw PDF bytes supplied by a collaborator
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl DocumentSource for MemorySource {
    fn source_id(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<Document, RedactError> {
        let doc = Document::load_mem(&self.bytes).map_err(|e| RedactError::Open {
            source_id: self.name.clone(),
            message: e.to_string(),
        })?;
        reject_encrypted(doc, self.source_id())
    }
}

fn reject_encrypted(doc: Document, source_id: String) -> Result<Document, RedactError> {
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(RedactError::Encrypted(source_id));
    }
    Ok(doc)
}
