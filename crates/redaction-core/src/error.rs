use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end an analysis or removal run
#[derive(Error, Debug)]
pub enum RedactError {
    #[error("file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Failed to open PDF {source_id}: {message}")]
    Open { source_id: String, message: String },

    #[error("Encrypted PDFs are not supported: {0}")]
    Encrypted(String),

    #[error("Failed to save {}: {message}", path.display())]
    DocumentSaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Page-level failures. These never abort a document; callers turn them
/// into [`Warning`]s and carry on with the next page.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    #[error("page content unavailable: {0}")]
    ContentUnavailable(String),

    #[error("page content could not be decoded: {0}")]
    ContentDecode(String),

    #[error("glyph trace unavailable: {0}")]
    TraceUnavailable(String),

    #[error("page content could not be rewritten: {0}")]
    Rewrite(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    PageExtractionDegraded,
    PageExtractionFailed,
    RedactionNotApplied,
}

/// Recoverable problem attached to a (possibly partial) result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub page: u32,
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(page: u32, kind: WarningKind, message: impl Into<String>) -> Self {
        let warning = Self {
            page,
            kind,
            message: message.into(),
        };
        tracing::warn!(page, kind = ?warning.kind, "{}", warning.message);
        warning
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Page {}: {}", self.page, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_warning_display_names_the_page() {
        let warning = Warning::new(
            3,
            WarningKind::RedactionNotApplied,
            "redactions may not have been applied",
        );
        assert_eq!(
            warning.to_string(),
            "Page 3: redactions may not have been applied"
        );
    }

    #[test]
    fn test_input_not_found_message() {
        let err = RedactError::InputNotFound(PathBuf::from("scans/memo.pdf"));
        assert_eq!(err.to_string(), "file not found: scans/memo.pdf");
    }

    #[test]
    fn test_warning_serializes_kind_by_name() {
        let warning = Warning::new(1, WarningKind::PageExtractionDegraded, "font missing");
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "PageExtractionDegraded");
        assert_eq!(json["page"], 1);
    }
}
