//! Export format tokens and their MIME mappings.
//!
//! Workspace documents cannot be downloaded directly; they are exported to
//! one of these concrete formats instead.

/// MIME prefix identifying workspace documents.
pub const WORKSPACE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Export format used when a workspace document has no configured format.
pub const DEFAULT_EXPORT_FORMAT: &str = "pdf";

/// Maps an export format token to its MIME type. Tokens are
/// case-insensitive; unknown tokens yield `None`.
pub fn export_mime_type(format: &str) -> Option<&'static str> {
    match format.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "pptx" => Some("application/vnd.openxmlformats-officedocument.presentationml.presentation"),
        "csv" => Some("text/csv"),
        "txt" => Some("text/plain"),
        "html" => Some("text/html"),
        "rtf" => Some("application/rtf"),
        "odt" => Some("application/vnd.oasis.opendocument.text"),
        "ods" => Some("application/vnd.oasis.opendocument.spreadsheet"),
        "odp" => Some("application/vnd.oasis.opendocument.presentation"),
        "png" => Some("image/png"),
        "jpeg" => Some("image/jpeg"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// True when the MIME type denotes a workspace document that must be
/// exported rather than downloaded.
pub fn is_workspace_mime(mime_type: &str) -> bool {
    mime_type.starts_with(WORKSPACE_MIME_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_formats_resolve() {
        assert_eq!(export_mime_type("pdf"), Some("application/pdf"));
        assert_eq!(export_mime_type("csv"), Some("text/csv"));
        assert_eq!(export_mime_type("svg"), Some("image/svg+xml"));
        assert_eq!(
            export_mime_type("xlsx"),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        );
    }

    #[test]
    fn formats_are_case_insensitive() {
        assert_eq!(export_mime_type("PDF"), Some("application/pdf"));
        assert_eq!(export_mime_type("Xlsx"), export_mime_type("xlsx"));
    }

    #[test]
    fn unknown_format_is_none() {
        assert_eq!(export_mime_type("exe"), None);
        assert_eq!(export_mime_type(""), None);
    }

    #[test]
    fn workspace_mime_detection() {
        assert!(is_workspace_mime("application/vnd.google-apps.spreadsheet"));
        assert!(is_workspace_mime("application/vnd.google-apps.document"));
        assert!(!is_workspace_mime("application/pdf"));
        assert!(!is_workspace_mime(""));
    }
}
