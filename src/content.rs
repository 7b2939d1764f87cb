//! Content-Type classification.

use std::fmt;

/// Media type token for URL-encoded forms.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
/// Media type token for JSON bodies.
pub const JSON: &str = "application/json";
/// Media type token for multipart forms.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Structural encoding of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFamily {
    Form,
    Json,
    Multipart,
    /// Anything else; body mappings never see these bodies.
    Unstructured,
}

impl ContentFamily {
    /// Classify a `Content-Type` value by substring containment.
    ///
    /// Tokens are checked in the order form, JSON, multipart.
    pub fn classify(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains(FORM_URLENCODED) {
            ContentFamily::Form
        } else if ct.contains(JSON) {
            ContentFamily::Json
        } else if ct.contains(MULTIPART_FORM_DATA) {
            ContentFamily::Multipart
        } else {
            ContentFamily::Unstructured
        }
    }
}

impl fmt::Display for ContentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentFamily::Form => "form",
            ContentFamily::Json => "json",
            ContentFamily::Multipart => "multipart",
            ContentFamily::Unstructured => "unstructured",
        };
        f.write_str(name)
    }
}
