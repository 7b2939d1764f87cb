//! Parameter extraction, projection and writing.
//!
//! A request flows through the stages in [`extract`], [`project`] and
//! [`write`] once per configured mapping, all sharing a single
//! [`WorkingSet`] that is flushed to the outgoing request at the end.

pub mod extract;
pub mod project;
pub mod write;

pub use self::extract::{extract, remove_source};
pub use self::project::project;
pub use self::write::write;

use crate::body::{self, BodyParseError, FileHeader, Multimap, MultipartForm};
use crate::content::ContentFamily;
use crate::context::{ProxyRequest, RequestContext};
use crate::header::normalize;
use serde_json::{Map, Value as JsonValue};

/// A parameter value, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Header, query or form field values
    List(Vec<String>),
    /// A value taken from a JSON body
    Json(JsonValue),
    /// A multipart file part
    File(FileHeader),
}

impl ParamValue {
    /// Short shape name for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::List(_) => "list",
            ParamValue::Json(_) => "json",
            ParamValue::File(_) => "file",
        }
    }
}

/// Errors that reject a request.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("malformed request body: {0}")]
    BodyParse(#[from] BodyParseError),

    #[error("required parameter '{name}' is missing")]
    MissingParam { name: String },

    #[error("illegal {field} '{value}' in parameter '{name}'")]
    IllegalPosition {
        name: String,
        field: &'static str,
        value: String,
    },

    #[error("parameter '{name}' cannot be written as {target}")]
    UnsupportedProjection { name: String, target: String },

    #[error("parameter '{name}' conflicts with an existing {target} value")]
    Conflict { name: String, target: String },
}

/// Per-request decoded view of the inbound request.
///
/// Header and query maps are copies of the inbound request: removals are
/// applied to them so later mappings see them, writes go to the outgoing
/// request only. Body maps receive both removals and writes, and the body
/// is only re-encoded once one of them changed.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    /// Body family of the inbound request
    pub family: ContentFamily,
    /// Inbound Content-Type, reused when re-encoding the body
    pub content_type: String,
    /// Headers keyed by canonical name
    pub headers: Multimap,
    /// Query parameters
    pub query: Multimap,
    /// Top-level members of a JSON body
    pub body_json: Map<String, JsonValue>,
    /// Form fields
    pub body_form: Multimap,
    /// Multipart parts, fields and files
    pub body_multipart: MultipartForm,
    /// Set once a body map was modified
    pub body_changed: bool,
}

impl WorkingSet {
    /// Build the working set from the inbound side of a request context.
    pub fn from_request(ctx: &dyn RequestContext) -> Result<Self, BodyParseError> {
        let content_type = ctx.content_type().to_string();
        let family = ContentFamily::classify(&content_type);
        let parts = body::parse(ctx.raw_body(), &content_type, family)?;

        let mut headers = Multimap::new();
        for (name, values) in ctx.headers() {
            headers
                .entry(normalize(name))
                .or_default()
                .extend(values.iter().cloned());
        }

        Ok(Self {
            family,
            content_type,
            headers,
            query: ctx.query().clone(),
            body_json: parts.json,
            body_form: parts.form,
            body_multipart: parts.multipart,
            body_changed: false,
        })
    }

    /// Flush the body maps to the outgoing request.
    ///
    /// An unchanged body is left alone and forwarded as received.
    pub fn finalize(self, proxy: &mut dyn ProxyRequest) {
        if !self.body_changed {
            return;
        }
        match self.family {
            ContentFamily::Form => proxy.set_form(self.body_form),
            ContentFamily::Json => {
                let body = JsonValue::Object(self.body_json).to_string().into_bytes();
                proxy.set_raw(&self.content_type, body);
            }
            ContentFamily::Multipart => {
                proxy.set_multipart(&self.content_type, self.body_multipart)
            }
            ContentFamily::Unstructured => {}
        }
    }
}
