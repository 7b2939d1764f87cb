//! Request body decoding and encoding.
//!
//! Bodies are decoded into the shapes the parameter pipeline works on:
//! a JSON object for JSON bodies, an ordered field multimap for form
//! bodies, and an ordered list of parts for multipart bodies.

use crate::content::ContentFamily;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Ordered name to values multimap.
pub type Multimap = IndexMap<String, Vec<String>>;

/// A file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// Client-supplied file name
    pub filename: String,
    /// Part Content-Type, if given
    pub content_type: Option<String>,
    /// Raw file content
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl FileHeader {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A single part of a multipart body, kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Form field name
    pub name: String,
    /// Set for file parts
    pub filename: Option<String>,
    /// Part Content-Type, if given
    pub content_type: Option<String>,
    /// Raw part content
    pub data: Vec<u8>,
}

impl Part {
    /// A plain field part.
    pub fn field(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into(),
        }
    }

    /// A file part.
    pub fn file(name: impl Into<String>, file: FileHeader) -> Self {
        Self {
            name: name.into(),
            filename: Some(file.filename),
            content_type: file.content_type,
            data: file.data,
        }
    }

    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    /// Field content as text. Invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    fn to_file_header(&self) -> Option<FileHeader> {
        let filename = self.filename.clone()?;
        Some(FileHeader {
            filename,
            content_type: self.content_type.clone(),
            data: self.data.clone(),
        })
    }
}

/// A decoded `multipart/form-data` body.
///
/// Parts keep their order, their bytes and repeated names, so an untouched
/// part is encoded exactly as it was received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub parts: Vec<Part>,
}

impl MultipartForm {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Text values of the field parts named `name`, `None` if there are none.
    pub fn field_values(&self, name: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .parts
            .iter()
            .filter(|p| !p.is_file() && p.name == name)
            .map(Part::text)
            .collect();
        (!values.is_empty()).then_some(values)
    }

    /// First file part named `name`.
    pub fn file(&self, name: &str) -> Option<FileHeader> {
        self.parts
            .iter()
            .find(|p| p.is_file() && p.name == name)
            .and_then(Part::to_file_header)
    }

    /// Every file part named `name`, in body order.
    pub fn files(&self, name: &str) -> Vec<FileHeader> {
        self.parts
            .iter()
            .filter(|p| p.name == name)
            .filter_map(Part::to_file_header)
            .collect()
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.is_file() && p.name == name)
    }

    pub fn push_field(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.parts.push(Part::field(name, value));
    }

    pub fn push_file(&mut self, name: &str, file: FileHeader) {
        self.parts.push(Part::file(name, file));
    }

    /// Remove all field parts named `name`. Returns whether any was removed.
    pub fn remove_fields(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| p.is_file() || p.name != name);
        self.parts.len() != before
    }

    /// Remove all file parts named `name`. Returns whether any was removed.
    pub fn remove_files(&mut self, name: &str) -> bool {
        let before = self.parts.len();
        self.parts.retain(|p| !p.is_file() || p.name != name);
        self.parts.len() != before
    }
}

/// Decoded body content. Only the part relevant to the family is filled.
#[derive(Debug, Clone, Default)]
pub struct BodyParts {
    pub json: Map<String, JsonValue>,
    pub form: Multimap,
    pub multipart: MultipartForm,
}

/// Errors that can occur while decoding a request body.
#[derive(Debug, thiserror::Error)]
pub enum BodyParseError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("JSON body must be an object")]
    NotAnObject,

    #[error("multipart body has no boundary in its Content-Type")]
    MissingBoundary,

    #[error("invalid multipart body: {0}")]
    InvalidMultipart(String),
}

/// Decode `raw` according to its content family.
pub fn parse(
    raw: &[u8],
    content_type: &str,
    family: ContentFamily,
) -> Result<BodyParts, BodyParseError> {
    let mut parts = BodyParts::default();
    match family {
        ContentFamily::Form => parts.form = parse_form(raw),
        ContentFamily::Json => parts.json = parse_json_object(raw)?,
        ContentFamily::Multipart => parts.multipart = parse_multipart(raw, content_type)?,
        ContentFamily::Unstructured => {}
    }
    Ok(parts)
}

/// Decode an URL-encoded form body.
pub fn parse_form(raw: &[u8]) -> Multimap {
    let mut form = Multimap::new();
    for (key, value) in form_urlencoded::parse(raw) {
        form.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    form
}

/// Decode a JSON object body. An empty body is an empty object.
pub fn parse_json_object(raw: &[u8]) -> Result<Map<String, JsonValue>, BodyParseError> {
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<JsonValue>(raw)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(BodyParseError::NotAnObject),
    }
}

/// Extract the `boundary` parameter from a multipart Content-Type.
pub fn boundary(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Decode a `multipart/form-data` body into its parts.
pub fn parse_multipart(
    raw: &[u8],
    content_type: &str,
) -> Result<MultipartForm, BodyParseError> {
    let boundary = boundary(content_type).ok_or(BodyParseError::MissingBoundary)?;
    let mut form = MultipartForm::default();

    if raw.is_empty() {
        return Ok(form);
    }

    let delimiter = format!("--{boundary}").into_bytes();
    let separator = format!("\r\n--{boundary}").into_bytes();

    let start = find(raw, &delimiter).ok_or_else(|| invalid("missing opening boundary"))?;
    let mut rest = &raw[start + delimiter.len()..];

    loop {
        if rest.starts_with(b"--") {
            break;
        }
        rest = rest
            .strip_prefix(b"\r\n")
            .ok_or_else(|| invalid("malformed boundary line"))?;

        let header_end = find(rest, b"\r\n\r\n").ok_or_else(|| invalid("part without headers"))?;
        let headers = PartHeaders::parse(&String::from_utf8_lossy(&rest[..header_end]));
        let content_start = header_end + 4;
        let content_len = find(&rest[content_start..], &separator)
            .ok_or_else(|| invalid("unterminated part"))?;

        form.parts.push(Part {
            name: headers
                .name
                .ok_or_else(|| invalid("part without a name"))?,
            filename: headers.filename,
            content_type: headers.content_type,
            data: rest[content_start..content_start + content_len].to_vec(),
        });

        rest = &rest[content_start + content_len + separator.len()..];
    }

    Ok(form)
}

/// Encode fields as `application/x-www-form-urlencoded`.
pub fn encode_form(form: &Multimap) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in form {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.finish()
}

/// Encode parts, followed by extra file attachments, as a
/// `multipart/form-data` body.
pub fn encode_multipart<'a>(
    boundary: &str,
    form: &MultipartForm,
    attachments: impl IntoIterator<Item = (&'a str, &'a FileHeader)>,
) -> Vec<u8> {
    let mut out = Vec::new();

    for part in &form.parts {
        write_part(
            &mut out,
            boundary,
            &part.name,
            part.filename.as_deref(),
            part.content_type.as_deref(),
            &part.data,
        );
    }

    for (name, file) in attachments {
        let content_type = file
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        write_part(
            &mut out,
            boundary,
            name,
            Some(&file.filename),
            Some(content_type),
            &file.data,
        );
    }

    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

fn write_part(
    out: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    filename: Option<&str>,
    content_type: Option<&str>,
    data: &[u8],
) {
    let mut head = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name={}",
        quote(name)
    );
    if let Some(filename) = filename {
        head.push_str("; filename=");
        head.push_str(&quote(filename));
    }
    head.push_str("\r\n");
    if let Some(content_type) = content_type {
        head.push_str("Content-Type: ");
        head.push_str(&strip_line_breaks(content_type));
        head.push_str("\r\n");
    }
    head.push_str("\r\n");

    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Quote a disposition parameter value. Line breaks are dropped.
fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in strip_line_breaks(value).chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

impl PartHeaders {
    fn parse(block: &str) -> Self {
        let mut headers = Self::default();
        for line in block.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("content-disposition") {
                for (k, v) in disposition_params(value) {
                    match k.as_str() {
                        "name" => headers.name = Some(v),
                        "filename" => headers.filename = Some(v),
                        _ => {}
                    }
                }
            } else if key.eq_ignore_ascii_case("content-type") {
                headers.content_type = Some(value.trim().to_string());
            }
        }
        headers
    }
}

/// Split the parameters of a Content-Disposition value.
///
/// Quoted values may contain `;` and `\"`. A backslash only escapes `"`
/// and `\`, so Windows paths in filenames survive.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = value.chars().peekable();

    // disposition type
    for c in chars.by_ref() {
        if c == ';' {
            break;
        }
    }

    while chars.peek().is_some() {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }

        let mut val = String::new();
        if chars.next() == Some('=') {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek() == Some(&'"') {
                chars.next();
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' if matches!(chars.peek(), Some('"' | '\\')) => {
                            if let Some(escaped) = chars.next() {
                                val.push(escaped);
                            }
                        }
                        c => val.push(c),
                    }
                }
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
            } else {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                    val.push(c);
                }
                val = val.trim().to_string();
            }
        }

        let key = key.trim();
        if !key.is_empty() {
            params.push((key.to_ascii_lowercase(), val));
        }
    }

    params
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn invalid(reason: &str) -> BodyParseError {
    BodyParseError::InvalidMultipart(reason.to_string())
}
