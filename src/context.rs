//! Request context seen by the params agent.
//!
//! The host proxy exposes the inbound request and the outgoing proxy request
//! through [`RequestContext`] and [`ProxyRequest`]. [`HttpContext`] is an
//! in-memory implementation used by the CLI and in tests.

use crate::body::{self, FileHeader, Multimap, MultipartForm};
use crate::header::normalize;

/// Fallback boundary for outgoing multipart bodies.
const DEFAULT_BOUNDARY: &str = "zentinel-params-boundary";

/// Access to the request being processed.
pub trait RequestContext {
    /// Inbound Content-Type, empty if absent.
    fn content_type(&self) -> &str;

    /// Inbound body bytes.
    fn raw_body(&self) -> &[u8];

    /// Inbound headers keyed by canonical name.
    fn headers(&self) -> &Multimap;

    /// Inbound query parameters.
    fn query(&self) -> &Multimap;

    /// The outgoing request builder.
    fn proxy(&mut self) -> &mut dyn ProxyRequest;

    /// Set the status of the response sent back when the request is rejected.
    fn set_status(&mut self, status: u16);

    /// Set the body of the response sent back when the request is rejected.
    fn set_body(&mut self, body: Vec<u8>);
}

/// Mutable view of the request forwarded upstream.
///
/// Headers and query start out as a copy of the inbound request.
pub trait ProxyRequest {
    /// First value of an outgoing header.
    fn header(&self, name: &str) -> Option<&str>;
    fn set_header(&mut self, name: &str, value: String);
    fn add_header(&mut self, name: &str, value: String);
    fn remove_header(&mut self, name: &str);

    /// First value of an outgoing query parameter.
    fn query(&self, name: &str) -> Option<&str>;
    fn set_query(&mut self, name: &str, value: String);
    fn add_query(&mut self, name: &str, value: String);
    fn remove_query(&mut self, name: &str);

    /// Replace the body with an URL-encoded form.
    fn set_form(&mut self, form: Multimap);
    /// Replace the body with raw bytes.
    fn set_raw(&mut self, content_type: &str, body: Vec<u8>);
    /// Replace the body with multipart parts. Attached files are kept.
    fn set_multipart(&mut self, content_type: &str, form: MultipartForm);

    /// Attach a file to the outgoing multipart body.
    fn add_file(&mut self, name: &str, file: FileHeader);
    /// Attach a file, replacing previously attached files of the same name.
    fn set_file(&mut self, name: &str, file: FileHeader);
    fn has_file(&self, name: &str) -> bool;
}

/// Request information for context.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Request path (without query string)
    pub path: String,
    /// Query string (without leading ?)
    pub query_string: Option<String>,
    /// Parsed query parameters
    pub query_params: Multimap,
    /// Request headers, keyed by canonical name
    pub headers: Multimap,
}

impl RequestInfo {
    /// Get a single header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&normalize(name))
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }
}

/// Response information, set only when the request is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseInfo {
    /// HTTP status code
    pub status: Option<u16>,
    /// Response body
    pub body: Option<Vec<u8>>,
}

/// Body of the outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProxyBody {
    /// Forward the inbound body unchanged
    #[default]
    Original,
    /// URL-encoded form fields
    Form(Multimap),
    /// Raw bytes with their Content-Type
    Raw { content_type: String, data: Vec<u8> },
    /// Multipart parts
    Multipart {
        content_type: String,
        form: MultipartForm,
    },
}

/// The request forwarded upstream.
#[derive(Debug, Clone, Default)]
pub struct OutgoingRequest {
    /// Outgoing headers, keyed by canonical name
    pub headers: Multimap,
    /// Outgoing query parameters
    pub query: Multimap,
    /// Outgoing body
    pub body: ProxyBody,
    /// Files attached on top of the body
    pub files: Vec<(String, FileHeader)>,
}

impl OutgoingRequest {
    /// Encode the outgoing query parameters.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k, v)))
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl ProxyRequest for OutgoingRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&normalize(name))
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.headers.insert(normalize(name), vec![value]);
    }

    fn add_header(&mut self, name: &str, value: String) {
        self.headers.entry(normalize(name)).or_default().push(value);
    }

    fn remove_header(&mut self, name: &str) {
        self.headers.shift_remove(&normalize(name));
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .and_then(|v| v.first())
            .map(|s| s.as_str())
    }

    fn set_query(&mut self, name: &str, value: String) {
        self.query.insert(name.to_string(), vec![value]);
    }

    fn add_query(&mut self, name: &str, value: String) {
        self.query.entry(name.to_string()).or_default().push(value);
    }

    fn remove_query(&mut self, name: &str) {
        self.query.shift_remove(name);
    }

    fn set_form(&mut self, form: Multimap) {
        self.body = ProxyBody::Form(form);
    }

    fn set_raw(&mut self, content_type: &str, body: Vec<u8>) {
        self.body = ProxyBody::Raw {
            content_type: content_type.to_string(),
            data: body,
        };
    }

    fn set_multipart(&mut self, content_type: &str, form: MultipartForm) {
        self.body = ProxyBody::Multipart {
            content_type: content_type.to_string(),
            form,
        };
    }

    fn add_file(&mut self, name: &str, file: FileHeader) {
        self.files.push((name.to_string(), file));
    }

    fn set_file(&mut self, name: &str, file: FileHeader) {
        self.files.retain(|(n, _)| n != name);
        self.files.push((name.to_string(), file));
    }

    fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|(n, _)| n == name)
    }
}

/// In-memory request context.
#[derive(Debug, Clone)]
pub struct HttpContext {
    /// Inbound request
    pub request: RequestInfo,
    content_type: String,
    body: Vec<u8>,
    outgoing: OutgoingRequest,
    response: ResponseInfo,
}

impl HttpContext {
    /// Create a context for an inbound request.
    ///
    /// Header names are canonicalized; the outgoing request starts with the
    /// same headers and query parameters.
    pub fn new<I, K, V>(method: &str, uri: &str, headers: I, body: Vec<u8>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut header_map = Multimap::new();
        for (name, value) in headers {
            header_map
                .entry(normalize(name.as_ref()))
                .or_default()
                .push(value.into());
        }

        let (path, query_string) = match uri.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (uri.to_string(), None),
        };
        let query_params = parse_query_string(query_string.as_deref());

        let request = RequestInfo {
            method: method.to_string(),
            path,
            query_string,
            query_params,
            headers: header_map,
        };

        let content_type = request.header("Content-Type").unwrap_or("").to_string();
        let outgoing = OutgoingRequest {
            headers: request.headers.clone(),
            query: request.query_params.clone(),
            ..Default::default()
        };

        Self {
            request,
            content_type,
            body,
            outgoing,
            response: ResponseInfo::default(),
        }
    }

    /// Start building a context.
    pub fn builder(method: &str, uri: &str) -> HttpContextBuilder {
        HttpContextBuilder {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// The outgoing request.
    pub fn outgoing(&self) -> &OutgoingRequest {
        &self.outgoing
    }

    /// The rejection response, if any.
    pub fn response(&self) -> &ResponseInfo {
        &self.response
    }

    /// Outgoing path with the current query string.
    pub fn outgoing_uri(&self) -> String {
        let query = self.outgoing.query_string();
        if query.is_empty() {
            self.request.path.clone()
        } else {
            format!("{}?{}", self.request.path, query)
        }
    }

    /// Content-Type and bytes of the outgoing body.
    pub fn outgoing_body(&self) -> (String, Vec<u8>) {
        match &self.outgoing.body {
            ProxyBody::Original => (self.content_type.clone(), self.body.clone()),
            ProxyBody::Form(form) => (
                crate::content::FORM_URLENCODED.to_string(),
                body::encode_form(form).into_bytes(),
            ),
            ProxyBody::Raw { content_type, data } => (content_type.clone(), data.clone()),
            ProxyBody::Multipart { content_type, form } => {
                let (content_type, boundary) = match body::boundary(content_type) {
                    Some(boundary) => (content_type.clone(), boundary.to_string()),
                    None => (
                        format!(
                            "{}; boundary={DEFAULT_BOUNDARY}",
                            crate::content::MULTIPART_FORM_DATA
                        ),
                        DEFAULT_BOUNDARY.to_string(),
                    ),
                };
                let attachments = self
                    .outgoing
                    .files
                    .iter()
                    .map(|(name, file)| (name.as_str(), file));
                (
                    content_type,
                    body::encode_multipart(&boundary, form, attachments),
                )
            }
        }
    }
}

impl RequestContext for HttpContext {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn raw_body(&self) -> &[u8] {
        &self.body
    }

    fn headers(&self) -> &Multimap {
        &self.request.headers
    }

    fn query(&self) -> &Multimap {
        &self.request.query_params
    }

    fn proxy(&mut self) -> &mut dyn ProxyRequest {
        &mut self.outgoing
    }

    fn set_status(&mut self, status: u16) {
        self.response.status = Some(status);
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.response.body = Some(body);
    }
}

/// Builder for [`HttpContext`].
#[derive(Debug, Clone)]
pub struct HttpContextBuilder {
    method: String,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpContextBuilder {
    /// Add a header. Repeated names accumulate values.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> HttpContext {
        HttpContext::new(&self.method, &self.uri, self.headers, self.body)
    }
}

/// Parse query string into parameter map.
fn parse_query_string(query: Option<&str>) -> Multimap {
    let mut params = Multimap::new();

    if let Some(qs) = query {
        for part in qs.split('&') {
            if let Some((k, v)) = part.split_once('=') {
                let key = urlencoding::decode(k)
                    .unwrap_or_else(|_| k.into())
                    .to_string();
                let value = urlencoding::decode(v)
                    .unwrap_or_else(|_| v.into())
                    .to_string();
                params.entry(key).or_default().push(value);
            } else if !part.is_empty() {
                let key = urlencoding::decode(part)
                    .unwrap_or_else(|_| part.into())
                    .to_string();
                params.entry(key).or_default().push(String::new());
            }
        }
    }

    params
}

/// Get status text for a status code.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_context() -> HttpContext {
        HttpContext::builder("GET", "/api/users?page=1&tag=a&tag=b%20c&flag")
            .header("content-type", "application/json")
            .header("x-custom", "one")
            .header("X-CUSTOM", "two")
            .build()
    }

    #[test]
    fn test_request_info() {
        let ctx = make_context();

        assert_eq!(ctx.request.method, "GET");
        assert_eq!(ctx.request.path, "/api/users");
        assert_eq!(
            ctx.request.query_string.as_deref(),
            Some("page=1&tag=a&tag=b%20c&flag")
        );
        assert_eq!(ctx.content_type(), "application/json");
    }

    #[test]
    fn test_headers_are_canonical() {
        let ctx = make_context();

        assert_eq!(ctx.headers()["X-Custom"], vec!["one", "two"]);
        assert_eq!(ctx.request.header("x-custom"), Some("one"));
        assert!(ctx.headers().get("x-custom").is_none());
    }

    #[test]
    fn test_query_parsing() {
        let ctx = make_context();

        assert_eq!(ctx.query()["page"], vec!["1"]);
        assert_eq!(ctx.query()["tag"], vec!["a", "b c"]);
        assert_eq!(ctx.query()["flag"], vec![""]);
    }

    #[test]
    fn test_outgoing_mirrors_inbound() {
        let mut ctx = make_context();

        assert_eq!(ctx.proxy().header("x-custom"), Some("one"));
        assert_eq!(ctx.proxy().query("tag"), Some("a"));
        assert_eq!(ctx.outgoing().body, ProxyBody::Original);
    }

    #[test]
    fn test_proxy_header_ops() {
        let mut ctx = make_context();
        let proxy = ctx.proxy();

        proxy.set_header("x-new", "1".to_string());
        proxy.add_header("X-NEW", "2".to_string());
        proxy.remove_header("x-custom");

        assert_eq!(ctx.outgoing().headers["X-New"], vec!["1", "2"]);
        assert!(!ctx.outgoing().headers.contains_key("X-Custom"));
        // inbound view is untouched
        assert!(ctx.headers().contains_key("X-Custom"));
    }

    #[test]
    fn test_outgoing_uri() {
        let mut ctx = make_context();
        ctx.proxy().remove_query("tag");
        ctx.proxy().remove_query("flag");
        ctx.proxy().add_query("uid", "4 2".to_string());

        assert_eq!(ctx.outgoing_uri(), "/api/users?page=1&uid=4%202");

        ctx.proxy().remove_query("page");
        ctx.proxy().remove_query("uid");
        assert_eq!(ctx.outgoing_uri(), "/api/users");
    }

    #[test]
    fn test_outgoing_form_body() {
        let mut ctx = make_context();
        let mut form = Multimap::new();
        form.insert("tag".to_string(), vec!["x".to_string()]);
        ctx.proxy().set_form(form);

        let (content_type, data) = ctx.outgoing_body();
        assert_eq!(content_type, "application/x-www-form-urlencoded");
        assert_eq!(data, b"tag=x");
    }

    #[test]
    fn test_outgoing_multipart_includes_attachments() {
        let mut ctx = HttpContext::builder("POST", "/upload")
            .header("Content-Type", "multipart/form-data; boundary=b0")
            .build();
        let mut form = MultipartForm::default();
        form.push_field("user", "42");
        form.push_file("a", FileHeader::new("a.txt", b"A".to_vec()));

        ctx.proxy().set_multipart("multipart/form-data; boundary=b0", form);
        ctx.proxy().add_file("b", FileHeader::new("b.txt", b"B".to_vec()));

        let (content_type, data) = ctx.outgoing_body();
        assert_eq!(content_type, "multipart/form-data; boundary=b0");
        let form = body::parse_multipart(&data, &content_type).unwrap();
        assert_eq!(form.field_values("user"), Some(vec!["42".to_string()]));
        assert_eq!(form.file("a").unwrap().data, b"A");
        assert_eq!(form.file("b").unwrap().filename, "b.txt");
    }

    #[test]
    fn test_set_file_replaces_attachment() {
        let mut ctx = make_context();
        ctx.proxy().add_file("doc", FileHeader::new("1.txt", vec![]));
        ctx.proxy().add_file("doc", FileHeader::new("2.txt", vec![]));
        ctx.proxy().set_file("doc", FileHeader::new("3.txt", vec![]));

        assert_eq!(ctx.outgoing().files.len(), 1);
        assert_eq!(ctx.outgoing().files[0].1.filename, "3.txt");
    }

    #[test]
    fn test_rejection_response() {
        let mut ctx = make_context();
        assert_eq!(ctx.response(), &ResponseInfo::default());

        ctx.set_status(400);
        ctx.set_body(b"nope".to_vec());
        assert_eq!(ctx.response().status, Some(400));
        assert_eq!(status_text(400), "Bad Request");
    }
}
