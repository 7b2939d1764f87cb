//! Source parameter lookup and removal.

use super::{ParamValue, WorkingSet};
use crate::config::Position;
use crate::content::ContentFamily;
use crate::context::ProxyRequest;
use crate::header::normalize;
use crate::rule::ParamRule;

/// Look up the source value of a mapping. `None` means the source is absent.
pub fn extract(rule: &ParamRule, source: Position, ws: &WorkingSet) -> Option<ParamValue> {
    let name = rule.source_name.as_str();
    match source {
        Position::Header => ws
            .headers
            .get(&normalize(name))
            .cloned()
            .map(ParamValue::List),
        Position::Query => ws.query.get(name).cloned().map(ParamValue::List),
        Position::Body => match ws.family {
            ContentFamily::Form => ws.body_form.get(name).cloned().map(ParamValue::List),
            ContentFamily::Json => ws.body_json.get(name).cloned().map(ParamValue::Json),
            ContentFamily::Multipart => ws
                .body_multipart
                .field_values(name)
                .map(ParamValue::List)
                .or_else(|| ws.body_multipart.file(name).map(ParamValue::File)),
            ContentFamily::Unstructured => None,
        },
    }
}

/// Delete the source occurrence of a mapping.
///
/// Header and query removals also apply to the outgoing request, since
/// those are forwarded as-is unless removed. Body removals only touch the
/// working set; the body is re-encoded when the request is finalized.
/// A multipart source loses its field parts, or its file parts when it has
/// no fields.
pub fn remove_source(
    rule: &ParamRule,
    source: Position,
    ws: &mut WorkingSet,
    proxy: &mut dyn ProxyRequest,
) {
    let name = rule.source_name.as_str();
    match source {
        Position::Header => {
            let name = normalize(name);
            ws.headers.shift_remove(&name);
            proxy.remove_header(&name);
        }
        Position::Query => {
            ws.query.shift_remove(name);
            proxy.remove_query(name);
        }
        Position::Body => {
            let removed = match ws.family {
                ContentFamily::Form => ws.body_form.shift_remove(name).is_some(),
                ContentFamily::Json => ws.body_json.shift_remove(name).is_some(),
                ContentFamily::Multipart => {
                    ws.body_multipart.remove_fields(name) || ws.body_multipart.remove_files(name)
                }
                ContentFamily::Unstructured => false,
            };
            ws.body_changed |= removed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::FileHeader;
    use crate::config::ParamMapping;
    use crate::context::{HttpContext, RequestContext};
    use serde_json::json;

    fn rule(name: &str, position: &str) -> ParamRule {
        ParamRule::compile(&ParamMapping {
            param_name: name.to_string(),
            param_position: position.to_string(),
            proxy_param_name: "target".to_string(),
            proxy_param_position: "header".to_string(),
            required: false,
            param_conflict_solution: String::new(),
        })
    }

    fn working_set(content_type: &str, body: &str) -> (HttpContext, WorkingSet) {
        let ctx = HttpContext::builder("POST", "/path?page=1&page=2")
            .header("Content-Type", content_type)
            .header("x-api-key", "secret")
            .body(body)
            .build();
        let ws = WorkingSet::from_request(&ctx).unwrap();
        (ctx, ws)
    }

    #[test]
    fn test_extract_header_is_case_insensitive() {
        let (_, ws) = working_set("text/plain", "");
        let value = extract(&rule("X-API-KEY", "header"), Position::Header, &ws);
        assert_eq!(value, Some(ParamValue::List(vec!["secret".to_string()])));
    }

    #[test]
    fn test_extract_query_is_verbatim() {
        let (_, ws) = working_set("text/plain", "");
        assert_eq!(
            extract(&rule("page", "query"), Position::Query, &ws),
            Some(ParamValue::List(vec!["1".to_string(), "2".to_string()]))
        );
        assert_eq!(extract(&rule("Page", "query"), Position::Query, &ws), None);
    }

    #[test]
    fn test_extract_form_body() {
        let (_, ws) = working_set("application/x-www-form-urlencoded", "user=42");
        assert_eq!(
            extract(&rule("user", "body"), Position::Body, &ws),
            Some(ParamValue::List(vec!["42".to_string()]))
        );
        assert_eq!(extract(&rule("missing", "body"), Position::Body, &ws), None);
    }

    #[test]
    fn test_extract_json_body_keeps_structure() {
        let (_, ws) = working_set("application/json", r#"{"profile": {"age": 30}}"#);
        assert_eq!(
            extract(&rule("profile", "body"), Position::Body, &ws),
            Some(ParamValue::Json(json!({"age": 30})))
        );
    }

    #[test]
    fn test_extract_multipart_prefers_fields() {
        let (_, mut ws) = working_set("multipart/form-data; boundary=b", "");
        ws.body_multipart
            .push_file("doc", FileHeader::new("doc.txt", b"x".to_vec()));
        ws.body_multipart.push_field("doc", "text");
        ws.body_multipart
            .push_file("avatar", FileHeader::new("a.png", b"y".to_vec()));
        ws.body_multipart
            .push_file("avatar", FileHeader::new("b.png", b"z".to_vec()));

        assert_eq!(
            extract(&rule("doc", "body"), Position::Body, &ws),
            Some(ParamValue::List(vec!["text".to_string()]))
        );
        assert!(matches!(
            extract(&rule("avatar", "body"), Position::Body, &ws),
            Some(ParamValue::File(f)) if f.filename == "a.png"
        ));
    }

    #[test]
    fn test_extract_unstructured_body_is_missing() {
        let (_, ws) = working_set("text/plain", "user=42");
        assert_eq!(extract(&rule("user", "body"), Position::Body, &ws), None);
    }

    #[test]
    fn test_remove_header_and_query() {
        let (mut ctx, mut ws) = working_set("text/plain", "");

        remove_source(&rule("x-api-key", "header"), Position::Header, &mut ws, ctx.proxy());
        remove_source(&rule("page", "query"), Position::Query, &mut ws, ctx.proxy());

        assert!(!ws.headers.contains_key("X-Api-Key"));
        assert!(!ws.query.contains_key("page"));
        assert!(ctx.proxy().header("X-Api-Key").is_none());
        assert!(ctx.proxy().query("page").is_none());
    }

    #[test]
    fn test_remove_multipart_field_then_file() {
        let (mut ctx, mut ws) = working_set("multipart/form-data; boundary=b", "");
        ws.body_multipart.push_field("doc", "text");
        ws.body_multipart
            .push_file("doc", FileHeader::new("doc.txt", b"x".to_vec()));
        ws.body_multipart
            .push_file("doc", FileHeader::new("doc2.txt", b"y".to_vec()));

        let doc = rule("doc", "body");
        remove_source(&doc, Position::Body, &mut ws, ctx.proxy());
        assert_eq!(ws.body_multipart.field_values("doc"), None);
        assert_eq!(ws.body_multipart.files("doc").len(), 2);
        assert!(ws.body_changed);

        remove_source(&doc, Position::Body, &mut ws, ctx.proxy());
        assert!(ws.body_multipart.is_empty());
    }

    #[test]
    fn test_header_removal_leaves_body_unchanged() {
        let (mut ctx, mut ws) = working_set("application/json", r#"{"a": 1}"#);

        remove_source(&rule("x-api-key", "header"), Position::Header, &mut ws, ctx.proxy());

        assert!(!ws.body_changed);
    }
}
