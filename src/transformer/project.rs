//! Conversion of extracted values into the shape a target expects.

use super::{ParamValue, TransformError};
use crate::config::Position;
use crate::content::ContentFamily;
use crate::rule::ParamRule;
use serde_json::Value as JsonValue;

/// Convert `value` for writing to `target` of a request with body `family`.
///
/// JSON values headed for a string-only location are serialized to their
/// JSON text, so a JSON string keeps its quotes.
pub fn project(
    value: ParamValue,
    rule: &ParamRule,
    target: Position,
    family: ContentFamily,
) -> Result<ParamValue, TransformError> {
    match (target, value) {
        (Position::Header | Position::Query, ParamValue::List(values)) => {
            Ok(ParamValue::List(values))
        }
        (Position::Header | Position::Query, ParamValue::Json(json)) => {
            Ok(ParamValue::List(vec![json.to_string()]))
        }
        (Position::Header | Position::Query, ParamValue::File(_)) => {
            Err(unsupported(rule, target, family))
        }
        (Position::Body, value) => project_body(value, rule, family),
    }
}

fn project_body(
    value: ParamValue,
    rule: &ParamRule,
    family: ContentFamily,
) -> Result<ParamValue, TransformError> {
    match (family, value) {
        (ContentFamily::Unstructured, value) => Ok(value),
        (ContentFamily::Form | ContentFamily::Multipart, ParamValue::List(values)) => {
            Ok(ParamValue::List(values))
        }
        (ContentFamily::Form | ContentFamily::Multipart, ParamValue::Json(json)) => {
            Ok(ParamValue::List(vec![json.to_string()]))
        }
        (ContentFamily::Multipart, ParamValue::File(file)) => Ok(ParamValue::File(file)),
        (ContentFamily::Json, ParamValue::List(values)) => Ok(ParamValue::Json(
            JsonValue::Array(values.into_iter().map(JsonValue::String).collect()),
        )),
        (ContentFamily::Json, ParamValue::Json(json)) => Ok(ParamValue::Json(json)),
        (ContentFamily::Form | ContentFamily::Json, ParamValue::File(_)) => {
            Err(unsupported(rule, Position::Body, family))
        }
    }
}

fn unsupported(rule: &ParamRule, target: Position, family: ContentFamily) -> TransformError {
    let target = match target {
        Position::Body => format!("{family} body"),
        other => other.to_string(),
    };
    TransformError::UnsupportedProjection {
        name: rule.source_name.clone(),
        target,
    }
}
