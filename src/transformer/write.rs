//! Writing projected values to the outgoing request.

use super::{ParamValue, TransformError, WorkingSet};
use crate::body::FileHeader;
use crate::config::{ConflictSolution, Position};
use crate::content::ContentFamily;
use crate::context::ProxyRequest;
use crate::header::normalize;
use crate::rule::ParamRule;
use serde_json::Value as JsonValue;
use tracing::debug;

/// What a write does given the policy and whether the target is occupied.
enum WriteMode {
    /// Target empty, or overwrite requested
    Replace,
    /// Target occupied, merge requested
    Append,
    /// Target occupied, keep the existing value
    Skip,
}

/// Resolve the conflict policy of `rule` for a write to `target`.
fn write_mode(
    rule: &ParamRule,
    occupied: bool,
    target: &str,
) -> Result<WriteMode, TransformError> {
    if !occupied {
        return Ok(WriteMode::Replace);
    }
    match rule.conflict {
        ConflictSolution::Merge => Ok(WriteMode::Append),
        ConflictSolution::Overwrite => Ok(WriteMode::Replace),
        ConflictSolution::KeepOrigin => Ok(WriteMode::Skip),
        ConflictSolution::Error => Err(TransformError::Conflict {
            name: rule.target_name.clone(),
            target: target.to_string(),
        }),
    }
}

/// Write a projected value to `target`.
pub fn write(
    rule: &ParamRule,
    target: Position,
    value: ParamValue,
    ws: &mut WorkingSet,
    proxy: &mut dyn ProxyRequest,
) -> Result<(), TransformError> {
    match (target, value) {
        (Position::Header, ParamValue::List(values)) => write_header(rule, values, proxy),
        (Position::Query, ParamValue::List(values)) => write_query(rule, values, proxy),
        (Position::Body, value) => write_body(rule, value, ws, proxy),
        (target, value) => Err(TransformError::UnsupportedProjection {
            name: rule.source_name.clone(),
            target: format!("{target} from a {} value", value.kind()),
        }),
    }
}

/// Only the first value is ever written to a header.
fn write_header(
    rule: &ParamRule,
    values: Vec<String>,
    proxy: &mut dyn ProxyRequest,
) -> Result<(), TransformError> {
    let name = normalize(&rule.target_name);
    let Some(value) = values.into_iter().next() else {
        return Ok(());
    };

    let occupied = proxy.header(&name).is_some_and(|v| !v.is_empty());
    match write_mode(rule, occupied, "header")? {
        WriteMode::Replace => proxy.set_header(&name, value),
        WriteMode::Append => proxy.add_header(&name, value),
        WriteMode::Skip => debug!(header = %name, "Header already set, keeping original"),
    }
    Ok(())
}

/// Set the first value unless merging, then add the rest.
fn write_query(
    rule: &ParamRule,
    values: Vec<String>,
    proxy: &mut dyn ProxyRequest,
) -> Result<(), TransformError> {
    let name = rule.target_name.as_str();
    let occupied = proxy.query(name).is_some_and(|v| !v.is_empty());

    let mut replace = match write_mode(rule, occupied, "query")? {
        WriteMode::Replace => true,
        WriteMode::Append => false,
        WriteMode::Skip => {
            debug!(query = %name, "Query parameter already set, keeping original");
            return Ok(());
        }
    };

    for value in values {
        if replace {
            proxy.set_query(name, value);
            replace = false;
        } else {
            proxy.add_query(name, value);
        }
    }
    Ok(())
}

/// Dispatch a body write on the inbound body family.
fn write_body(
    rule: &ParamRule,
    value: ParamValue,
    ws: &mut WorkingSet,
    proxy: &mut dyn ProxyRequest,
) -> Result<(), TransformError> {
    let name = rule.target_name.as_str();
    match (ws.family, value) {
        (ContentFamily::Unstructured, _) => {
            debug!(param = %name, "Body is not structured, skipping body write");
            Ok(())
        }
        (ContentFamily::Json, ParamValue::Json(json)) => write_json_field(rule, json, ws),
        (ContentFamily::Form, ParamValue::List(values)) => write_form_field(rule, values, ws),
        (ContentFamily::Multipart, ParamValue::List(values)) => {
            write_multipart_field(rule, values, ws)
        }
        (ContentFamily::Multipart, ParamValue::File(file)) => write_file(rule, file, ws, proxy),
        (family, value) => Err(TransformError::UnsupportedProjection {
            name: rule.source_name.clone(),
            target: format!("{family} body from a {} value", value.kind()),
        }),
    }
}

/// Later writes to the same key win unless a stricter policy applies.
fn write_json_field(
    rule: &ParamRule,
    json: JsonValue,
    ws: &mut WorkingSet,
) -> Result<(), TransformError> {
    let name = &rule.target_name;
    let occupied = ws.body_json.contains_key(name);
    match write_mode(rule, occupied, "body")? {
        WriteMode::Replace | WriteMode::Append => {
            ws.body_json.insert(name.clone(), json);
            ws.body_changed = true;
        }
        WriteMode::Skip => {}
    }
    Ok(())
}

/// Replace or extend the values of an URL-encoded form field.
fn write_form_field(
    rule: &ParamRule,
    values: Vec<String>,
    ws: &mut WorkingSet,
) -> Result<(), TransformError> {
    let name = &rule.target_name;
    let occupied = ws.body_form.contains_key(name);
    match write_mode(rule, occupied, "body")? {
        WriteMode::Replace => {
            ws.body_form.insert(name.clone(), values);
        }
        WriteMode::Append => ws.body_form.entry(name.clone()).or_default().extend(values),
        WriteMode::Skip => return Ok(()),
    }
    ws.body_changed = true;
    Ok(())
}

/// Add one field part per value, dropping existing field parts on replace.
fn write_multipart_field(
    rule: &ParamRule,
    values: Vec<String>,
    ws: &mut WorkingSet,
) -> Result<(), TransformError> {
    let name = rule.target_name.as_str();
    let occupied = ws.body_multipart.field_values(name).is_some();
    match write_mode(rule, occupied, "body")? {
        WriteMode::Replace => {
            ws.body_multipart.remove_fields(name);
        }
        WriteMode::Append => {}
        WriteMode::Skip => return Ok(()),
    }
    for value in values {
        ws.body_multipart.push_field(name, value);
    }
    ws.body_changed = true;
    Ok(())
}

/// Files are attached to the outgoing request directly, never merged into
/// the parsed parts.
fn write_file(
    rule: &ParamRule,
    file: FileHeader,
    ws: &mut WorkingSet,
    proxy: &mut dyn ProxyRequest,
) -> Result<(), TransformError> {
    let name = rule.target_name.as_str();
    let occupied = ws.body_multipart.has_file(name) || proxy.has_file(name);
    match write_mode(rule, occupied, "file")? {
        WriteMode::Replace => {
            ws.body_multipart.remove_files(name);
            proxy.set_file(name, file);
        }
        WriteMode::Append => proxy.add_file(name, file),
        WriteMode::Skip => return Ok(()),
    }
    ws.body_changed = true;
    Ok(())
}
