//! Header name canonicalization.

/// Canonicalize a header name to `Title-Case-With-Hyphens`.
///
/// Empty segments (leading, trailing or doubled hyphens) are dropped, so
/// `"x--key"` and `"-x-key-"` both become `"X-Key"`.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join("-")
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
