// ABOUTME: Minimal `{{ .path }}` template rendering against a value tree.
// ABOUTME: Text without delimiters passes through untouched; missing paths are errors.

use thiserror::Error;

use super::value::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated template expression at byte {0}")]
    Unterminated(usize),

    #[error("unsupported template expression \"{0}\" (expected a path like .values.key)")]
    Unsupported(String),

    #[error("no value at {0}")]
    MissingValue(String),
}

/// Whether `text` contains any template delimiters.
pub fn is_template(text: &str) -> bool {
    text.contains(OPEN)
}

/// Substitute every `{{ .a.b }}` expression with the value at that path.
///
/// The first path segment is matched case-insensitively on its first letter so
/// `.Values.x` and `.values.x` both work.
pub fn render_template(text: &str, context: &Value) -> Result<String, TemplateError> {
    if !is_template(text) {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open
            .find(CLOSE)
            .ok_or(TemplateError::Unterminated(offset + start))?;

        let expr = after_open[..end].trim();
        out.push_str(&evaluate(expr, context)?.to_string());

        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

fn evaluate<'a>(expr: &str, context: &'a Value) -> Result<&'a Value, TemplateError> {
    let path = expr
        .strip_prefix('.')
        .ok_or_else(|| TemplateError::Unsupported(expr.to_string()))?;

    if path.is_empty() {
        return Ok(context);
    }

    if path.contains(char::is_whitespace) {
        return Err(TemplateError::Unsupported(expr.to_string()));
    }

    let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if context.lookup([segments[0].as_str()]).is_none() {
        segments[0] = lower_first(&segments[0]);
    }

    context
        .lookup(segments.iter())
        .ok_or_else(|| TemplateError::MissingValue(expr.to_string()))
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
