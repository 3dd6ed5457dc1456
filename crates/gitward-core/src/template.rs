//! Field templates such as `deploy/{{.metadata.namespace}}/{{.metadata.name}}.yaml`.
//!
//! A placeholder is a dotted field path inside `{{ }}`, resolved against the
//! submitted object. Strings, numbers and booleans are substituted as text.

use serde_yaml::Value;

use crate::error::{Error, Result};

/// Expand every `{{.field.path}}` in `template` against `data`.
///
/// # Errors
/// Returns `Template` for an unclosed placeholder, a path that does not
/// resolve, or a path that resolves to a map or list.
pub fn expand(template: &str, data: &Value) -> Result<String> {
    let err = |message: String| Error::Template {
        template: template.to_string(),
        message,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| err("unclosed placeholder".into()))?;
        let expr = after[..end].trim();
        out.push_str(&resolve(expr, data).map_err(err)?);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Expand an optional template; `None` and empty templates stay `None`.
///
/// # Errors
/// See [`expand`].
pub fn expand_opt(template: Option<&str>, data: &Value) -> Result<Option<String>> {
    match template {
        Some(t) if !t.is_empty() => expand(t, data).map(Some),
        _ => Ok(None),
    }
}

fn resolve(expr: &str, data: &Value) -> std::result::Result<String, String> {
    let path = expr
        .strip_prefix('.')
        .ok_or_else(|| format!("placeholder {expr:?} must start with '.'"))?;

    let mut node = data;
    for field in path.split('.').filter(|f| !f.is_empty()) {
        node = node
            .get(field)
            .ok_or_else(|| format!("field {expr:?} not found"))?;
    }

    match node {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(format!("field {expr:?} is not a scalar")),
    }
}
