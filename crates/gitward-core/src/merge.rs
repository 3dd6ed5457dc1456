//! Override merge of incoming objects into multi-document YAML files.
//!
//! Files are handled as text split on `---` lines. Only the block holding
//! the target object is rewritten; every other block keeps its bytes.

use std::ops::Range;

use serde_yaml::Value;

use crate::object::{ObjectKey, RepoObject};

/// One document of a YAML stream and where it sits in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// From the start of the separator line (or of the file) to the next
    /// separator.
    pub span: Range<usize>,
    /// Where the document's own lines start, after the separator line.
    pub body: usize,
    /// The separator line carries content of its own, e.g. `--- key: v`.
    pub inline: bool,
    pub value: Value,
}

impl Document {
    fn has_separator(&self) -> bool {
        self.span.start < self.body
    }

    #[must_use]
    pub fn key(&self) -> Option<ObjectKey> {
        ObjectKey::of(&self.value)
    }
}

/// `---` followed by the end of the line or by whitespace.
fn is_separator(line: &str) -> bool {
    line.strip_prefix("---")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// What follows the marker on a separator line, minus a trailing comment.
fn inline_content(line: &str) -> &str {
    let rest = line.get(3..).unwrap_or_default().trim();
    if rest.starts_with('#') { "" } else { rest }
}

/// Split a YAML stream into its documents.
///
/// Empty and comment-only documents parse as `Value::Null`.
///
/// # Errors
/// Returns the parser error of the first malformed document.
pub fn documents(text: &str) -> Result<Vec<Document>, serde_yaml::Error> {
    let mut spans = Vec::new();
    let (mut start, mut body, mut offset) = (0, 0, 0);

    for line in text.split_inclusive('\n') {
        if is_separator(line) {
            spans.push((start..offset, body));
            start = offset;
            body = offset + line.len();
        }
        offset += line.len();
    }
    spans.push((start..text.len(), body));

    spans
        .into_iter()
        .map(|(span, body)| {
            let inline = inline_content(&text[span.start..body]);
            let value = if inline.is_empty() {
                serde_yaml::from_str(&text[body..span.end])?
            } else {
                serde_yaml::from_str(&format!("{inline}\n{}", &text[body..span.end]))?
            };
            Ok(Document {
                span,
                body,
                inline: !inline.is_empty(),
                value,
            })
        })
        .collect()
}

/// Deep-merge `incoming` into `base`.
///
/// Maps merge key by key; anything else in `incoming` replaces the value in
/// `base` wholesale, lists included.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Mapping(existing), Value::Mapping(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Merge `object` into the document with the same identity.
///
/// Returns the new file text, or `None` when no document matches. The text
/// comes back unchanged when the merge changes no field.
///
/// # Errors
/// Returns error if the file does not parse or the merged document can't
/// be serialized.
pub fn merge_into(text: &str, object: &RepoObject) -> Result<Option<String>, serde_yaml::Error> {
    let docs = documents(text)?;
    let Some(doc) = docs.iter().find(|d| d.key().as_ref() == Some(&object.key)) else {
        return Ok(None);
    };

    let mut merged = doc.value.clone();
    deep_merge(&mut merged, object.body.clone());
    if merged == doc.value {
        return Ok(Some(text.to_string()));
    }
    let block = serde_yaml::to_string(&merged)?;

    let mut out = String::with_capacity(text.len() + block.len());
    if doc.inline {
        // The content moves off the separator line into the block.
        out.push_str(&text[..doc.span.start]);
        out.push_str("---\n");
    } else {
        out.push_str(&text[..doc.body]);
    }
    out.push_str(&block);
    out.push_str(&text[doc.span.end..]);
    Ok(Some(out))
}

/// Outcome of [`remove_from`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The document was removed; the rest of the file remains.
    Removed(String),
    /// The document was the only one; the file should be deleted.
    Emptied,
    NotFound,
}

/// Cut the document with identity `key` out of `text`.
///
/// # Errors
/// Returns error if the file does not parse.
pub fn remove_from(text: &str, key: &ObjectKey) -> Result<Removal, serde_yaml::Error> {
    let docs = documents(text)?;
    let Some(index) = docs.iter().position(|d| d.key().as_ref() == Some(key)) else {
        return Ok(Removal::NotFound);
    };

    let others = docs
        .iter()
        .enumerate()
        .filter(|(i, d)| *i != index && !d.value.is_null())
        .count();
    if others == 0 {
        return Ok(Removal::Emptied);
    }

    let doc = &docs[index];
    let cut = match docs.get(index + 1) {
        // A leading document takes the following separator with it.
        Some(next) if !doc.has_separator() => doc.span.start..next.body,
        _ => doc.span.clone(),
    };

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..cut.start]);
    out.push_str(&text[cut.end..]);
    Ok(Removal::Removed(out))
}
