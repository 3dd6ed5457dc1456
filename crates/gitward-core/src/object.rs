//! Untyped configuration objects and their identity.
//!
//! Objects are kept as [`serde_yaml::Value`] trees. Identity is
//! `kind + namespace + name`, independent of `apiVersion`.

use std::fmt;

use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// Identity of an object stored in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: String,
    /// Empty for cluster-scoped objects.
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Extract the identity of a document.
    ///
    /// Returns `None` when `kind` or `metadata.name` is missing, which is
    /// the case for kustomizations without metadata, empty documents and
    /// anything that is not a mapping.
    #[must_use]
    pub fn of(doc: &Value) -> Option<Self> {
        let kind = doc.get("kind")?.as_str()?;
        let metadata = doc.get("metadata")?;
        let name = metadata.get("name")?.as_str()?;
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or_default();

        Some(Self::new(kind, namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A parsed object together with its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoObject {
    pub key: ObjectKey,
    pub body: Value,
}

impl RepoObject {
    /// Wrap a document, failing if it has no identity.
    ///
    /// # Errors
    /// Returns `InvalidObject` if `kind` or `metadata.name` is missing.
    pub fn from_value(body: Value) -> Result<Self> {
        let key = ObjectKey::of(&body).ok_or_else(|| {
            Error::InvalidObject("object must have kind and metadata.name".into())
        })?;
        Ok(Self { key, body })
    }
}

/// Format of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Yaml,
}

impl BodyFormat {
    /// Pick the format from a `Content-Type` value: YAML if it mentions
    /// `yaml`, JSON otherwise.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.contains("yaml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Parse one or more objects from a request body.
///
/// Accepts a single object, an array of objects, or (for YAML) a stream of
/// documents, each of which may itself be a list.
///
/// # Errors
/// Returns `InvalidBody` if the body does not parse and `InvalidObject` if an
/// object lacks its identity fields.
pub fn parse_objects(body: &[u8], format: BodyFormat) -> Result<Vec<RepoObject>> {
    let docs: Vec<Value> = match format {
        BodyFormat::Json => {
            let json: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| Error::InvalidBody(e.to_string()))?;
            vec![serde_yaml::to_value(json)?]
        }
        BodyFormat::Yaml => {
            let text = std::str::from_utf8(body).map_err(|e| Error::InvalidBody(e.to_string()))?;
            let mut docs = Vec::new();
            for de in serde_yaml::Deserializer::from_str(text) {
                docs.push(Value::deserialize(de).map_err(|e| Error::InvalidBody(e.to_string()))?);
            }
            docs
        }
    };

    let mut objects = Vec::new();
    for doc in docs {
        match doc {
            Value::Null => {}
            Value::Sequence(items) => {
                for item in items {
                    objects.push(RepoObject::from_value(item)?);
                }
            }
            other => objects.push(RepoObject::from_value(other)?),
        }
    }

    if objects.is_empty() {
        return Err(Error::InvalidBody("no objects in request".into()));
    }
    Ok(objects)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_api_version() {
        let v1: Value = serde_yaml::from_str(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: default\n",
        )
        .unwrap();
        let v2: Value = serde_yaml::from_str(
            "apiVersion: v2\nkind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: default\n",
        )
        .unwrap();

        assert_eq!(ObjectKey::of(&v1), ObjectKey::of(&v2));
        assert_eq!(
            ObjectKey::of(&v1).unwrap().to_string(),
            "ConfigMap/default/cfg"
        );
    }

    #[test]
    fn test_key_requires_kind_and_name() {
        let doc: Value = serde_yaml::from_str("resources:\n- a.yaml\n").unwrap();
        assert!(ObjectKey::of(&doc).is_none());

        let cluster: Value =
            serde_yaml::from_str("kind: Namespace\nmetadata:\n  name: prod\n").unwrap();
        assert_eq!(ObjectKey::of(&cluster).unwrap().namespace, "");
    }

    #[test]
    fn test_parse_json_array() {
        let body = br#"[
            {"kind": "ConfigMap", "metadata": {"name": "a", "namespace": "x"}},
            {"kind": "Secret", "metadata": {"name": "b", "namespace": "x"}}
        ]"#;

        let objects = parse_objects(body, BodyFormat::Json).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].key, ObjectKey::new("Secret", "x", "b"));
    }

    #[test]
    fn test_parse_yaml_stream() {
        let body = b"kind: ConfigMap\nmetadata:\n  name: a\n---\nkind: ConfigMap\nmetadata:\n  name: b\n";

        let objects = parse_objects(body, BodyFormat::Yaml).unwrap();
        let names: Vec<_> = objects.iter().map(|o| o.key.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_parse_rejects_anonymous_object() {
        let result = parse_objects(br#"{"kind": "ConfigMap"}"#, BodyFormat::Json);
        assert!(matches!(result, Err(Error::InvalidObject(_))));

        let result = parse_objects(b"{not json", BodyFormat::Json);
        assert!(matches!(result, Err(Error::InvalidBody(_))));
    }

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(
            BodyFormat::from_content_type(Some("application/x-yaml")),
            BodyFormat::Yaml
        );
        assert_eq!(
            BodyFormat::from_content_type(Some("application/json")),
            BodyFormat::Json
        );
        assert_eq!(BodyFormat::from_content_type(None), BodyFormat::Json);
    }
}
