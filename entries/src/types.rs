use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of items returned in a single response.
pub const MAX_ITEMS: usize = 100;

/// Value of `contentType` that selects lookups by author id.
pub const AUTHOR_CONTENT_TYPE: &str = "author";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Entry,
    Asset,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Entry => "Entry",
            ResourceKind::Asset => "Asset",
        }
    }

    /// Segment used in replica keys, e.g. `<prefix>:entry:<id>`.
    pub fn key_segment(&self) -> &'static str {
        match self {
            ResourceKind::Entry => "entry",
            ResourceKind::Asset => "asset",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "Entry" => Some(ResourceKind::Entry),
            "Asset" => Some(ResourceKind::Asset),
            _ => None,
        }
    }
}

/// How the resolver treats a CMS value, read from its `sys` block.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Array,
    /// An entry or asset carrying its own `fields`.
    Resource,
    /// A reference to an entry or asset by id.
    Link {
        kind: ResourceKind,
        id: Option<String>,
    },
    Scalar,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        let sys = match value {
            Value::Array(_) => return Shape::Array,
            Value::Object(object) => match object.get("sys") {
                Some(Value::Object(sys)) => sys,
                _ => return Shape::Scalar,
            },
            _ => return Shape::Scalar,
        };

        match sys.get("type").and_then(Value::as_str) {
            Some("Entry") | Some("Asset") => Shape::Resource,
            Some("Link") => match sys
                .get("linkType")
                .and_then(Value::as_str)
                .and_then(ResourceKind::parse)
            {
                Some(kind) => Shape::Link {
                    kind,
                    id: sys.get("id").and_then(Value::as_str).map(String::from),
                },
                None => Shape::Scalar,
            },
            _ => Shape::Scalar,
        }
    }
}

/// Which tier produced a response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Replica,
    Cache,
    // CMS replies carry no source tag of their own.
    #[default]
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArraySys {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for ArraySys {
    fn default() -> Self {
        ArraySys {
            kind: "Array".into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Includes {
    #[serde(rename = "Entry", default)]
    pub entries: Vec<Value>,
    #[serde(rename = "Asset", default)]
    pub assets: Vec<Value>,
}

/// The envelope returned to clients, shaped like a CMS collection response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(rename = "_source", default)]
    pub source: Source,
    #[serde(default)]
    pub sys: ArraySys,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub includes: Includes,
    /// Top-level fields of CMS replies that have no dedicated slot above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_limit() -> u64 {
    MAX_ITEMS as u64
}

impl ResponsePayload {
    pub fn empty(source: Source) -> Self {
        ResponsePayload {
            source,
            sys: ArraySys::default(),
            total: 0,
            skip: 0,
            limit: default_limit(),
            items: Vec::new(),
            includes: Includes::default(),
            extra: Map::new(),
        }
    }
}

/// Error body in the CMS's own collection format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub sys: ArraySys,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub errors: Vec<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorEnvelope {
            sys: ArraySys::default(),
            total: 1,
            skip: 0,
            limit: default_limit(),
            errors: vec![message.into()],
        }
    }
}

/// A content request as issued by the web front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentQuery {
    ById {
        content_id: String,
        content_type: String,
    },
    ByAuthor {
        author_id: String,
        content_type: String,
    },
    ByContentType {
        content_type: String,
    },
}

impl ContentQuery {
    /// Picks the lookup shape from the raw request parameters.
    pub fn from_params(content_id: &str, content_type: &str) -> Self {
        match (content_id, content_type) {
            ("", _) => ContentQuery::ByContentType {
                content_type: content_type.into(),
            },
            (_, AUTHOR_CONTENT_TYPE) => ContentQuery::ByAuthor {
                author_id: content_id.into(),
                content_type: content_type.into(),
            },
            _ => ContentQuery::ById {
                content_id: content_id.into(),
                content_type: content_type.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shape() {
        assert_eq!(Shape::of(&json!([1, 2])), Shape::Array);
        assert_eq!(
            Shape::of(&json!({"sys": {"type": "Entry", "id": "a"}, "fields": {}})),
            Shape::Resource
        );
        assert_eq!(
            Shape::of(&json!({"sys": {"type": "Asset", "id": "a"}})),
            Shape::Resource
        );
        assert_eq!(
            Shape::of(&json!({"sys": {"type": "Link", "linkType": "Asset", "id": "img"}})),
            Shape::Link {
                kind: ResourceKind::Asset,
                id: Some("img".into())
            }
        );
        assert_eq!(
            Shape::of(&json!({"sys": {"type": "Link", "linkType": "Entry"}})),
            Shape::Link {
                kind: ResourceKind::Entry,
                id: None
            }
        );
        // Links to anything other than entries and assets are left alone
        assert_eq!(
            Shape::of(&json!({"sys": {"type": "Link", "linkType": "Space", "id": "s"}})),
            Shape::Scalar
        );
        assert_eq!(Shape::of(&json!({"sys": "Entry"})), Shape::Scalar);
        assert_eq!(Shape::of(&json!("text")), Shape::Scalar);
        assert_eq!(Shape::of(&Value::Null), Shape::Scalar);
    }

    #[test]
    fn test_payload_wire_format() {
        let payload = ResponsePayload::empty(Source::Replica);
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            concat!(
                r#"{"_source":"replica","sys":{"type":"Array"},"total":0,"skip":0,"limit":100,"#,
                r#""items":[],"includes":{"Entry":[],"Asset":[]}}"#
            )
        );
    }

    #[test]
    fn test_payload_from_cms_reply() {
        let reply = json!({
            "sys": {"type": "Array"},
            "total": 1,
            "skip": 0,
            "limit": 100,
            "items": [{"sys": {"type": "Entry", "id": "a"}, "fields": {}}],
            "includes": {"Asset": [{"sys": {"type": "Asset", "id": "img"}}]},
            "errors": [{"sys": {"id": "notResolvable"}}]
        });
        let payload: ResponsePayload = serde_json::from_value(reply).unwrap();
        assert_eq!(payload.source, Source::Fallback);
        assert_eq!(payload.total, 1);
        assert!(payload.includes.entries.is_empty());
        assert_eq!(payload.includes.assets.len(), 1);
        assert!(payload.extra.contains_key("errors"));
    }

    #[test]
    fn test_error_envelope() {
        let envelope = ErrorEnvelope::new("boom");
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "sys": {"type": "Array"},
                "total": 1,
                "skip": 0,
                "limit": 100,
                "errors": ["boom"]
            })
        );
    }

    #[test]
    fn test_query_from_params() {
        assert_eq!(
            ContentQuery::from_params("abc", "article"),
            ContentQuery::ById {
                content_id: "abc".into(),
                content_type: "article".into()
            }
        );
        assert_eq!(
            ContentQuery::from_params("author42", "author"),
            ContentQuery::ByAuthor {
                author_id: "author42".into(),
                content_type: "author".into()
            }
        );
        assert_eq!(
            ContentQuery::from_params("", "author"),
            ContentQuery::ByContentType {
                content_type: "author".into()
            }
        );
        assert_eq!(
            ContentQuery::from_params("", ""),
            ContentQuery::ByContentType {
                content_type: "".into()
            }
        );
    }
}
