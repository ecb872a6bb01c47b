//! Wire types for the language server protocol subset we speak.
//!
//! Positions here are 0-based, as on the wire. User-facing 1-based
//! locations live in `crate::models`.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

pub const JSONRPC_VERSION: &str = "2.0";

/// Any JSON-RPC message: request, response or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Message {
    pub fn request(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.to_string()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    /// Build a response; used by tests that play the server side.
    #[cfg(test)]
    pub fn response(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::from(id)),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Messages carrying a method are notifications or server-to-client requests.
    pub fn is_incoming_call(&self) -> bool {
        self.method.is_some()
    }

    pub fn id_as_u64(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub process_id: u32,
    pub root_uri: String,
    pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceParams {
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
    pub context: ReferenceContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceContext {
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

/// 0-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

/// A reference site with the URI already turned into a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub path: PathBuf,
    pub start: Position,
}

impl From<Location> for FileLocation {
    fn from(location: Location) -> Self {
        Self {
            path: uri_to_path(&location.uri),
            start: location.range.start,
        }
    }
}

/// Percent-encoded `file://` URI for an absolute path.
pub fn path_to_uri(path: &Path) -> Result<String, RpcError> {
    Url::from_file_path(path)
        .map(String::from)
        .map_err(|_| RpcError::InvalidPath(path.to_path_buf()))
}

/// Decode a `file://` URI. Anything else is kept verbatim as a path.
pub fn uri_to_path(uri: &str) -> PathBuf {
    Url::parse(uri)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(uri))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_has_no_id() {
        let msg = Message::notification("initialized", json!({}));
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "initialized");
    }

    #[test]
    fn test_null_result_deserializes_as_absent() {
        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert_eq!(msg.id_as_u64(), Some(3));
        assert!(msg.result.is_none());
        assert!(!msg.is_incoming_call());
    }

    #[test]
    fn test_initialize_params_are_camel_case() {
        let params = InitializeParams {
            process_id: 7,
            root_uri: "file:///work".into(),
            capabilities: json!({}),
        };
        let value = serde_json::to_value(params).unwrap();
        assert_eq!(value["processId"], 7);
        assert_eq!(value["rootUri"], "file:///work");
    }

    #[test]
    fn test_uri_round_trip() {
        let path = Path::new("/work/project/main.go");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri, "file:///work/project/main.go");
        assert_eq!(uri_to_path(&uri), path);
    }

    #[test]
    fn test_uri_percent_encoding() {
        let path = Path::new("/work/my app/pkg/a.go");
        let uri = path_to_uri(path).unwrap();
        assert_eq!(uri, "file:///work/my%20app/pkg/a.go");
        assert_eq!(uri_to_path("file:///work/my%20app/pkg/a.go"), path);
    }

    #[test]
    fn test_relative_path_has_no_uri() {
        assert!(matches!(
            path_to_uri(Path::new("pkg/a.go")),
            Err(RpcError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_non_file_uri_kept_verbatim() {
        assert_eq!(
            uri_to_path("jdt://contents/x.class"),
            PathBuf::from("jdt://contents/x.class")
        );
    }

    #[test]
    fn test_location_to_file_location() {
        let location: Location = serde_json::from_value(json!({
            "uri": "file:///work/a.go",
            "range": {
                "start": {"line": 10, "character": 4},
                "end": {"line": 10, "character": 9}
            }
        }))
        .unwrap();
        let file_location = FileLocation::from(location);
        assert_eq!(file_location.path, PathBuf::from("/work/a.go"));
        assert_eq!(file_location.start, Position { line: 10, character: 4 });
    }
}
