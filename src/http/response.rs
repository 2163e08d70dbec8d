//! Response model.
//!
//! # Responsibilities
//! - Typed reply variants (JSON, multipart form, url-encoded, custom, raw)
//! - Merge rule between accumulated response defaults and a reply
//! - Encode typed payloads into concrete bodies
//! - Convert into an axum response at the host boundary
//!
//! # Merge Rule
//! ```text
//! body    = override.body    if present else base.body
//! status  = override.status  if present else base.status
//! headers = base.headers, then override headers replacing same-name entries
//! ```

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

/// Binary form field, written to multipart bodies untransformed.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Blob {
    /// JSON stand-in used when a form is validated against a schema.
    pub fn descriptor(&self) -> Value {
        serde_json::json!({
            "filename": self.filename,
            "contentType": self.content_type,
            "size": self.data.len(),
        })
    }
}

/// A single multipart form field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Value(Value),
    Blob(Blob),
}

/// Typed payload awaiting validation and serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    FormData(Vec<(String, FormValue)>),
    UrlEncoded(Value),
    Custom { content_type: String, value: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Typed(Payload),
    /// Already concrete; bypasses validation.
    Raw(Bytes),
}

/// Response under construction. Every field is optional so the same type
/// carries partial response defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Option<ReplyBody>,
}

impl Reply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(value: Value) -> Self {
        Self::typed(Payload::Json(value))
    }

    pub fn form(fields: Vec<(String, FormValue)>) -> Self {
        Self::typed(Payload::FormData(fields))
    }

    pub fn url_encoded(value: Value) -> Self {
        Self::typed(Payload::UrlEncoded(value))
    }

    pub fn custom(content_type: impl Into<String>, value: Value) -> Self {
        Self::typed(Payload::Custom {
            content_type: content_type.into(),
            value,
        })
    }

    /// Concrete body, never validated.
    pub fn raw(body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(ReplyBody::Raw(body.into())),
            ..Self::default()
        }
    }

    /// Status-only reply.
    pub fn status(status: StatusCode) -> Self {
        Self::new().with_status(status)
    }

    fn typed(payload: Payload) -> Self {
        Self {
            body: Some(ReplyBody::Typed(payload)),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Apply `over` on top of `base`.
    pub fn merge(base: &Reply, over: Reply) -> Reply {
        let mut headers = base.headers.clone();
        for name in over.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in over.headers.iter() {
            headers.append(name.clone(), value.clone());
        }

        Reply {
            status: over.status.or(base.status),
            headers,
            body: over.body.or_else(|| base.body.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_none()
    }

    /// Convert to a concrete response. Typed payloads left at this point
    /// are encoded without validation. A reply with neither status nor body
    /// becomes `204`; otherwise the status defaults to `200`.
    pub fn into_response(self) -> Response {
        let status = match (self.status, &self.body) {
            (Some(status), _) => status,
            (None, None) => StatusCode::NO_CONTENT,
            (None, Some(_)) => StatusCode::OK,
        };
        let mut headers = self.headers;
        let body = match self.body {
            None => Bytes::new(),
            Some(ReplyBody::Raw(bytes)) => bytes,
            Some(ReplyBody::Typed(payload)) => match payload.encode() {
                Ok((content_type, bytes)) => {
                    headers.insert(header::CONTENT_TYPE, content_type);
                    bytes
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to encode reply payload");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            },
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl Payload {
    /// Encode into `(content type, body)`.
    pub fn encode(&self) -> Result<(HeaderValue, Bytes), ApiError> {
        match self {
            Payload::Json(value) => {
                let bytes = serde_json::to_vec(value).map_err(ApiError::internal)?;
                Ok((HeaderValue::from_static("application/json"), Bytes::from(bytes)))
            }
            Payload::UrlEncoded(value) => {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (key, text) in flatten_pairs(value)? {
                    serializer.append_pair(&key, &text);
                }
                Ok((
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                    Bytes::from(serializer.finish()),
                ))
            }
            Payload::FormData(fields) => encode_multipart(fields),
            Payload::Custom {
                content_type,
                value,
            } => {
                let content_type =
                    HeaderValue::from_str(content_type).map_err(ApiError::internal)?;
                let bytes = match value {
                    Value::String(s) => Bytes::from(s.clone()),
                    other => Bytes::from(serde_json::to_vec(other).map_err(ApiError::internal)?),
                };
                Ok((content_type, bytes))
            }
        }
    }
}

/// Form fields render strings verbatim and everything else as JSON text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Object → ordered key/value pairs; arrays repeat the key.
fn flatten_pairs(value: &Value) -> Result<Vec<(String, String)>, ApiError> {
    let Value::Object(map) = value else {
        return Err(ApiError::internal("url-encoded payload must be an object"));
    };
    let mut pairs = Vec::with_capacity(map.len());
    for (key, v) in map {
        match v {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (key.clone(), stringify(item))));
            }
            Value::Null => {}
            other => pairs.push((key.clone(), stringify(other))),
        }
    }
    Ok(pairs)
}

fn encode_multipart(fields: &[(String, FormValue)]) -> Result<(HeaderValue, Bytes), ApiError> {
    let boundary = format!("routekit-{}", Uuid::new_v4().simple());
    let mut body: Vec<u8> = Vec::new();

    let mut part = |name: &str, filename: Option<&str>, content_type: Option<&str>, data: &[u8]| {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", escape_quotes(name));
        if let Some(filename) = filename {
            disposition.push_str(&format!("; filename=\"{}\"", escape_quotes(filename)));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    };

    for (name, value) in fields {
        match value {
            FormValue::Blob(blob) => part(
                name,
                Some(blob.filename.as_deref().unwrap_or("blob")),
                Some(blob.content_type.as_deref().unwrap_or("application/octet-stream")),
                &blob.data,
            ),
            FormValue::Value(Value::Array(items)) => {
                for item in items {
                    part(name, None, None, stringify(item).as_bytes());
                }
            }
            FormValue::Value(Value::Null) => {}
            FormValue::Value(other) => part(name, None, None, stringify(other).as_bytes()),
        }
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    let content_type = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}"))
        .map_err(ApiError::internal)?;
    Ok((content_type, Bytes::from(body)))
}

fn escape_quotes(raw: &str) -> String {
    raw.replace('"', "%22")
}
