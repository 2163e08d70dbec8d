//! Response validation and serialization.
//!
//! Composed twice per route: the outer copy encodes whatever a short-circuit
//! produced (defaults included) without validating; the inner copy checks
//! the handler's typed reply against the route's output schemas.

use axum::http::header;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::http::request::ApiRequest;
use crate::http::response::{FormValue, Payload, Reply, ReplyBody};
use crate::pipeline::compose::OutputSchemas;
use crate::pipeline::context::Context;
use crate::pipeline::middleware::{Middleware, Next, PipelineResult};
use crate::schema::{SchemaError, SchemaRef};

pub(crate) struct SerializeLayer {
    schemas: Option<OutputSchemas>,
    validate: bool,
}

impl SerializeLayer {
    pub(crate) fn outer() -> Self {
        Self {
            schemas: None,
            validate: false,
        }
    }

    pub(crate) fn inner(schemas: OutputSchemas, validate: bool) -> Self {
        Self {
            schemas: Some(schemas),
            validate,
        }
    }
}

impl Middleware for SerializeLayer {
    fn handle<'a>(
        &'a self,
        req: ApiRequest,
        ctx: Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let reply = next.run(req, ctx).await?;
            serialize(reply, self.schemas.as_ref(), self.validate)
        })
    }
}

/// Turn a typed reply into a concrete one.
///
/// Raw and body-less replies pass through untouched. With `validate` set,
/// the payload is checked against the schema for its variant first; a
/// variant without a schema is encoded as is.
pub fn serialize(
    reply: Reply,
    schemas: Option<&OutputSchemas>,
    validate: bool,
) -> Result<Reply, ApiError> {
    let Reply {
        status,
        mut headers,
        body,
    } = reply;

    let payload = match body {
        Some(ReplyBody::Typed(payload)) => payload,
        body => return Ok(Reply { status, headers, body }),
    };

    let payload = match schemas {
        Some(schemas) if validate => check(payload, schemas)?,
        _ => payload,
    };

    let (content_type, bytes) = payload.encode()?;
    headers.insert(header::CONTENT_TYPE, content_type);
    Ok(Reply {
        status,
        headers,
        body: Some(ReplyBody::Raw(bytes)),
    })
}

fn check(payload: Payload, schemas: &OutputSchemas) -> Result<Payload, ApiError> {
    match payload {
        Payload::Json(value) => Ok(Payload::Json(apply(schemas.json.as_ref(), value)?)),
        Payload::UrlEncoded(value) => Ok(Payload::UrlEncoded(apply(
            schemas.url_encoded.as_ref(),
            value,
        )?)),
        Payload::Custom {
            content_type,
            value,
        } => Ok(Payload::Custom {
            content_type,
            value: apply(schemas.custom.as_ref(), value)?,
        }),
        Payload::FormData(fields) => {
            let Some(schema) = &schemas.form else {
                return Ok(Payload::FormData(fields));
            };
            // Blobs are validated through their descriptor and written back
            // untouched; plain values take whatever the schema returned.
            let mut validated = match schema.validate(form_view(&fields)) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(err) => return Err(output_error(err)),
            };
            let fields = fields
                .into_iter()
                .map(|(name, value)| match value {
                    FormValue::Value(original) => {
                        let value = validated.remove(&name).unwrap_or(original);
                        (name, FormValue::Value(value))
                    }
                    blob => (name, blob),
                })
                .collect();
            Ok(Payload::FormData(fields))
        }
    }
}

fn apply(schema: Option<&SchemaRef>, value: Value) -> Result<Value, ApiError> {
    match schema {
        Some(schema) => schema.validate(value).map_err(output_error),
        None => Ok(value),
    }
}

/// Form fields as one object; blobs appear as descriptors.
fn form_view(fields: &[(String, FormValue)]) -> Value {
    let map = fields
        .iter()
        .map(|(name, value)| {
            let value = match value {
                FormValue::Value(value) => value.clone(),
                FormValue::Blob(blob) => blob.descriptor(),
            };
            (name.clone(), value)
        })
        .collect::<Map<_, _>>();
    Value::Object(map)
}

fn output_error(err: SchemaError) -> ApiError {
    ApiError::OutputValidation {
        detail: err.to_string(),
        issues: err.issues().to_vec(),
    }
}
