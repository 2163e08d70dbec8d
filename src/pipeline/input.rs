//! Input parsing and validation, run just before the route handler.
//!
//! # Flow
//! ```text
//! params       -> schema.validate_text(params as object)
//! query        -> schema.validate_text(query as object)
//! json         -> content type check (415) -> parse (400) -> schema.validate
//! url-encoded  -> content type check (415) -> decode pairs -> schema.validate_text
//! form         -> content type check (415) -> multipart parse -> schema.validate_text
//! ```
//!
//! Validated values land in `Context::input`. A route without a schema for
//! some part leaves that part alone.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, Request};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::{ApiError, InputLocation};
use crate::http::request::{pairs_to_object, ApiRequest};
use crate::http::response::Blob;
use crate::pipeline::compose::InputSchemas;
use crate::pipeline::context::{Context, ValidatedInput};
use crate::pipeline::middleware::{Endpoint, PipelineResult};
use crate::schema::{SchemaError, SchemaRef};

const JSON: &str = "application/json";
const URL_ENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Route handler wrapped with its input validation.
pub(crate) struct RouteEndpoint {
    input: InputSchemas,
    handler: Arc<dyn Endpoint>,
}

impl RouteEndpoint {
    pub(crate) fn new(input: InputSchemas, handler: Arc<dyn Endpoint>) -> Self {
        Self { input, handler }
    }
}

impl Endpoint for RouteEndpoint {
    fn call<'a>(&'a self, req: ApiRequest, mut ctx: Context) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            validate_input(&self.input, &req, ctx.input_mut()).await?;
            self.handler.call(req, ctx).await
        })
    }
}

/// Validate every request part that has a schema.
pub async fn validate_input(
    schemas: &InputSchemas,
    req: &ApiRequest,
    out: &mut ValidatedInput,
) -> Result<(), ApiError> {
    if let Some(schema) = &schemas.params {
        let value = schema
            .validate_text(req.params().to_json())
            .map_err(|err| input_error(InputLocation::Params, err))?;
        out.params = Some(value);
    }

    if let Some(schema) = &schemas.query {
        let value = schema
            .validate_text(req.query_json())
            .map_err(|err| input_error(InputLocation::Query, err))?;
        out.query = Some(value);
    }

    if let Some(schema) = &schemas.json {
        out.json = Some(json_body(schema, req)?);
    }

    if let Some(schema) = &schemas.url_encoded {
        require_content_type(req, URL_ENCODED)?;
        let pairs = url::form_urlencoded::parse(req.body()).into_owned();
        let value = schema
            .validate_text(pairs_to_object(pairs))
            .map_err(|err| input_error(InputLocation::UrlEncoded, err))?;
        out.url_encoded = Some(value);
    }

    if let Some(schema) = &schemas.form {
        require_content_type(req, MULTIPART)?;
        let (fields, files) = multipart_body(req).await?;
        let mut view = fields;
        if let Value::Object(map) = &mut view {
            for (name, blob) in &files {
                map.insert(name.clone(), blob.descriptor());
            }
        }
        let value = schema
            .validate_text(view)
            .map_err(|err| input_error(InputLocation::Form, err))?;
        out.form = Some(value);
        out.files = files;
    }

    Ok(())
}

fn json_body(schema: &SchemaRef, req: &ApiRequest) -> Result<Value, ApiError> {
    let content_type = req.content_type();
    let is_json = content_type
        .as_deref()
        .is_some_and(|ct| ct == JSON || ct.ends_with("+json"));
    if !is_json {
        return Err(ApiError::UnsupportedMediaType {
            expected: JSON,
            found: content_type,
        });
    }

    let value: Value = serde_json::from_slice(req.body())
        .map_err(|err| ApiError::input(InputLocation::Json, format!("malformed JSON: {err}")))?;
    schema
        .validate(value)
        .map_err(|err| input_error(InputLocation::Json, err))
}

fn require_content_type(req: &ApiRequest, expected: &'static str) -> Result<(), ApiError> {
    match req.content_type() {
        Some(found) if found == expected => Ok(()),
        found => Err(ApiError::UnsupportedMediaType { expected, found }),
    }
}

/// Split a multipart body into text fields (as an object) and file parts.
async fn multipart_body(req: &ApiRequest) -> Result<(Value, Vec<(String, Blob)>), ApiError> {
    let malformed = |err: &dyn std::fmt::Display| {
        ApiError::input(InputLocation::Form, format!("malformed multipart body: {err}"))
    };

    let mut builder = Request::builder().method(req.method().clone()).uri(req.uri().clone());
    if let Some(content_type) = req.headers().get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, content_type.clone());
    }
    let request = builder
        .body(Body::from(req.body().clone()))
        .map_err(ApiError::internal)?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| malformed(&err))?;

    let mut texts = Vec::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|err| malformed(&err))? {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(|err| malformed(&err))?;

        if filename.is_some() {
            files.push((
                name,
                Blob {
                    filename,
                    content_type,
                    data,
                },
            ));
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|err| malformed(&err))?;
            texts.push((name, text));
        }
    }

    let fields = match pairs_to_object(texts) {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };
    Ok((fields, files))
}

fn input_error(location: InputLocation, err: SchemaError) -> ApiError {
    ApiError::Input {
        location,
        detail: err.to_string(),
        issues: err.issues().to_vec(),
    }
}
