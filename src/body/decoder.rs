//! Content-type specific request body decoding.
//!
//! Pure: takes the raw bytes produced by [`BodyReader`](super::BodyReader)
//! and the request's content type, returns a structured body plus any
//! uploaded files.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::multipart::{parse_boundary, parse_multipart, UploadedFile};
use crate::error::GatewayError;

/// Structured view of a request body.
#[derive(Debug, Default)]
pub struct DecodedBody {
    pub body: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

/// Decode `raw` according to `content_type`.
///
/// Unknown content types, a missing content type and an empty body all
/// yield an empty result.
pub fn decode(raw: &Bytes, content_type: Option<&str>) -> Result<DecodedBody, GatewayError> {
    if raw.is_empty() {
        return Ok(DecodedBody::default());
    }
    let Some(content_type) = content_type else {
        return Ok(DecodedBody::default());
    };

    let lowered = content_type.to_ascii_lowercase();
    if lowered.contains("application/json") {
        decode_json(raw)
    } else if lowered.contains("application/x-www-form-urlencoded") {
        decode_form(raw)
    } else if lowered.contains("multipart/form-data") {
        let boundary = parse_boundary(content_type)?;
        let form = parse_multipart(raw, &boundary)?;
        Ok(DecodedBody {
            body: form.fields,
            files: form.files,
        })
    } else {
        Ok(DecodedBody::default())
    }
}

fn decode_json(raw: &Bytes) -> Result<DecodedBody, GatewayError> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(body)) => Ok(DecodedBody {
            body,
            files: Vec::new(),
        }),
        Ok(_) => Err(GatewayError::BodyDataParseError(
            "JSON body must be an object".into(),
        )),
        Err(e) => Err(GatewayError::BodyDataParseError(format!("invalid JSON: {e}"))),
    }
}

/// Repeated keys collect into an array, in arrival order.
fn decode_form(raw: &Bytes) -> Result<DecodedBody, GatewayError> {
    if std::str::from_utf8(raw).is_err() {
        return Err(GatewayError::BodyDataParseError(
            "form body is not valid UTF-8".into(),
        ));
    }

    let mut body = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        let value = Value::String(value.into_owned());
        match body.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                body.insert(key.into_owned(), value);
            }
        }
    }
    Ok(DecodedBody {
        body,
        files: Vec::new(),
    })
}
