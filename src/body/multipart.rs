//! Byte-oriented `multipart/form-data` scanner.
//!
//! Works on the already collected body bytes and never decodes the payload
//! as text, so binary file content survives untouched. File data is returned
//! as zero-copy slices of the request body.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// One uploaded file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

/// Fields and files extracted from a multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    /// Plain fields. A repeated name keeps the last value.
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

/// Extract the `boundary` parameter from a multipart content type.
pub fn parse_boundary(content_type: &str) -> Result<String, GatewayError> {
    for param in split_params(content_type).into_iter().skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value.trim());
            if boundary.is_empty() {
                break;
            }
            return Ok(boundary);
        }
    }
    Err(GatewayError::BodyDataParseError(
        "multipart boundary is missing".into(),
    ))
}

/// Split `body` into parts on `--boundary` delimiter lines.
///
/// A delimiter only counts at the very start of the body or right after a
/// line feed. The closing `--boundary--` ends the scan; anything after it
/// is ignored. Parts without a name or without a header/body separator are
/// skipped.
pub fn parse_multipart(body: &Bytes, boundary: &str) -> Result<MultipartForm, GatewayError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut form = MultipartForm::default();

    let Some(mut cursor) = find_delimiter(body, delimiter, 0) else {
        return Ok(form);
    };

    loop {
        let after = cursor + delimiter.len();
        if body[after..].starts_with(b"--") {
            break;
        }
        // Rest of the delimiter line (transport padding) is ignored.
        let Some(content_start) = next_line(body, after) else {
            break;
        };

        let next = find_delimiter(body, delimiter, content_start);
        let content_end = match next {
            Some(pos) => strip_line_break_before(body, content_start, pos),
            None => strip_line_break_before(body, content_start, body.len()),
        };

        read_part(body, content_start, content_end, &mut form)?;

        match next {
            Some(pos) => cursor = pos,
            None => break,
        }
    }

    Ok(form)
}

fn read_part(
    body: &Bytes,
    start: usize,
    end: usize,
    form: &mut MultipartForm,
) -> Result<(), GatewayError> {
    let part = &body[start..end];
    let Some((header_len, separator_len)) = find_header_end(part) else {
        return Ok(());
    };

    let headers = String::from_utf8_lossy(&part[..header_len]);
    let mut disposition = None;
    let mut mime_type = None;
    for line in headers.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(parse_content_disposition(value));
        } else if name.eq_ignore_ascii_case("content-type") {
            let value = value.trim();
            if !value.is_empty() {
                mime_type = Some(value.to_string());
            }
        }
    }

    let Some(ContentDisposition {
        name: Some(field_name),
        filename,
    }) = disposition
    else {
        return Ok(());
    };

    let data_start = start + header_len + separator_len;
    match filename {
        Some(filename) => form.files.push(UploadedFile {
            field_name,
            filename,
            mime_type,
            data: body.slice(data_start..end),
        }),
        None => {
            let value = std::str::from_utf8(&body[data_start..end]).map_err(|_| {
                GatewayError::BodyDataParseError(format!(
                    "multipart field `{field_name}` is not valid UTF-8"
                ))
            })?;
            form.fields.insert(field_name, Value::String(value.to_string()));
        }
    }
    Ok(())
}

struct ContentDisposition {
    name: Option<String>,
    filename: Option<String>,
}

/// Parse the value of a Content-Disposition header:
/// `form-data; name="field"; filename="a;b.txt"`.
fn parse_content_disposition(value: &str) -> ContentDisposition {
    let mut name = None;
    let mut filename = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let parsed = unquote(raw.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => {
                let trimmed = parsed.trim();
                if !trimmed.is_empty() {
                    name = Some(trimmed.to_string());
                }
            }
            "filename" => filename = Some(parsed),
            _ => {}
        }
    }

    ContentDisposition { name, filename }
}

/// Split on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Position of the next delimiter at or after `from` that starts a line.
fn find_delimiter(haystack: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    let mut offset = from;
    while offset <= haystack.len() {
        let pos = offset + find_bytes(&haystack[offset..], delimiter)?;
        if pos == 0 || haystack[pos - 1] == b'\n' {
            return Some(pos);
        }
        offset = pos + 1;
    }
    None
}

/// Index just past the next `\n` at or after `from`.
fn next_line(haystack: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| from + i + 1)
}

/// Drop the line break that belongs to the following delimiter.
fn strip_line_break_before(haystack: &[u8], start: usize, end: usize) -> usize {
    if end >= start + 2 && &haystack[end - 2..end] == b"\r\n" {
        end - 2
    } else if end > start && haystack[end - 1] == b'\n' {
        end - 1
    } else {
        end
    }
}

/// Length of the header block and of the blank-line separator after it.
fn find_header_end(part: &[u8]) -> Option<(usize, usize)> {
    let crlf = find_bytes(part, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find_bytes(part, b"\n\n").map(|pos| (pos, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
