//! Local decoding of `data:<mime>[;base64],<payload>` URIs.

use std::sync::OnceLock;

use base64::Engine;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use regex::Regex;

use super::{Blob, Headers, Response};
use crate::error::{FetchError, FetchResult};

const DEFAULT_MIME_TYPE: &str = "text/plain";

fn data_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^data:([^,]*?)(;base64)?,(.*)$").expect("valid data uri regex")
    })
}

/// True if `url` uses the `data:` scheme.
pub fn is_data_uri(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// True if `url` uses the `blob:` scheme.
pub fn is_blob_uri(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("blob:"))
}

/// MIME type declared by a data URI, without decoding the payload.
pub fn mime_type(url: &str) -> Option<String> {
    data_uri_regex().captures(url).map(|captures| {
        let mime = &captures[1];
        if mime.is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            mime.to_string()
        }
    })
}

/// Decodes a data URI into its bytes and MIME type.
pub fn decode(url: &str) -> FetchResult<Blob> {
    let captures = data_uri_regex()
        .captures(url)
        .ok_or_else(|| FetchError::InvalidDataUri(truncate(url)))?;

    let mime = match &captures[1] {
        "" => DEFAULT_MIME_TYPE.to_string(),
        mime => mime.to_string(),
    };
    let payload = &captures[3];

    let bytes = if captures.get(2).is_some() {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| FetchError::InvalidDataUri(format!("bad base64 payload: {}", e)))?
    } else {
        percent_decode_str(payload).collect::<Vec<u8>>()
    };

    Ok(Blob {
        bytes: Bytes::from(bytes),
        mime_type: Some(mime),
    })
}

/// Decodes a data URI into a synthetic 200 response.
pub fn decode_response(url: &str) -> FetchResult<Response> {
    let blob = decode(url)?;
    let mut headers = Headers::new();
    if let Some(mime) = blob.mime_type {
        headers.insert("content-type".to_string(), mime);
    }
    Ok(Response {
        url: url.to_string(),
        status: 200,
        headers,
        body: blob.bytes,
    })
}

fn truncate(url: &str) -> String {
    url.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_payload() {
        let blob = decode("data:application/json,{\"a\":1}").unwrap();
        assert_eq!(blob.mime_type.as_deref(), Some("application/json"));
        assert_eq!(&blob.bytes[..], br#"{"a":1}"#);
    }

    #[test]
    fn test_percent_encoded_payload() {
        let blob = decode("data:text/plain,hello%20world").unwrap();
        assert_eq!(&blob.bytes[..], b"hello world");
    }

    #[test]
    fn test_base64_payload() {
        let blob = decode("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(&blob.bytes[..], b"hello");
    }

    #[test]
    fn test_missing_mime_defaults_to_text() {
        let blob = decode("data:,abc").unwrap();
        assert_eq!(blob.mime_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_malformed_uri_is_decode_class() {
        let err = decode("data:no-comma").unwrap_err();
        assert!(err.is_decode());

        let err = decode("data:text/plain;base64,***").unwrap_err();
        assert!(matches!(err, FetchError::InvalidDataUri(_)));
    }

    #[test]
    fn test_response_carries_content_type() {
        let response = decode_response("data:image/png;base64,AAAA").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.mime_type(), Some("image/png"));
        assert_eq!(response.body.len(), 3);
    }

    #[test]
    fn test_scheme_detection() {
        assert!(is_data_uri("DATA:text/plain,x"));
        assert!(is_blob_uri("blob:tilefetch/1"));
        assert!(!is_data_uri("http://x"));
        assert!(!is_blob_uri("blo"));
    }
}
