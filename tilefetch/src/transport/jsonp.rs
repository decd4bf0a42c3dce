//! JSONP loading.
//!
//! There is no script engine here: the loader fetches the script text and
//! extracts the single argument of the expected callback invocation.

use tracing::{trace, warn};

use super::{BoxFuture, JsonpLoader};
use crate::error::{FetchError, FetchResult};

/// Extracts the JSON argument from `function_name(<json>)` with an optional `;`.
pub fn unwrap_jsonp(url: &str, script: &str, function_name: &str) -> FetchResult<serde_json::Value> {
    let body = script.trim();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();

    let argument = body
        .strip_prefix(function_name)
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            FetchError::decode(
                url,
                "jsonp",
                format!("response is not a call to {}", function_name),
            )
        })?;

    serde_json::from_str(argument).map_err(|e| FetchError::decode(url, "jsonp", e))
}

/// Default [`JsonpLoader`] over a reqwest client.
#[derive(Clone)]
pub struct HttpJsonpLoader {
    client: reqwest::Client,
}

impl HttpJsonpLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn load(&self, url: String, function_name: String) -> FetchResult<serde_json::Value> {
        trace!(url = %url, callback = %function_name, "JSONP request starting");
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "JSONP request failed");
            FetchError::network(url.as_str(), e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let script = response
            .text()
            .await
            .map_err(|e| FetchError::network(url.as_str(), e))?;
        unwrap_jsonp(&url, &script, &function_name)
    }
}

impl JsonpLoader for HttpJsonpLoader {
    fn load_and_execute_script(
        &self,
        url: String,
        function_name: String,
    ) -> BoxFuture<'_, FetchResult<serde_json::Value>> {
        Box::pin(self.load(url, function_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwraps_callback_argument() {
        let value = unwrap_jsonp("http://x", "loadJsonp000001({\"a\": [1, 2]});", "loadJsonp000001")
            .unwrap();
        assert_eq!(value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_tolerates_whitespace() {
        let value = unwrap_jsonp("http://x", "  cb ( 42 )\n", "cb").unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_wrong_callback_is_decode_error() {
        let err = unwrap_jsonp("http://x", "other({})", "cb").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_malformed_argument_is_decode_error() {
        let err = unwrap_jsonp("http://x", "cb({nope)", "cb").unwrap_err();
        assert!(matches!(err, FetchError::Decode { format: "jsonp", .. }));
    }
}
