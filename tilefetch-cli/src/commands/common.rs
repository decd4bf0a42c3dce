//! Argument parsing and output helpers shared across commands.

use std::path::Path;
use std::time::Duration;

use tilefetch::resource::{QueryParameters, QueryValue, TemplateValues};
use tilefetch::transport::Headers;

use crate::error::CliError;

/// Pause between submissions the scheduler declined.
pub const THROTTLE_PAUSE: Duration = Duration::from_millis(50);

/// Declined submissions tolerated before giving up.
pub const MAX_THROTTLE_WAITS: u32 = 100;

/// Awaits a verb, resubmitting while the scheduler declines it.
///
/// Expands to the verb's value; returns early from the enclosing function on
/// error or when the scheduler never accepts the request.
macro_rules! scheduled {
    ($resource:ident . $verb:ident ( $($arg:expr),* )) => {{
        let mut waits = 0u32;
        loop {
            match $resource.$verb($($arg),*).await? {
                Some(value) => break value,
                None => {
                    waits += 1;
                    if waits > $crate::commands::common::MAX_THROTTLE_WAITS {
                        return Err($crate::error::CliError::Throttled($resource.url()));
                    }
                    tokio::time::sleep($crate::commands::common::THROTTLE_PAUSE).await;
                }
            }
        }
    }};
}
pub(crate) use scheduled;

/// Splits `key=value`. A bare `key` becomes a flag.
pub fn parse_pair(raw: &str) -> (String, Option<String>) {
    match raw.split_once('=') {
        Some((key, value)) => (key.trim().to_string(), Some(value.to_string())),
        None => (raw.trim().to_string(), None),
    }
}

/// Builds query parameters from repeated `-q key=value` arguments.
///
/// Repeating a key collects its values in order.
pub fn query_from_args(args: &[String]) -> QueryParameters {
    let mut parameters = QueryParameters::new();
    for raw in args {
        let (key, value) = parse_pair(raw);
        let value = match value {
            Some(value) => QueryValue::from(value),
            None => QueryValue::Flag,
        };
        let merged = match parameters.remove(&key) {
            None => value,
            Some(existing) => {
                let mut values = existing.values();
                values.extend(value.values());
                QueryValue::from(values)
            }
        };
        parameters.insert(key, merged);
    }
    parameters
}

/// Builds template values from repeated `-t key=value` arguments.
pub fn templates_from_args(args: &[String]) -> Result<TemplateValues, CliError> {
    args.iter()
        .map(|raw| match parse_pair(raw) {
            (key, Some(value)) if !key.is_empty() => Ok((key, value)),
            _ => Err(CliError::Argument(format!(
                "template value '{}' must look like key=value",
                raw
            ))),
        })
        .collect()
}

/// Builds headers from repeated `-H 'Name: value'` arguments.
pub fn headers_from_args(args: &[String]) -> Result<Headers, CliError> {
    args.iter()
        .map(|raw| match raw.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(CliError::Argument(format!(
                "header '{}' must look like 'Name: value'",
                raw
            ))),
        })
        .collect()
}

/// Writes `bytes` to `path`.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|error| CliError::FileWrite {
        path: path.display().to_string(),
        error,
    })
}
