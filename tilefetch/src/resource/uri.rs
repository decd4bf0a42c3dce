//! URL string helpers used by [`Resource`](super::Resource).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::trace;

use super::query::encode_uri_component;
use crate::transport::data_uri;

fn scheme_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap())
}

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(.*?)\}").unwrap())
}

/// Splits `url` into the part before `?` and the query, dropping any fragment.
pub fn split_url(url: &str) -> (&str, Option<&str>) {
    let url = url.split_once('#').map_or(url, |(head, _)| head);
    match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url, None),
    }
}

/// True if `url` starts with a scheme such as `http:` or `data:`.
pub fn has_scheme(url: &str) -> bool {
    scheme_regex().is_match(url)
}

/// Resolves `relative` against `base`. Absolute inputs are returned unchanged.
pub fn resolve_relative(relative: &str, base: &str) -> String {
    if has_scheme(relative) {
        return relative.to_string();
    }
    if let Ok(base_url) = url::Url::parse(base) {
        if let Ok(joined) = base_url.join(relative) {
            trace!(base = base, relative = relative, resolved = %joined, "resolved relative url");
            return joined.to_string();
        }
    }
    // Base is itself relative: join on its directory.
    let (base, _) = split_url(base);
    match base.rfind('/') {
        Some(index) => format!("{}{}", &base[..=index], relative),
        None => relative.to_string(),
    }
}

/// Replaces `{key}` tokens with encoded template values. Unknown tokens stay
/// verbatim.
pub fn substitute_template(url: &str, values: &BTreeMap<String, String>) -> String {
    template_regex()
        .replace_all(url, |captures: &Captures| match values.get(&captures[1]) {
            Some(value) => encode_uri_component(value),
            None => captures[0].to_string(),
        })
        .into_owned()
}

/// Lower-cased extension of the path, or the MIME subtype of a data URI.
pub fn extension(url: &str) -> String {
    if data_uri::is_data_uri(url) {
        return data_uri::mime_type(url)
            .and_then(|mime| {
                let subtype = mime.split(';').next()?.split('/').nth(1)?;
                Some(subtype.split('+').next().unwrap_or(subtype).to_ascii_lowercase())
            })
            .unwrap_or_default();
    }

    let (path, _) = split_url(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rfind('.') {
        Some(index) => file[index + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Everything up to and including the last `/` of the path.
pub fn base_uri(url: &str) -> &str {
    let (path, _) = split_url(url);
    let authority_end = path.find("://").map_or(0, |index| index + 3);
    match path[authority_end..].rfind('/') {
        Some(index) => &path[..authority_end + index + 1],
        None => path,
    }
}
