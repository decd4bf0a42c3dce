//! URL rewriting through a forwarding proxy.

use std::fmt;

use crate::resource::encode_uri_component;

/// Rewrites a resource URL before it is requested.
pub trait Proxy: fmt::Debug + Send + Sync {
    fn get_url(&self, url: &str) -> String;
}

/// Proxy that appends the encoded target URL to a fixed prefix:
/// `<proxy>?<encoded url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultProxy {
    proxy: String,
}

impl DefaultProxy {
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
        }
    }
}

impl Proxy for DefaultProxy {
    fn get_url(&self, url: &str) -> String {
        let separator = if self.proxy.contains('?') { "" } else { "?" };
        format!("{}{}{}", self.proxy, separator, encode_uri_component(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_encoded_url() {
        let proxy = DefaultProxy::new("/proxy/");
        assert_eq!(
            proxy.get_url("http://x/y?a=1"),
            "/proxy/?http%3A%2F%2Fx%2Fy%3Fa%3D1"
        );
    }

    #[test]
    fn test_keeps_existing_query_separator() {
        let proxy = DefaultProxy::new("/proxy?url=");
        assert_eq!(proxy.get_url("http://x"), "/proxy?url=http%3A%2F%2Fx");
    }
}
