//! Attribution attached to a resource.

use std::fmt;

/// Attribution text a provider must display for its data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Credit {
    pub html: String,
    /// Show on screen rather than only in the attribution list.
    pub show_on_screen: bool,
}

impl Credit {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            show_on_screen: false,
        }
    }

    pub fn on_screen(mut self) -> Self {
        self.show_on_screen = true;
        self
    }
}

impl fmt::Display for Credit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}
