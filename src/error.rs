//! Error type for the bootstrap sequence and the HTML panel shown on fatal failure.
//!
//! ERROR HANDLING
//! ==============
//! Only application construction is fatal. Its failures are classified into
//! three kinds, each rendered as a distinct user-facing message. Everything
//! else propagates as a `BootError` to the caller, and config load failures are
//! logged and skipped by the sequencer.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use thiserror::Error;

/// Engine error name raised when the browser has no usable WebGL support.
pub const UNSUPPORTED_BROWSER_ERROR: &str = "UnsupportedBrowserError";

/// Engine error name raised when a graphics context could not be created.
pub const CONTEXT_CREATION_ERROR: &str = "ContextCreationError";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootError {
    #[error("browser does not support WebGL")]
    UnsupportedBrowser,
    #[error("graphics context creation failed")]
    ContextCreation,
    #[error("application initialization failed: {0}")]
    Initialization(String),
    #[error("DOM operation failed: {0}")]
    Dom(String),
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error("config load failed: {0}")]
    ConfigLoad(String),
    #[error("application has not been initialized")]
    NotInitialized,
}

impl BootError {
    /// Classify an error thrown by the engine's application constructor.
    ///
    /// `name` is the JS error's `name` property; `detail` is its string form.
    #[must_use]
    pub fn from_construction_failure(name: &str, detail: &str) -> Self {
        match name {
            UNSUPPORTED_BROWSER_ERROR => Self::UnsupportedBrowser,
            CONTEXT_CREATION_ERROR => Self::ContextCreation,
            _ => Self::Initialization(detail.to_owned()),
        }
    }

    /// Whether this failure replaces the page with the error panel.
    #[must_use]
    pub fn shows_panel(&self) -> bool {
        matches!(self, Self::UnsupportedBrowser | Self::ContextCreation | Self::Initialization(_))
    }

    /// Kind-specific HTML message for the error panel.
    #[must_use]
    pub fn panel_message(&self) -> String {
        match self {
            Self::UnsupportedBrowser => "This page requires a browser that supports WebGL.<br/>\
                 <a href=\"http://get.webgl.org\">Click here to find out more.</a>"
                .to_owned(),
            Self::ContextCreation => "It doesn't appear your computer can support WebGL.<br/>\
                 <a href=\"http://get.webgl.org/troubleshooting/\">Click here for more information.</a>"
                .to_owned(),
            Self::Initialization(detail) => {
                format!("Could not initialize application. Error: {}", escape_html(detail))
            }
            other => format!("Could not initialize application. Error: {}", escape_html(&other.to_string())),
        }
    }
}

/// Wrap a message in the centered full-page panel that replaces the body content.
#[must_use]
pub fn error_panel_html(message_html: &str) -> String {
    [
        "<div>",
        "<table style=\"background-color: #8CE; width: 100%; height: 100%;\">",
        "  <tr>",
        "      <td align=\"center\">",
        "          <div style=\"display: table-cell; vertical-align: middle;\">",
        &format!("              <div style=\"\">{message_html}</div>"),
        "          </div>",
        "      </td>",
        "  </tr>",
        "</table>",
        "</div>",
    ]
    .join("\n")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
