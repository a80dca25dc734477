//! Fallback views for failed boundaries.

use sitekit_core::RuntimeMode;

use crate::boundary::{CapturedError, ReloadHandle, ResetHandle};
use crate::view::html_escape;

/// What a fallback receives when a boundary has failed.
pub struct FallbackProps<'a> {
    /// The intercepted error.
    pub error: &'a CapturedError,
    /// Clears the failure so the next render shows the child again.
    pub reset: ResetHandle,
    /// Restarts the whole application.
    pub reload: ReloadHandle,
    /// Name of the failed boundary.
    pub boundary: &'a str,
    pub mode: RuntimeMode,
}

/// Renders the view shown in place of a failed subtree.
pub trait FallbackRenderer {
    fn render(&self, props: &FallbackProps<'_>) -> String;
}

impl<F> FallbackRenderer for F
where
    F: Fn(&FallbackProps<'_>) -> String,
{
    fn render(&self, props: &FallbackProps<'_>) -> String {
        self(props)
    }
}

/// The standard "something went wrong" screen.
///
/// Outside production the error message and details are included.
/// The retry and reload buttons carry `data-action` attributes that the
/// client script maps to the reset and reload handles.
#[derive(Debug, Clone)]
pub struct DefaultFallback {
    title: String,
    message: String,
}

impl Default for DefaultFallback {
    fn default() -> Self {
        Self {
            title: "Something went wrong".to_string(),
            message: "Sorry, an unexpected error occurred. Try again or reload the page, \
                      and contact support if the problem persists."
                .to_string(),
        }
    }
}

impl DefaultFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heading.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the explanatory text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl FallbackRenderer for DefaultFallback {
    fn render(&self, props: &FallbackProps<'_>) -> String {
        let mut html = String::new();
        html.push_str(r#"<div class="error-boundary" role="alert">"#);
        html.push_str(&format!("<h1>{}</h1>", html_escape(&self.title)));
        html.push_str(&format!("<p>{}</p>", html_escape(&self.message)));

        if props.mode.exposes_diagnostics() {
            let mut details = html_escape(&props.error.message);
            if let Some(extra) = &props.error.details {
                details.push_str("\n\n");
                details.push_str(&html_escape(extra));
            }
            html.push_str(&format!(
                "<details><summary>Error details</summary><pre>{}</pre></details>",
                details
            ));
        }

        html.push_str(&format!(
            r#"<div class="error-boundary-actions"><button type="button" data-action="reset" data-boundary="{}">Try again</button><button type="button" data-action="reload">Reload page</button></div>"#,
            html_escape(props.boundary)
        ));
        html.push_str("</div>");
        html
    }
}
