//! Renderable views.

/// Error raised while rendering a view.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Plain failure message.
    #[error("{0}")]
    Message(String),

    /// Failure with a source chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// A subtree of UI output.
pub trait View {
    /// Produce the HTML for this view in one synchronous pass.
    fn render(&self) -> Result<String, RenderError>;
}

impl<F> View for F
where
    F: Fn() -> Result<String, RenderError>,
{
    fn render(&self) -> Result<String, RenderError> {
        self()
    }
}

/// A view with fixed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Html(pub String);

impl Html {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }
}

impl View for Html {
    fn render(&self) -> Result<String, RenderError> {
        Ok(self.0.clone())
    }
}

/// Escape text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
