//! The error boundary state machine.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Once;

use sitekit_core::RuntimeMode;

use crate::collaborators::{ErrorContext, ErrorReporter, LoggingReloader, Reloader, TracingReporter};
use crate::fallback::{DefaultFallback, FallbackProps, FallbackRenderer};
use crate::view::{RenderError, View};

/// How an intercepted failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// The view returned `Err`.
    Error,
    /// The view panicked.
    Panic,
}

/// A failure recorded by a boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    pub message: String,
    /// Debug rendering of the error chain, or the panic location.
    pub details: Option<String>,
    pub origin: FailureOrigin,
}

impl CapturedError {
    pub fn new(message: impl Into<String>, origin: FailureOrigin) -> Self {
        Self {
            message: message.into(),
            details: None,
            origin,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn from_panic(payload: Box<dyn Any + Send>, location: Option<String>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "render panicked".to_string()
        };
        Self {
            message,
            details: location,
            origin: FailureOrigin::Panic,
        }
    }
}

thread_local! {
    static LAST_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a panic hook that records where the current thread last panicked,
/// plus a backtrace when `RUST_BACKTRACE` enables one.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut details = match info.location() {
                Some(loc) => format!("panicked at {}:{}:{}", loc.file(), loc.line(), loc.column()),
                None => "panicked at an unknown location".to_string(),
            };
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                details.push_str(&format!("\n{backtrace}"));
            }
            let _ = LAST_PANIC.try_with(|slot| *slot.borrow_mut() = Some(details));
            previous(info);
        }));
    });
}

fn take_last_panic() -> Option<String> {
    LAST_PANIC.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

impl From<RenderError> for CapturedError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Message(message) => Self::new(message, FailureOrigin::Error),
            RenderError::Other(err) => {
                Self::new(err.to_string(), FailureOrigin::Error).with_details(format!("{err:?}"))
            }
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Failure record of a boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BoundaryState {
    #[default]
    Normal,
    Failed(CapturedError),
}

impl BoundaryState {
    pub fn has_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn error(&self) -> Option<&CapturedError> {
        match self {
            Self::Normal => None,
            Self::Failed(err) => Some(err),
        }
    }
}

/// Clears a boundary's failure record.
///
/// Holds a weak reference, so a handle that outlives its boundary does nothing.
#[derive(Clone)]
pub struct ResetHandle {
    state: Weak<RefCell<BoundaryState>>,
}

impl ResetHandle {
    /// Return the boundary to `Normal`. Returns false if the boundary is gone.
    pub fn reset(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => {
                *state.borrow_mut() = BoundaryState::Normal;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ResetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetHandle")
            .field("attached", &(self.state.strong_count() > 0))
            .finish()
    }
}

/// Requests a full application restart.
#[derive(Clone)]
pub struct ReloadHandle {
    reloader: Rc<dyn Reloader>,
}

impl ReloadHandle {
    pub fn reload(&self) {
        self.reloader.restart_application();
    }
}

impl fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReloadHandle")
    }
}

/// Renders a child view and swaps in a fallback when the child fails.
///
/// The boundary starts `Normal`. A render pass in which the child returns
/// `Err` or panics moves it to `Failed`, reports the error, and renders the
/// fallback in the same pass. It stays `Failed` until reset; the next
/// render after a reset tries the child again.
///
/// # Example
///
/// ```
/// use sitekit_boundary::{ErrorBoundary, RenderError};
///
/// let boundary = ErrorBoundary::new(|| Err::<String, _>(RenderError::msg("boom")))
///     .with_fallback(|_: &sitekit_boundary::FallbackProps<'_>| "fallback".to_string());
///
/// assert_eq!(boundary.render(), "fallback");
/// assert!(boundary.is_failed());
/// ```
pub struct ErrorBoundary {
    name: String,
    child: Box<dyn View>,
    state: Rc<RefCell<BoundaryState>>,
    fallback: Box<dyn FallbackRenderer>,
    reporter: Rc<dyn ErrorReporter>,
    reloader: Rc<dyn Reloader>,
    mode: RuntimeMode,
}

impl ErrorBoundary {
    /// Wrap a view with the default fallback, reporter and reloader.
    pub fn new(child: impl View + 'static) -> Self {
        Self {
            name: "root".to_string(),
            child: Box::new(child),
            state: Rc::new(RefCell::new(BoundaryState::Normal)),
            fallback: Box::new(DefaultFallback::default()),
            reporter: Rc::new(TracingReporter),
            reloader: Rc::new(LoggingReloader),
            mode: RuntimeMode::from_env(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the default fallback.
    pub fn with_fallback(mut self, fallback: impl FallbackRenderer + 'static) -> Self {
        self.fallback = Box::new(fallback);
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Rc::new(reporter);
        self
    }

    pub fn with_reloader(mut self, reloader: impl Reloader + 'static) -> Self {
        self.reloader = Rc::new(reloader);
        self
    }

    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the child, or the fallback if the boundary has failed.
    pub fn render(&self) -> String {
        let current = self.state.borrow().error().cloned();
        let error = match current {
            Some(err) => err,
            None => match self.render_child() {
                Ok(html) => return html,
                Err(err) => {
                    self.capture(err.clone());
                    err
                }
            },
        };
        self.render_fallback(&error)
    }

    fn render_child(&self) -> Result<String, CapturedError> {
        install_panic_hook();
        take_last_panic();
        match panic::catch_unwind(AssertUnwindSafe(|| self.child.render())) {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(err)) => Err(CapturedError::from(err)),
            Err(payload) => Err(CapturedError::from_panic(payload, take_last_panic())),
        }
    }

    fn capture(&self, error: CapturedError) {
        let context = ErrorContext {
            boundary: self.name.clone(),
            origin: error.origin,
            mode: self.mode,
        };
        self.reporter.report(&error, &context);
        *self.state.borrow_mut() = BoundaryState::Failed(error);
    }

    fn render_fallback(&self, error: &CapturedError) -> String {
        let props = FallbackProps {
            error,
            reset: self.reset_handle(),
            reload: self.reload_handle(),
            boundary: &self.name,
            mode: self.mode,
        };
        self.fallback.render(&props)
    }

    /// Clear the failure record.
    pub fn reset(&self) {
        tracing::debug!(boundary = %self.name, "error boundary reset");
        *self.state.borrow_mut() = BoundaryState::Normal;
    }

    pub fn reset_handle(&self) -> ResetHandle {
        ResetHandle {
            state: Rc::downgrade(&self.state),
        }
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            reloader: Rc::clone(&self.reloader),
        }
    }

    /// Swap the guarded view. Does not touch the failure record.
    pub fn replace_child(&mut self, child: impl View + 'static) {
        self.child = Box::new(child);
    }

    pub fn state(&self) -> BoundaryState {
        self.state.borrow().clone()
    }

    pub fn is_failed(&self) -> bool {
        self.state.borrow().has_failed()
    }

    pub fn captured_error(&self) -> Option<CapturedError> {
        self.state.borrow().error().cloned()
    }
}

impl View for ErrorBoundary {
    fn render(&self) -> Result<String, RenderError> {
        Ok(ErrorBoundary::render(self))
    }
}

impl fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorBoundary")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Wrap `view` in a boundary that uses `fallback`.
pub fn with_error_boundary(
    view: impl View + 'static,
    fallback: impl FallbackRenderer + 'static,
) -> ErrorBoundary {
    ErrorBoundary::new(view).with_fallback(fallback)
}
