use std::{
    any::Any,
    cell::RefCell,
    fmt,
    panic::AssertUnwindSafe,
    sync::Once,
};

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing_error::SpanTrace;

use crate::failure::ServerError;

#[derive(Debug)]
pub struct CaughtPanic {
    payload: Box<dyn Any + Send + 'static>,
    info: Option<PanicInfo>,
}

impl CaughtPanic {
    pub fn payload_str(&self) -> Option<&str> {
        if let Some(s) = self.payload.downcast_ref::<String>() {
            Some(s.as_str())
        } else if let Some(s) = self.payload.downcast_ref::<&str>() {
            Some(s)
        } else {
            None
        }
    }

    pub fn location(&self) -> Option<&Location> {
        self.info.as_ref().and_then(|info| info.location.as_ref())
    }

    /// The failure logged for this panic, carrying the span trace taken where
    /// the handler panicked.
    fn into_server_error(self) -> ServerError {
        let message = self
            .payload_str()
            .unwrap_or("panic payload was not a &str or String");
        let location: &dyn fmt::Display = match self.location() {
            Some(location) => location,
            None => &"unknown location",
        };
        let message = format!("handler panicked at {location}: {message}");

        let span_trace = match self.info {
            Some(info) => info.span_trace,
            None => SpanTrace::capture(),
        };

        ServerError::with_span_trace(message, span_trace)
    }
}

impl IntoResponse for CaughtPanic {
    fn into_response(self) -> Response {
        self.into_server_error().into_response()
    }
}

#[derive(Debug)]
struct PanicInfo {
    location: Option<Location>,
    span_trace: SpanTrace,
}

#[derive(Debug)]
pub struct Location {
    file: String,
    line: u32,
    column: u32,
}

impl<'a> From<&'a std::panic::Location<'a>> for Location {
    fn from(location: &'a std::panic::Location<'a>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}:{}", self.file, self.line, self.column)
    }
}

thread_local! {
    // The hook runs on the thread that is unwinding, which is the thread
    // polling the handler future inside `catch_panic`.
    static LAST_PANIC: RefCell<Option<PanicInfo>> = RefCell::new(None);
}

static INSTALL_HOOK: Once = Once::new();

/// Chains a panic hook that remembers where the last panic on each thread
/// happened. The previously installed hook still runs afterwards.
pub fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous_hook = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            let panic = PanicInfo {
                location: info.location().map(Location::from),
                span_trace: SpanTrace::capture(),
            };
            LAST_PANIC.with(|last| *last.borrow_mut() = Some(panic));

            previous_hook(info)
        }));
    });
}

/// Turns a panicking handler into an unexpected failure response instead of
/// a dropped connection.
pub async fn catch_panic(req: Request<Body>, next: Next<Body>) -> Response {
    let payload = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => return response,
        Err(payload) => payload,
    };

    let info = LAST_PANIC.with(|last| last.borrow_mut().take());

    CaughtPanic { payload, info }.into_response()
}
