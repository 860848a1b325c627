use axum::http::{header, HeaderMap, HeaderName, Request};
use tower_http::{request_id::RequestId, trace::MakeSpan};
use tracing::{debug_span, Span};

/// Request span carrying the request id and the `Accept` header, which
/// decides how failures are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SpanMaker;

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
}

impl<B> MakeSpan<B> for SpanMaker {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or("-");

        let headers = request.headers();

        debug_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
            %id,
            accept = header_str(headers, &header::ACCEPT),
            forwarded_proto = header_str(headers, &HeaderName::from_static("x-forwarded-proto")),
        )
    }
}
