use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tracing::{debug, error};

use crate::{
    context::Context,
    failure::{Failure, HttpError},
    middleware::catch_panic::{catch_panic, install_panic_hook},
    page::RenderData,
    request::PageRequest,
    Error, WebPage,
};

pub const DEFAULT_ERROR_TEMPLATE: &str = "error.html";

/// Answers every failure that reaches the outside of the router, as JSON
/// when the client accepts `application/json` and as a rendered error page
/// otherwise.
#[derive(Debug, Clone)]
pub struct ErrorResponder {
    webpage: Arc<WebPage>,
    template: Arc<str>,
}

impl ErrorResponder {
    pub fn new(webpage: Arc<WebPage>) -> Self {
        Self {
            webpage,
            template: DEFAULT_ERROR_TEMPLATE.into(),
        }
    }

    /// Template rendered for HTML clients. It receives `status_code` and
    /// `detail` on top of the usual page context.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into().into();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Installs the not-found fallback, the panic catcher and the failure
    /// interceptor on `router`. Any fallback set earlier is replaced.
    ///
    /// Validation failures are only recognised when they come from the
    /// extractors in [`crate::extract`]. axum's own extractors reject with a
    /// `text/plain` body of their own, which is passed through untouched like
    /// any other response that already has a body. Layers that should have
    /// their bare error statuses answered here, such as a timeout, have to be
    /// added to `router` before it is registered.
    pub fn register<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        install_panic_hook();

        router
            .fallback(not_found)
            .layer(middleware::from_fn(catch_panic))
            .layer(middleware::from_fn_with_state(self, intercept))
    }

    /// Builds the response for `failure` in the format `request` asks for.
    #[tracing::instrument(skip(self, request))]
    pub fn respond(&self, request: &PageRequest, failure: Failure) -> Response {
        if request.wants_json() {
            debug!("answering failure with json");
            return failure.json_response();
        }

        let status = failure.status();

        let mut context = Context::new();
        context.insert("status_code", status.as_u16());
        context.insert("detail", failure.html_detail());

        match self
            .webpage
            .render(&self.template, request, context, status, None)
        {
            Ok(response) => response,
            Err(error) => {
                error!(%error, template = %self.template, "failed to render error page");

                let reason = status.canonical_reason().unwrap_or("Unknown Error");
                (status, format!("{} {reason}", status.as_u16())).into_response()
            }
        }
    }
}

async fn not_found() -> HttpError {
    HttpError::not_found()
}

async fn intercept(
    State(responder): State<ErrorResponder>,
    req: Request<Body>,
    next: Next<Body>,
) -> Response {
    let request = responder.webpage.request(&req);
    let mut response = next.run(req).await;

    let failure = if let Some(failure) = response.extensions_mut().remove::<Failure>() {
        failure
    } else if response.extensions_mut().remove::<RenderData>().is_some() {
        let error = Error::internal(
            request.uri().path(),
            "page data was returned by a handler that is not wrapped with WebPage::page",
        );
        error!(%error, "page data reached the client without being rendered");

        Failure::Unexpected
    } else if is_bare_error(&response) {
        Failure::Http(HttpError::from_status(response.status()))
    } else {
        return response;
    };

    let mut replacement = responder.respond(&request, failure);

    // Keep headers the handler set, e.g. `allow` on a 405.
    let headers = response.headers();
    for name in headers.keys() {
        if name == header::CONTENT_TYPE
            || name == header::CONTENT_LENGTH
            || replacement.headers().contains_key(name)
        {
            continue;
        }

        for value in headers.get_all(name) {
            replacement.headers_mut().append(name.clone(), value.clone());
        }
    }

    replacement
}

/// An error status without a body, like the 405 the router produces on its
/// own.
fn is_bare_error(response: &Response) -> bool {
    let status: StatusCode = response.status();

    (status.is_client_error() || status.is_server_error())
        && !response.headers().contains_key(header::CONTENT_TYPE)
}
