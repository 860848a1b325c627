//! Template pages and content negotiated error responses for axum.
//!
//! * [`WebPage`] renders named minijinja templates with a site wide context
//!   and a pre-render context merged into every page, either directly or by
//!   wrapping a handler with [`WebPage::page`].
//! * [`ErrorResponder`] answers HTTP errors, validation failures and
//!   unexpected errors with JSON for API clients and an HTML error page for
//!   everybody else.
//! * Templates get a `url_for(name, **params)` function that respects
//!   `x-forwarded-proto` when running behind a reverse proxy.

pub mod context;
pub mod error;
pub mod extract;
pub mod failure;
pub mod middleware;
mod page;
mod request;
mod responder;
pub mod routes;

pub use minijinja;

pub use self::{
    context::{Context, SharedContext},
    error::{Error, Result},
    failure::{
        Failure, HttpError, ServerError, ValidationError, ValidationIssue, INTERNAL_SERVER_ERROR,
    },
    page::{PageData, PageHandler, WebPage},
    request::PageRequest,
    responder::{ErrorResponder, DEFAULT_ERROR_TEMPLATE},
    routes::Routes,
};
