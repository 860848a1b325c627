use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::failure::ServerError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A context update, render call or url lookup was handed something it
    /// cannot use.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A page handler broke its contract with the [`WebPage`](crate::WebPage)
    /// adapter.
    #[error("handler `{handler}` violated the page contract: {reason}")]
    InternalError { handler: String, reason: String },

    #[error("no route named `{0}`")]
    RouteNotFound(String),

    #[error("failed to render template")]
    Template(#[from] minijinja::Error),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn internal(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InternalError {
            handler: handler.into(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for Error {
    #[track_caller]
    fn into_response(self) -> Response {
        ServerError::from(self).into_response()
    }
}
