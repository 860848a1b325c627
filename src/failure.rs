use std::{
    fmt::{self, Display},
    panic::Location,
};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use minijinja::Value;
use serde::Serialize;
use serde_json::json;
use tracing_error::SpanTrace;

/// The only detail an unexpected failure ever shows a client.
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// Marker left in the extensions of an error response.
///
/// [`ErrorResponder`](crate::ErrorResponder) looks for it and replaces the
/// response with a JSON body or an HTML error page. Without the responder in
/// place the JSON body is what the client gets.
#[derive(Debug, Clone)]
pub enum Failure {
    Http(HttpError),
    Validation(ValidationError),
    Unexpected,
}

impl Failure {
    pub fn status(&self) -> StatusCode {
        match self {
            Failure::Http(error) => error.status,
            Failure::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Failure::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `detail` as sent to JSON clients.
    pub fn json_detail(&self) -> serde_json::Value {
        match self {
            Failure::Http(error) => error.detail.clone(),
            Failure::Validation(error) => json!(error.errors),
            Failure::Unexpected => json!(INTERNAL_SERVER_ERROR),
        }
    }

    /// `detail` as handed to the error page template.
    pub fn html_detail(&self) -> Value {
        match self {
            Failure::Http(error) => Value::from_serialize(&error.detail),
            Failure::Validation(error) => Value::from(error.to_string()),
            Failure::Unexpected => Value::from(INTERNAL_SERVER_ERROR),
        }
    }

    pub(crate) fn json_response(&self) -> Response {
        (self.status(), Json(json!({ "detail": self.json_detail() }))).into_response()
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut response = self.json_response();
        response.extensions_mut().insert(self);

        response
    }
}

/// A failure with an explicit status code, such as a 404 or a 403.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    status: StatusCode,
    detail: serde_json::Value,
}

impl HttpError {
    pub fn new(status: StatusCode, detail: impl Into<serde_json::Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Uses the canonical reason of `status` as the detail.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, status.canonical_reason().unwrap_or("Unknown Error"))
    }

    pub fn not_found() -> Self {
        Self::from_status(StatusCode::NOT_FOUND)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &serde_json::Value {
        &self.detail
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.detail)
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        Failure::Http(self).into_response()
    }
}

/// One problem found while extracting request input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl ValidationIssue {
    pub fn new<L: Into<String>>(
        loc: impl IntoIterator<Item = L>,
        kind: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            loc: loc.into_iter().map(Into::into).collect(),
            msg: msg.into(),
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<serde_json::Value>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Request input was missing or malformed before the handler could run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    errors: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(errors: Vec<ValidationIssue>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }
}

impl From<ValidationIssue> for ValidationError {
    fn from(issue: ValidationIssue) -> Self {
        Self::new(vec![issue])
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        write!(
            f,
            "{count} validation error{}",
            if count == 1 { "" } else { "s" }
        )?;

        for issue in &self.errors {
            write!(f, "\n{}\n  {} [type={}]", issue.loc.join("."), issue.msg, issue.kind)?;
        }

        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        Failure::Validation(self).into_response()
    }
}

/// Anything that went wrong without the client being at fault.
///
/// The cause is logged once, when the value is built. Clients only ever see
/// [`INTERNAL_SERVER_ERROR`].
#[derive(Debug)]
pub struct ServerError {
    message: String,
    span_trace: SpanTrace,
    caller: &'static Location<'static>,
}

impl ServerError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span_trace: SpanTrace::capture(),
            caller: Location::caller(),
        }
        .throw()
    }

    /// Like [`ServerError::new`], with a span trace captured elsewhere, e.g.
    /// in a panic hook.
    #[track_caller]
    pub(crate) fn with_span_trace(message: impl Into<String>, span_trace: SpanTrace) -> Self {
        Self {
            message: message.into(),
            span_trace,
            caller: Location::caller(),
        }
        .throw()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline(always)]
    fn throw(self) -> Self {
        tracing::error!(
            caller = %self.caller,
            error = %self.message,
            span_trace = %self.span_trace,
            "encountered an error serving a request"
        );

        self
    }
}

impl<E> From<E> for ServerError
where
    E: std::error::Error + 'static,
{
    #[track_caller]
    fn from(value: E) -> Self {
        let mut message = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        Self {
            message,
            span_trace: SpanTrace::capture(),
            caller: Location::caller(),
        }
        .throw()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        Failure::Unexpected.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_defaults_to_reason() {
        let error = HttpError::from_status(StatusCode::FORBIDDEN);

        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        assert_eq!(error.detail(), &json!("Forbidden"));
    }

    #[test]
    fn details_per_category() {
        let http = Failure::Http(HttpError::new(StatusCode::NOT_FOUND, "not found"));
        assert_eq!(http.status(), StatusCode::NOT_FOUND);
        assert_eq!(http.json_detail(), json!("not found"));

        let validation = Failure::Validation(
            ValidationIssue::new(["query", "page"], "int_parsing", "not a number")
                .with_input("abc")
                .into(),
        );
        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            validation.json_detail(),
            json!([{
                "type": "int_parsing",
                "loc": ["query", "page"],
                "msg": "not a number",
                "input": "abc",
            }])
        );

        let unexpected = Failure::Unexpected;
        assert_eq!(unexpected.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(unexpected.json_detail(), json!("Internal Server Error"));
        assert_eq!(unexpected.html_detail(), Value::from("Internal Server Error"));
    }

    #[test]
    fn validation_error_display_lists_issues() {
        let error = ValidationError::new(vec![
            ValidationIssue::new(["body", "name"], "missing", "field required"),
            ValidationIssue::new(["body", "age"], "int_parsing", "not a number"),
        ]);

        assert_eq!(
            error.to_string(),
            "2 validation errors\n\
             body.name\n  field required [type=missing]\n\
             body.age\n  not a number [type=int_parsing]"
        );
    }

    #[test]
    fn responses_carry_failure_marker() {
        let response = HttpError::not_found().into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(
            response.extensions().get::<Failure>(),
            Some(Failure::Http(error)) if error.status() == StatusCode::NOT_FOUND
        ));
    }

    #[test]
    fn server_error_keeps_message_out_of_response() {
        let error = ServerError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(error.message(), "boom");

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(
            response.extensions().get::<Failure>(),
            Some(Failure::Unexpected)
        ));
    }
}
