//! Drop-in replacements for axum's input extractors whose rejections are
//! [`ValidationError`]s, so malformed input is answered with a 422 in the
//! format the client asked for.

use axum::{
    async_trait,
    body::HttpBody,
    extract::{
        path::ErrorKind,
        rejection::{JsonRejection, PathRejection, RawFormRejection},
        FromRequest, FromRequestParts, RawForm,
    },
    http::{request, Method, Request},
    BoxError,
};
use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;

use crate::failure::{ValidationError, ValidationIssue};

#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

#[derive(Debug, Clone, Copy, Default)]
pub struct Form<T>(pub T);

#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

#[derive(Debug, Clone, Copy, Default)]
pub struct Path<T>(pub T);

#[async_trait]
impl<T, S, B> FromRequest<S, B> for Json<T>
where
    T: DeserializeOwned,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[async_trait]
impl<T, S, B> FromRequest<S, B> for Form<T>
where
    T: DeserializeOwned,
    B: HttpBody + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        // `RawForm` reads the query string for GET requests.
        let location = if req.method() == Method::GET {
            "query"
        } else {
            "body"
        };

        let RawForm(bytes) = RawForm::from_request(req, state).await?;
        deserialize_urlencoded(&bytes, location, "form_invalid").map(Self)
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();
        deserialize_urlencoded(query.as_bytes(), "query", "query_invalid").map(Self)
    }
}

/// Deserializes urlencoded `input`, pointing the issue at the offending
/// field when there is one.
fn deserialize_urlencoded<T: DeserializeOwned>(
    input: &[u8],
    location: &str,
    kind: &str,
) -> Result<T, ValidationError> {
    let deserializer = serde_urlencoded::Deserializer::new(form_urlencoded::parse(input));

    serde_path_to_error::deserialize(deserializer).map_err(|error| {
        let field = error
            .path()
            .iter()
            .filter(|segment| !matches!(segment, Segment::Unknown))
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let input = match field.as_slice() {
            [key] => form_urlencoded::parse(input)
                .find(|(name, _)| name == key.as_str())
                .map(|(_, value)| value.into_owned()),
            _ => None,
        };

        let mut loc = vec![location.to_string()];
        loc.extend(field);

        let issue = ValidationIssue::new(loc, kind, error.into_inner().to_string());
        let issue = match input {
            Some(input) => issue.with_input(input),
            None => issue,
        };

        issue.into()
    })
}

#[async_trait]
impl<T, S> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ValidationError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) =
            axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

impl From<JsonRejection> for ValidationError {
    fn from(rejection: JsonRejection) -> Self {
        let kind = match &rejection {
            JsonRejection::JsonDataError(_) => "json_data",
            JsonRejection::JsonSyntaxError(_) => "json_invalid",
            JsonRejection::MissingJsonContentType(_) => "json_content_type",
            _ => "body_unreadable",
        };

        ValidationIssue::new(["body"], kind, rejection.body_text()).into()
    }
}

impl From<RawFormRejection> for ValidationError {
    fn from(rejection: RawFormRejection) -> Self {
        let kind = match &rejection {
            RawFormRejection::InvalidFormContentType(_) => "form_content_type",
            _ => "body_unreadable",
        };

        ValidationIssue::new(["body"], kind, rejection.body_text()).into()
    }
}

impl From<PathRejection> for ValidationError {
    fn from(rejection: PathRejection) -> Self {
        let message = rejection.body_text();

        let issue = match rejection {
            PathRejection::FailedToDeserializePathParams(error) => match error.into_kind() {
                ErrorKind::ParseErrorAtKey {
                    key,
                    value,
                    expected_type,
                } => ValidationIssue::new(
                    ["path".to_string(), key],
                    format!("{expected_type}_parsing"),
                    message,
                )
                .with_input(value),
                ErrorKind::ParseErrorAtIndex {
                    index,
                    value,
                    expected_type,
                } => ValidationIssue::new(
                    ["path".to_string(), index.to_string()],
                    format!("{expected_type}_parsing"),
                    message,
                )
                .with_input(value),
                ErrorKind::ParseError {
                    value,
                    expected_type,
                } => ValidationIssue::new(["path"], format!("{expected_type}_parsing"), message)
                    .with_input(value),
                ErrorKind::InvalidUtf8InPathParam { key } => {
                    ValidationIssue::new(["path".to_string(), key], "utf8_invalid", message)
                }
                _ => ValidationIssue::new(["path"], "path_invalid", message),
            },
            _ => ValidationIssue::new(["path"], "path_missing", message),
        };

        issue.into()
    }
}
