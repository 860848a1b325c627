use std::{collections::BTreeMap, sync::Arc};

use axum::http::{
    header,
    uri::{Authority, Parts, PathAndQuery, Scheme},
    HeaderMap, Method, Request, Uri,
};
use minijinja::{
    value::{Enumerator, Kwargs, Object},
    ErrorKind, State, Value,
};
use tracing::{debug, trace};

use crate::{routes::Routes, Error, Result};

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const JSON_MIME: &str = "application/json";

/// What a page or error template gets to see of the incoming request.
///
/// Exposed to templates as `request`, with the attributes `method`, `url`,
/// `path`, `query`, `base_url` and `headers`.
#[derive(Debug, Clone)]
pub struct PageRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    scheme: Scheme,
    authority: Authority,
    routes: Arc<Routes>,
}

impl PageRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, routes: Arc<Routes>) -> Self {
        let scheme = uri.scheme().cloned().unwrap_or(Scheme::HTTP);
        let authority = headers
            .get(header::HOST)
            .and_then(|host| host.to_str().ok())
            .and_then(|host| host.parse::<Authority>().ok())
            .or_else(|| uri.authority().cloned())
            .unwrap_or_else(|| Authority::from_static("localhost"));

        Self {
            method,
            uri,
            headers,
            scheme,
            authority,
            routes,
        }
    }

    pub fn from_request<B>(request: &Request<B>, routes: Arc<Routes>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
            routes,
        )
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw `Accept` header, empty when absent or not valid UTF-8.
    pub fn accept(&self) -> &str {
        self.headers
            .get(header::ACCEPT)
            .and_then(|accept| accept.to_str().ok())
            .unwrap_or("")
    }

    /// Plain substring check on the `Accept` header. Quality values and
    /// ranking are ignored.
    pub fn wants_json(&self) -> bool {
        self.accept().contains(JSON_MIME)
    }

    /// Scheme and host the server was reached on, without the path.
    pub fn base_url(&self) -> String {
        format!("{}://{}/", self.scheme, self.authority)
    }

    pub fn url(&self) -> String {
        let path_and_query = self
            .uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");

        format!("{}://{}{}", self.scheme, self.authority, path_and_query)
    }

    /// Absolute url of the route registered under `name`.
    ///
    /// When a reverse proxy announced the original scheme through
    /// `x-forwarded-proto`, that scheme replaces the one the server saw.
    pub fn url_for(&self, name: &str, params: &BTreeMap<String, String>) -> Result<String> {
        let path = self.routes.path_for(name, params)?;

        let mut parts = Parts::default();
        parts.scheme = Some(self.scheme.clone());
        parts.authority = Some(self.authority.clone());
        parts.path_and_query = Some(path.parse::<PathAndQuery>().map_err(|error| {
            Error::invalid_argument(format!("invalid path `{path}`: {error}"))
        })?);

        let uri = Uri::from_parts(parts).map_err(|error| {
            Error::invalid_argument(format!("invalid url for `{name}`: {error}"))
        })?;

        Ok(forward_scheme(uri, &self.headers).to_string())
    }
}

fn forward_scheme(uri: Uri, headers: &HeaderMap) -> Uri {
    let Some(forwarded) = headers.get(FORWARDED_PROTO) else {
        return uri;
    };

    let scheme = match forwarded.to_str().map(|value| value.trim().parse::<Scheme>()) {
        Ok(Ok(scheme)) => scheme,
        _ => {
            debug!(?forwarded, "ignoring unusable x-forwarded-proto header");
            return uri;
        }
    };

    trace!(%scheme, %uri, "rewriting url scheme from x-forwarded-proto");

    let mut parts = uri.into_parts();
    parts.scheme = Some(scheme);

    Uri::from_parts(parts).expect("replacing the scheme of an absolute uri should keep it valid")
}

impl Object for PageRequest {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let value = match key.as_str()? {
            "method" => Value::from(self.method.as_str()),
            "url" => Value::from(self.url()),
            "path" => Value::from(self.uri.path()),
            "query" => Value::from(self.uri.query().unwrap_or_default()),
            "base_url" => Value::from(self.base_url()),
            "headers" => self
                .headers
                .keys()
                .map(|name| {
                    let values = self
                        .headers
                        .get_all(name)
                        .iter()
                        .filter_map(|value| value.to_str().ok())
                        .collect::<Vec<_>>()
                        .join(", ");

                    (name.as_str().to_string(), values)
                })
                .collect(),
            _ => return None,
        };

        Some(value)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["method", "url", "path", "query", "base_url", "headers"])
    }
}

/// `url_for(name, **params)` as seen from templates.
pub(crate) fn url_for(
    state: &State,
    name: &str,
    kwargs: Kwargs,
) -> Result<String, minijinja::Error> {
    let request = state.lookup("request").ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::UndefinedError,
            "url_for needs `request` in the template context",
        )
    })?;
    let request = request.downcast_object_ref::<PageRequest>().ok_or_else(|| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            "`request` in the template context is not a page request",
        )
    })?;

    let mut params = BTreeMap::new();
    for key in kwargs.args() {
        let value: Value = kwargs.get(key)?;
        params.insert(key.to_string(), value.to_string());
    }

    request.url_for(name, &params).map_err(|error| {
        minijinja::Error::new(ErrorKind::InvalidOperation, format!("url_for(`{name}`) failed"))
            .with_source(error)
    })
}
