use std::collections::{BTreeMap, HashMap};

use crate::{Error, Result};

/// Named path patterns used to generate links from templates.
///
/// Patterns use the same syntax as the axum router: `:name` captures one
/// segment and `*name` captures the rest of the path.
#[derive(Debug, Clone, Default)]
pub struct Routes(HashMap<String, Pattern>);

#[derive(Debug, Clone)]
struct Pattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, name: impl Into<String>, path: &str) -> Self {
        self.insert(name, path);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, path: &str) {
        self.0.insert(name.into(), Pattern::parse(path));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Fills in the pattern registered under `name`.
    ///
    /// Every placeholder of the pattern must be given and no others.
    pub fn path_for(&self, name: &str, params: &BTreeMap<String, String>) -> Result<String> {
        let pattern = self
            .0
            .get(name)
            .ok_or_else(|| Error::RouteNotFound(name.to_string()))?;

        if let Some(unknown) = params.keys().find(|key| !pattern.has_param(key)) {
            return Err(Error::invalid_argument(format!(
                "route `{name}` has no parameter `{unknown}`"
            )));
        }

        let mut path = String::new();
        for segment in &pattern.segments {
            path.push('/');

            match segment {
                Segment::Static(text) => path.push_str(text),
                Segment::Param(param) => {
                    path.push_str(&urlencoding::encode(lookup(name, param, params)?))
                }
                Segment::Wildcard(param) => {
                    let rest = lookup(name, param, params)?.trim_start_matches('/');
                    let encoded = rest
                        .split('/')
                        .map(|part| urlencoding::encode(part).into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    path.push_str(&encoded);
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }

        Ok(path)
    }
}

fn lookup<'p>(route: &str, param: &str, params: &'p BTreeMap<String, String>) -> Result<&'p str> {
    params.get(param).map(String::as_str).ok_or_else(|| {
        Error::invalid_argument(format!("route `{route}` expects parameter `{param}`"))
    })
}

impl Pattern {
    fn parse(path: &str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Self {
                segments: Vec::new(),
            };
        }

        let segments = path
            .split('/')
            .map(|segment| {
                if let Some(param) = segment.strip_prefix(':') {
                    Segment::Param(param.to_string())
                } else if let Some(param) = segment.strip_prefix('*') {
                    Segment::Wildcard(param.to_string())
                } else {
                    Segment::Static(segment.to_string())
                }
            })
            .collect();

        Self { segments }
    }

    fn has_param(&self, name: &str) -> bool {
        self.segments.iter().any(|segment| match segment {
            Segment::Param(param) | Segment::Wildcard(param) => param == name,
            Segment::Static(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn routes() -> Routes {
        Routes::new()
            .route("index", "/")
            .route("user", "/users/:id")
            .route("post", "/users/:id/posts/:slug/")
            .route("static", "/static/*path")
    }

    #[test]
    fn fills_placeholders() {
        let routes = routes();

        assert_eq!(routes.path_for("index", &params(&[])).unwrap(), "/");
        assert_eq!(routes.path_for("user", &params(&[("id", "7")])).unwrap(), "/users/7");
        assert_eq!(
            routes
                .path_for("post", &params(&[("id", "7"), ("slug", "hello")]))
                .unwrap(),
            "/users/7/posts/hello/"
        );
    }

    #[test]
    fn encodes_single_segments() {
        let path = routes()
            .path_for("user", &params(&[("id", "a b/c")]))
            .unwrap();

        assert_eq!(path, "/users/a%20b%2Fc");
    }

    #[test]
    fn wildcard_keeps_slashes() {
        let path = routes()
            .path_for("static", &params(&[("path", "css/main file.css")]))
            .unwrap();

        assert_eq!(path, "/static/css/main%20file.css");
    }

    #[test]
    fn unknown_route() {
        let error = routes().path_for("missing", &params(&[])).unwrap_err();
        assert!(matches!(error, Error::RouteNotFound(name) if name == "missing"));
    }

    #[test]
    fn missing_and_extra_parameters() {
        let routes = routes();

        assert!(matches!(
            routes.path_for("user", &params(&[])),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            routes.path_for("user", &params(&[("id", "1"), ("page", "2")])),
            Err(Error::InvalidArgument(_))
        ));
    }
}
