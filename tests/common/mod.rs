#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;
use webpage::{minijinja::Environment, Routes, WebPage};

pub const JSON: &str = "application/json";
pub const HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub fn webpage() -> Arc<WebPage> {
    let mut env = Environment::new();
    env.add_template_owned(
        "page.html",
        "{{ title }}|{{ webpage.site }}|{{ flag }}|{{ css_timestamp }}",
    )
    .unwrap();
    env.add_template_owned("error.html", "error {{ status_code }}: {{ detail }}")
        .unwrap();
    env.add_template_owned("link.txt", "{{ url_for('user', id=user_id) }}")
        .unwrap();
    env.add_template_owned("broken_link.txt", "{{ url_for('nowhere') }}")
        .unwrap();

    let routes = Routes::new()
        .route("index", "/")
        .route("user", "/users/:id");

    Arc::new(
        WebPage::with_environment(env, &json!({ "site": "demo" }))
            .unwrap()
            .with_routes(routes),
    )
}

pub fn get(uri: &str, accept: Option<&str>) -> Request<Body> {
    request("GET", uri, accept)
}

pub fn request(method: &str, uri: &str, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "example.com");

    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }

    builder.body(Body::empty()).unwrap()
}

pub struct Sent {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Sent {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> Sent {
    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();

    Sent {
        status,
        headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}
