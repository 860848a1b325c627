use std::{sync::Arc, time::Duration};

use axum::{
    http::header,
    routing::{get, post},
    Router,
};
use color_eyre::eyre::Context;
use serde_json::json;
use tower_http::{
    request_id::MakeRequestUuid, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
    ServiceBuilderExt,
};
use tracing::debug;
use webpage::{middleware::SpanMaker, ErrorResponder, Routes, WebPage};

use crate::environment::HttpEnvironment;

pub mod api;
pub mod index;

pub async fn router(http: &HttpEnvironment) -> color_eyre::Result<()> {
    let routes = Routes::new()
        .route("index", "/")
        .route("user", "/users/:id")
        .route("echo", "/api/echo")
        .route("static", "/static/*path");

    let webpage = WebPage::new(&http.template_dir, &json!({ "site_name": http.site_name }))
        .wrap_err("failed to set up the template environment")?
        .with_routes(routes);

    webpage
        .update_pre_context(&json!({
            "environment": if cfg!(debug_assertions) { "development" } else { "production" },
        }))
        .wrap_err("failed to set the pre-render context")?;

    let webpage = Arc::new(webpage);

    let api_router = Router::new()
        .route("/echo", post(api::echo))
        .route("/healthy", get(api::healthy))
        .route("/panic", {
            if cfg!(debug_assertions) {
                get(api::panic)
            } else {
                get(api::not_found)
            }
        });

    let app = Router::new()
        .route("/", get(webpage.page("index.html", index::index)))
        .route("/users/:id", get(webpage.page("user.html", index::user)))
        .route("/home", get(webpage.page("index.html", index::old_home)))
        .route("/teapot", get(index::teapot))
        .nest("/api", api_router)
        .nest_service(
            "/static",
            ServeDir::new(&http.static_dir).append_index_html_on_directories(false),
        )
        // Timeout if request or response hangs, answered with the error page
        .layer(TimeoutLayer::new(Duration::from_secs(10)));

    let app = ErrorResponder::new(webpage).register(app).layer(
        tower::ServiceBuilder::new()
            // Hide sensitive headers
            .sensitive_headers([header::AUTHORIZATION, header::COOKIE])
            // Give a unique identifier to every request
            .propagate_x_request_id()
            .set_x_request_id(MakeRequestUuid)
            // Trace requests and responses
            .layer(TraceLayer::new_for_http().make_span_with(SpanMaker))
            // Compress responses
            .map_response_body(axum::body::boxed)
            .compression(),
    );

    debug!(?http.bind, "started http server");
    axum::Server::bind(&http.bind)
        .serve(app.into_make_service())
        .await
        .wrap_err("failed to bind to given address")
}
