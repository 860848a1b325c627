use std::{any::type_name, path::Path, sync::Arc};

use axum::{
    handler::Handler,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use minijinja::{path_loader, Environment, Value};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::trace;

use crate::{
    context::{Context, SharedContext},
    request::{self, PageRequest},
    routes::Routes,
    Error, Result,
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Renders named templates with the site wide and pre-render contexts merged
/// into every page.
///
/// Share it between handlers as an `Arc<WebPage>`:
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use axum::{routing::get, Router};
/// use serde_json::json;
/// use webpage::{Context, WebPage};
///
/// async fn index() -> Context {
///     Context::from_serialize(&json!({ "title": "Home" })).unwrap()
/// }
///
/// let webpage = Arc::new(WebPage::new("templates", &json!({ "site": "demo" })).unwrap());
/// let app: Router = Router::new().route("/", get(webpage.page("index.html", index)));
/// ```
#[derive(Debug)]
pub struct WebPage {
    env: Environment<'static>,
    site: SharedContext,
    pre: SharedContext,
    routes: Arc<Routes>,
}

impl WebPage {
    /// Loads templates from `template_dir`. Names that would escape the
    /// directory are never resolved.
    pub fn new<T>(template_dir: impl AsRef<Path>, site_context: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir.as_ref()));

        Self::with_environment(env, site_context)
    }

    /// Uses an already configured environment, e.g. one with templates
    /// added from memory.
    pub fn with_environment<T>(mut env: Environment<'static>, site_context: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        env.add_function("url_for", request::url_for);

        Ok(Self {
            env,
            site: SharedContext::new(Context::from_serialize(site_context)?),
            pre: SharedContext::default(),
            routes: Arc::default(),
        })
    }

    pub fn with_routes(mut self, routes: Routes) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    pub fn site_context(&self) -> Context {
        self.site.snapshot()
    }

    pub fn update_site_context<T: Serialize + ?Sized>(&self, patch: &T) -> Result<()> {
        self.site.update(patch)
    }

    pub fn pre_context(&self) -> Context {
        self.pre.snapshot()
    }

    pub fn update_pre_context<T: Serialize + ?Sized>(&self, patch: &T) -> Result<()> {
        self.pre.update(patch)
    }

    /// Snapshot of `request` that templates see as `request`.
    pub fn request<B>(&self, request: &Request<B>) -> PageRequest {
        PageRequest::from_request(request, self.routes.clone())
    }

    /// Context for a direct [`render`](Self::render): the caller's context,
    /// then `request`, then the pre-render context, then `webpage`.
    pub fn build_render_context(&self, request: &PageRequest, context: Context) -> Context {
        let mut render = context;
        render.insert("request", Value::from_object(request.clone()));
        render.merge(self.pre.snapshot());
        render.insert("webpage", self.site.snapshot());

        render
    }

    /// Context for a wrapped page handler: the handler's data, then
    /// `request`, `webpage` and `css_timestamp`, then the pre-render context.
    pub fn build_page_context(&self, request: &PageRequest, data: Context) -> Context {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();

        let mut render = data;
        render.insert("request", Value::from_object(request.clone()));
        render.insert("webpage", self.site.snapshot());
        render.insert("css_timestamp", timestamp.to_string());
        render.merge(self.pre.snapshot());

        render
    }

    #[tracing::instrument(skip(self, request, context, headers))]
    pub fn render(
        &self,
        template: &str,
        request: &PageRequest,
        context: Context,
        status: StatusCode,
        headers: Option<HeaderMap>,
    ) -> Result<Response> {
        let mut response =
            self.render_template(template, self.build_render_context(request, context), status)?;

        if let Some(headers) = headers {
            response.headers_mut().extend(headers);
        }

        Ok(response)
    }

    fn render_template(
        &self,
        template: &str,
        context: Context,
        status: StatusCode,
    ) -> Result<Response> {
        let body = self
            .env
            .get_template(template)?
            .render(context.into_value())?;

        trace!(template, %status, "rendered template");

        let headers = [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(HTML_CONTENT_TYPE),
        )];

        Ok((status, headers, body).into_response())
    }

    /// Wraps `handler` so that the [`Context`] or [`PageData`] it returns is
    /// rendered with `template`. Any other response is passed through as is.
    pub fn page<H>(self: &Arc<Self>, template: impl Into<String>, handler: H) -> PageHandler<H> {
        self.page_with_status(template, StatusCode::OK, handler)
    }

    pub fn page_with_status<H>(
        self: &Arc<Self>,
        template: impl Into<String>,
        status: StatusCode,
        handler: H,
    ) -> PageHandler<H> {
        PageHandler {
            handler,
            webpage: self.clone(),
            template: template.into().into(),
            status,
        }
    }

    fn finish_page(
        &self,
        handler: &str,
        template: &str,
        status: StatusCode,
        request: &PageRequest,
        mut response: Response,
    ) -> Response {
        let Some(RenderData(data)) = response.extensions_mut().remove::<RenderData>() else {
            return response;
        };

        let (mut parts, _) = response.into_parts();

        let rendered = Context::from_value(data)
            .map_err(|error| Error::internal(handler, error.to_string()))
            .and_then(|data| {
                self.render_template(template, self.build_page_context(request, data), status)
            });

        match rendered {
            Ok(mut response) => {
                parts.headers.remove(header::CONTENT_TYPE);
                parts.headers.remove(header::CONTENT_LENGTH);
                response.headers_mut().extend(parts.headers);

                response
            }
            Err(error) => error.into_response(),
        }
    }
}

/// An axum handler produced by [`WebPage::page`].
pub struct PageHandler<H> {
    handler: H,
    webpage: Arc<WebPage>,
    template: Arc<str>,
    status: StatusCode,
}

impl<H: Clone> Clone for PageHandler<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            webpage: self.webpage.clone(),
            template: self.template.clone(),
            status: self.status,
        }
    }
}

impl<H, T, S, B> Handler<T, S, B> for PageHandler<H>
where
    H: Handler<T, S, B>,
    T: 'static,
    S: Send + 'static,
    B: Send + 'static,
{
    type Future = BoxFuture<'static, Response>;

    fn call(self, req: Request<B>, state: S) -> Self::Future {
        let PageHandler {
            handler,
            webpage,
            template,
            status,
        } = self;

        let request = webpage.request(&req);
        let response = handler.call(req, state);

        Box::pin(async move {
            let response = response.await;
            webpage.finish_page(type_name::<H>(), &template, status, &request, response)
        })
    }
}

/// Serializable page data for a handler wrapped with [`WebPage::page`].
///
/// The value has to serialize to a map. Anything else is answered with a
/// 500 and logged with the name of the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageData<T>(pub T);

impl<T: Serialize> IntoResponse for PageData<T> {
    fn into_response(self) -> Response {
        RenderData(Value::from_serialize(&self.0)).into_response()
    }
}

impl IntoResponse for Context {
    fn into_response(self) -> Response {
        RenderData(self.into_value()).into_response()
    }
}

/// Unrendered page data travelling from a handler to its [`PageHandler`].
#[derive(Debug, Clone)]
pub(crate) struct RenderData(pub(crate) Value);

impl IntoResponse for RenderData {
    fn into_response(self) -> Response {
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(self);

        response
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, Uri};
    use serde_json::json;

    use super::*;

    fn webpage() -> WebPage {
        let mut env = Environment::new();
        env.add_template_owned("title.html", "{{ title }}|{{ webpage.site }}")
            .unwrap();

        WebPage::with_environment(env, &json!({ "site": "demo" })).unwrap()
    }

    fn request() -> PageRequest {
        PageRequest::new(
            Method::GET,
            Uri::from_static("/"),
            HeaderMap::new(),
            Arc::default(),
        )
    }

    fn context(value: serde_json::Value) -> Context {
        Context::from_serialize(&value).unwrap()
    }

    #[test]
    fn webpage_holds_accumulated_site_context() {
        let webpage = webpage();
        webpage.update_site_context(&json!({ "theme": "dark" })).unwrap();
        webpage.update_site_context(&json!({ "site": "renamed" })).unwrap();

        let render = webpage.build_render_context(&request(), Context::new());

        assert_eq!(
            render.get("webpage"),
            Some(&Value::from_serialize(json!({ "site": "renamed", "theme": "dark" })))
        );
    }

    #[test]
    fn pre_context_beats_caller_context() {
        let webpage = webpage();
        webpage.update_pre_context(&json!({ "title": "from pre" })).unwrap();

        let caller = context(json!({ "title": "mine", "x": 1 }));
        let render = webpage.build_render_context(&request(), caller);
        assert_eq!(render.get("title"), Some(&Value::from("from pre")));
        assert_eq!(render.get("x"), Some(&Value::from(1)));

        let page = webpage.build_page_context(&request(), context(json!({ "title": "mine" })));
        assert_eq!(page.get("title"), Some(&Value::from("from pre")));
    }

    #[test]
    fn reserved_keys_cannot_be_overridden_by_caller() {
        let webpage = webpage();
        let caller = context(json!({ "request": "fake", "webpage": "fake" }));

        for render in [
            webpage.build_render_context(&request(), caller.clone()),
            webpage.build_page_context(&request(), caller),
        ] {
            assert!(render
                .get("request")
                .and_then(|value| value.downcast_object_ref::<PageRequest>())
                .is_some());
            assert_eq!(
                render.get("webpage"),
                Some(&Value::from_serialize(json!({ "site": "demo" })))
            );
        }
    }

    #[test]
    fn page_context_has_timestamp() {
        let page = webpage().build_page_context(&request(), Context::new());
        let timestamp = page.get("css_timestamp").and_then(Value::as_str).unwrap();

        assert!(timestamp.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn render_sets_status_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));

        let response = webpage()
            .render(
                "title.html",
                &request(),
                context(json!({ "title": "Hi" })),
                StatusCode::CREATED,
                Some(headers),
            )
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()[header::CONTENT_TYPE], HTML_CONTENT_TYPE);
    }

    #[test]
    fn render_leaves_shared_state_alone() {
        let webpage = webpage();
        webpage
            .render(
                "title.html",
                &request(),
                context(json!({ "site": "x" })),
                StatusCode::OK,
                None,
            )
            .unwrap();

        assert_eq!(webpage.site_context(), context(json!({ "site": "demo" })));
        assert!(webpage.pre_context().is_empty());
    }

    #[test]
    fn missing_template_is_a_template_error() {
        let error = webpage()
            .render("nope.html", &request(), Context::new(), StatusCode::OK, None)
            .unwrap_err();

        assert!(matches!(error, Error::Template(_)));
    }

    #[test]
    fn non_mapping_site_context_is_rejected() {
        let error = WebPage::with_environment(Environment::new(), &json!(["a"])).unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)));
    }
}
