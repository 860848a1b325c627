use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use webpage::{
    extract::{Path, Query},
    HttpError, PageData,
};

#[derive(Debug, Deserialize)]
pub struct Greeting {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexPage {
    title: &'static str,
    name: String,
}

#[tracing::instrument]
pub async fn index(Query(greeting): Query<Greeting>) -> PageData<IndexPage> {
    PageData(IndexPage {
        title: "Home",
        name: greeting.name.unwrap_or_else(|| "stranger".to_string()),
    })
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    title: String,
    id: u32,
}

#[tracing::instrument]
pub async fn user(Path(id): Path<u32>) -> Result<PageData<UserPage>, HttpError> {
    if id == 0 {
        return Err(HttpError::new(
            StatusCode::NOT_FOUND,
            format!("user {id} does not exist"),
        ));
    }

    Ok(PageData(UserPage {
        title: format!("User {id}"),
        id,
    }))
}

/// Wrapped like a page, but always answers with its own response.
pub async fn old_home() -> Response {
    Redirect::permanent("/").into_response()
}

pub async fn teapot() -> HttpError {
    HttpError::new(StatusCode::IM_A_TEAPOT, "short and stout")
}
