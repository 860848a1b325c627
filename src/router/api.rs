use serde::{Deserialize, Serialize};
use webpage::{extract::Json, HttpError};

#[derive(Debug, Deserialize, Serialize)]
pub struct Message {
    text: String,
}

#[tracing::instrument]
pub async fn echo(Json(message): Json<Message>) -> axum::Json<Message> {
    axum::Json(message)
}

#[tracing::instrument]
pub async fn healthy() -> &'static str {
    "OK"
}

#[tracing::instrument]
pub async fn panic() {
    panic!("manual api panic")
}

pub async fn not_found() -> HttpError {
    HttpError::not_found()
}
