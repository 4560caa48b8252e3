//! HTTP trigger surface for the extraction manager.
//!
//! A single `POST /` route. The response is always `200 OK`; success or
//! failure is carried in the JSON body's `status` field.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::http::HttpClient;
use crate::manager::{ExtractionManager, ManagerResponse};
use crate::storage::ObjectStore;

pub fn router<S, H>(manager: Arc<ExtractionManager<S, H>>) -> Router
where
    S: ObjectStore + 'static,
    H: HttpClient + 'static,
{
    Router::new()
        .route("/", post(trigger::<S, H>))
        .with_state(manager)
}

async fn trigger<S, H>(
    State(manager): State<Arc<ExtractionManager<S, H>>>,
    body: Bytes,
) -> Json<ManagerResponse>
where
    S: ObjectStore + 'static,
    H: HttpClient + 'static,
{
    // An empty or non-JSON body is reported the same as a missing one
    let payload = serde_json::from_slice::<Value>(&body).ok();
    Json(manager.handle(payload.as_ref()).await)
}
