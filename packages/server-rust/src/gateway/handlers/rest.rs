//! REST endpoints, one identical route set per entity kind.
//!
//! | Method | Path              | Success                 |
//! |--------|-------------------|-------------------------|
//! | GET    | `/<segment>`      | 200, JSON list          |
//! | GET    | `/<segment>/{id}` | 200, JSON entity        |
//! | POST   | `/<segment>/add`  | 200, JSON entity        |
//! | PUT    | `/<segment>/{id}` | 200, JSON entity        |
//! | DELETE | `/<segment>/{id}` | 204, empty body         |
//!
//! `<segment>` is `f1` for drivers and `motogp` for riders. Bodies are
//! `{"name": .., "team": ..}`; a missing field is stored as the empty string.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gridline_core::{Entity, EntityFields, EntityId, EntityKind};

use super::GatewayState;
use crate::gateway::error::GatewayError;

/// Routes for one kind, to be merged into the gateway router.
pub fn kind_routes(kind: EntityKind) -> Router<GatewayState> {
    let segment = kind.rest_segment();
    Router::new()
        .route(
            &format!("/{segment}"),
            get(move |state: State<GatewayState>| list(state, kind)),
        )
        .route(
            &format!("/{segment}/add"),
            post(
                move |state: State<GatewayState>, body: Result<Json<EntityFields>, JsonRejection>| {
                    create(state, kind, body)
                },
            ),
        )
        .route(
            &format!("/{segment}/{{id}}"),
            get(move |state: State<GatewayState>, id: Path<String>| fetch(state, kind, id))
                .put(
                    move |state: State<GatewayState>,
                          id: Path<String>,
                          body: Result<Json<EntityFields>, JsonRejection>| {
                        update(state, kind, id, body)
                    },
                )
                .delete(move |state: State<GatewayState>, id: Path<String>| {
                    delete(state, kind, id)
                }),
        )
}

async fn list(
    State(state): State<GatewayState>,
    kind: EntityKind,
) -> Result<Json<Vec<Entity>>, GatewayError> {
    let entities = state.clients.get(kind).list().await?;
    Ok(Json(entities))
}

async fn fetch(
    State(state): State<GatewayState>,
    kind: EntityKind,
    Path(id): Path<String>,
) -> Result<Json<Entity>, GatewayError> {
    let entity = state.clients.get(kind).get(EntityId::from(id)).await?;
    Ok(Json(entity))
}

async fn create(
    State(state): State<GatewayState>,
    kind: EntityKind,
    body: Result<Json<EntityFields>, JsonRejection>,
) -> Result<Json<Entity>, GatewayError> {
    let Json(fields) = body?;
    let entity = state.clients.get(kind).create(fields).await?;
    Ok(Json(entity))
}

async fn update(
    State(state): State<GatewayState>,
    kind: EntityKind,
    Path(id): Path<String>,
    body: Result<Json<EntityFields>, JsonRejection>,
) -> Result<Json<Entity>, GatewayError> {
    let Json(fields) = body?;
    let entity = state
        .clients
        .get(kind)
        .update(EntityId::from(id), fields)
        .await?;
    Ok(Json(entity))
}

async fn delete(
    State(state): State<GatewayState>,
    kind: EntityKind,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state.clients.get(kind).delete(EntityId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
