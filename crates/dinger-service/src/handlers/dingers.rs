//! Dinger handlers.
//!
//! - `POST /d` - Create dinger
//! - `GET /d/{id}`, `GET /d/{id}/info` - Dinger info
//! - `GET|POST /d/{id}/connect` - Subscribe a client
//! - `POST /d/{id}` - Broadcast the request body

use crate::errors::DingerError;
use crate::identifier::{self, DingerId};
use crate::models::{
    BroadcastResponse, ConnectResponse, CreateDingerParams, CreateDingerResponse,
    DingerInfoResponse,
};
use crate::routes::AppState;
use crate::services::{BroadcastDispatcher, DingerService, SessionIssuer};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

// ============================================================================
// Handler: POST /d
// ============================================================================

/// Handler for POST /d
///
/// # Response
///
/// - 201 Created: `{id, name, url}`
/// - 503 Service Unavailable: Store unavailable
#[instrument(skip_all, name = "dingaling.handler.create_dinger")]
pub async fn create_dinger(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CreateDingerParams>,
) -> Result<(StatusCode, Json<CreateDingerResponse>), DingerError> {
    let dinger = DingerService::create(state.store.as_ref(), params.name.as_deref()).await?;

    let url = dinger_url(&state, &headers, dinger.id);
    Ok((
        StatusCode::CREATED,
        Json(CreateDingerResponse {
            id: identifier::encode(dinger.id),
            name: dinger.name,
            url,
        }),
    ))
}

// ============================================================================
// Handler: GET /d/{id}/info
// ============================================================================

/// Handler for GET /d/{id} and GET /d/{id}/info
///
/// # Response
///
/// - 200 OK: `{id, name, url, created_at}`
/// - 400 Bad Request: Id is not hex
/// - 404 Not Found: No such dinger
#[instrument(skip_all, name = "dingaling.handler.dinger_info", fields(dinger_id = %id))]
pub async fn dinger_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DingerInfoResponse>, DingerError> {
    let dinger_id = identifier::decode(&id)?;
    let dinger = DingerService::lookup(state.store.as_ref(), dinger_id).await?;

    Ok(Json(DingerInfoResponse {
        id: identifier::encode(dinger.id),
        url: dinger_url(&state, &headers, dinger.id),
        name: dinger.name,
        created_at: dinger.created_at,
    }))
}

// ============================================================================
// Handler: /d/{id}/connect
// ============================================================================

/// Handler for GET|POST /d/{id}/connect
///
/// # Response
///
/// - 200 OK: `{id, token}`
/// - 400 Bad Request: Id is not hex
/// - 404 Not Found: No such dinger
/// - 503 Service Unavailable: Session or store unavailable
#[instrument(skip_all, name = "dingaling.handler.connect", fields(dinger_id = %id))]
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectResponse>, DingerError> {
    let dinger_id = identifier::decode(&id)?;
    let client =
        SessionIssuer::subscribe(state.store.as_ref(), state.channel.as_ref(), dinger_id).await?;

    Ok(Json(ConnectResponse {
        id: client.id,
        token: client.token,
    }))
}

// ============================================================================
// Handler: POST /d/{id}
// ============================================================================

/// Handler for POST /d/{id}
///
/// The request body is the message. An empty body broadcasts the default
/// message. Unknown dingers have no clients and return an empty report.
///
/// The fan-out runs on its own task. A request timeout or client disconnect
/// drops only the wait for the report; enumeration, delivery and pruning
/// still run to completion.
///
/// # Response
///
/// - 200 OK: `{delivered, pruned}`
/// - 400 Bad Request: Id is not hex or body is not UTF-8
/// - 503 Service Unavailable: Client enumeration failed
#[instrument(skip_all, name = "dingaling.handler.post_ding", fields(dinger_id = %id))]
pub async fn post_ding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<BroadcastResponse>, DingerError> {
    let dinger_id = identifier::decode(&id)?;

    let message = String::from_utf8(body.to_vec()).map_err(|e| {
        debug!(target: "dingaling.handlers.dingers", error = %e, "Message body is not UTF-8");
        DingerError::MalformedRequest("Message must be UTF-8 text".to_string())
    })?;

    let store = state.store.clone();
    let channel = state.channel.clone();
    let fan_out = tokio::spawn(async move {
        BroadcastDispatcher::broadcast(store.as_ref(), channel.as_ref(), dinger_id, &message).await
    });

    let report = fan_out.await.map_err(|e| {
        error!(target: "dingaling.handlers.dingers", error = %e, "Broadcast task failed");
        DingerError::Internal
    })??;

    Ok(Json(report.into()))
}

/// Build the public URL of a dinger.
fn dinger_url(state: &AppState, headers: &HeaderMap, id: DingerId) -> String {
    let path = format!("/d/{}", identifier::encode(id));

    if let Some(base) = &state.config.public_base_url {
        return format!("{base}{path}");
    }

    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{path}"),
        None => path,
    }
}
