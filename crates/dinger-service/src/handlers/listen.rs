//! Server-Sent Events listener.
//!
//! `GET /d/{id}/listen?token=...` attaches to the delivery session owned by
//! `token` and streams every message sent to that client as an SSE `data`
//! event. The stream ends when the session's channel closes.

use crate::errors::DingerError;
use crate::identifier;
use crate::models::{ClientKey, ListenParams};
use crate::routes::AppState;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, instrument};

/// Handler for GET /d/{id}/listen
///
/// # Response
///
/// - 200 OK: `text/event-stream`
/// - 400 Bad Request: Id is not hex
/// - 404 Not Found: Unknown token, or token not subscribed to this dinger
#[instrument(skip_all, name = "dingaling.handler.listen", fields(dinger_id = %id))]
pub async fn listen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ListenParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, DingerError> {
    let dinger_id = identifier::decode(&id)?;

    let (client_id, messages) = state.channel.attach(&params.token).await?;

    let key = ClientKey {
        dinger_id,
        client_id,
    };

    if !state.store.client_exists(&key).await? {
        return Err(DingerError::NotFound("Session not found".to_string()));
    }

    info!(target: "dingaling.handlers.listen", client_id = %key.client_id, "Listener attached");

    let events = messages.map(|message| Ok(Event::default().data(message)));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
