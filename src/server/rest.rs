//! Table endpoints under `/rest/v1/{table}`.
//!
//! - `POST`: upsert a JSON array of rows, answers with the committed rows
//! - `GET`: every row of the table
//! - `DELETE ?id=...`: rows matching the filter; unfiltered deletes are refused

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use obra_core::{Predicate, Row};

use super::auth::{error_response, AuthClient};
use super::storage::ServerStorageError;
use super::AppState;

impl IntoResponse for ServerStorageError {
    fn into_response(self) -> Response {
        match &self {
            ServerStorageError::UnknownTable(_) => {
                error_response(StatusCode::NOT_FOUND, "unknown_table", self.to_string())
            }
            ServerStorageError::BadRequest(_) => {
                error_response(StatusCode::BAD_REQUEST, "bad_request", self.to_string())
            }
            ServerStorageError::IoError(_, _) | ServerStorageError::ParseError(_, _) => {
                tracing::error!(error = %self, "Storage failure");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    self.to_string(),
                )
            }
        }
    }
}

pub async fn upsert_rows(
    Path(table): Path<String>,
    State(state): State<AppState>,
    Extension(client): Extension<AuthClient>,
    Json(rows): Json<Vec<Row>>,
) -> Result<Json<Vec<Row>>, ServerStorageError> {
    let (committed, events) = state.storage.upsert(&table, rows).await?;
    tracing::debug!(table = %table, client = %client.client, rows = committed.len(), "Upserted rows");
    state.hub.publish(events);
    Ok(Json(committed))
}

pub async fn select_rows(
    Path(table): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Row>>, ServerStorageError> {
    Ok(Json(state.storage.select_all(&table).await?))
}

pub async fn delete_rows(
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
    Extension(client): Extension<AuthClient>,
) -> Result<StatusCode, ServerStorageError> {
    let predicate = query
        .as_deref()
        .and_then(Predicate::parse)
        .ok_or_else(|| ServerStorageError::BadRequest("delete requires an id filter".to_string()))?;

    let events = state.storage.delete_where(&table, &predicate).await?;
    tracing::debug!(table = %table, client = %client.client, rows = events.len(), "Deleted rows");
    state.hub.publish(events);
    Ok(StatusCode::NO_CONTENT)
}
