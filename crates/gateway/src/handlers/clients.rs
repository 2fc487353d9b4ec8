//! Client roster handlers
//!
//! Minimal read/create surface for the clients that visits point at.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use salestrackr_common::{
    db::{models::Client, Repository},
    errors::{AppError, Result},
    AuthContext,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,

    #[validate(range(min = -90.0, max = 90.0, message = "Latitude out of range"))]
    pub lat: f64,

    #[validate(range(min = -180.0, max = 180.0, message = "Longitude out of range"))]
    pub lng: f64,

    #[validate(length(min = 1, message = "Region is required"))]
    pub region: String,

    #[serde(default)]
    pub has_complaint: bool,

    #[serde(default)]
    pub complaint_note: Option<String>,

    #[serde(default)]
    pub requested_visit: bool,
}

#[derive(Serialize)]
pub struct ClientListResponse {
    pub clients: Vec<Client>,
}

#[derive(Serialize)]
pub struct SingleClientResponse {
    pub client: Client,
}

#[derive(Serialize)]
pub struct ClientEnvelope {
    pub client: Client,
    pub message: String,
}

/// List all clients ordered by name
pub async fn list_clients(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ClientListResponse>> {
    let repo = Repository::new(state.db.clone());
    let clients = repo.list_clients().await?;

    Ok(Json(ClientListResponse { clients }))
}

/// Fetch a single client by id
pub async fn get_client(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SingleClientResponse>> {
    let repo = Repository::new(state.db.clone());

    let client = repo
        .find_client_by_id(id)
        .await?
        .ok_or_else(|| AppError::ClientNotFound { id: id.to_string() })?;

    Ok(Json(SingleClientResponse { client }))
}

/// Create a client
pub async fn create_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientEnvelope>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = Repository::new(state.db.clone());

    let client = repo
        .create_client(
            request.name,
            request.address,
            request.lat,
            request.lng,
            request.region,
            request.has_complaint,
            request.complaint_note,
            request.requested_visit,
        )
        .await?;

    tracing::info!(client_id = %client.id, created_by = %auth.user_id, "Client created");

    Ok((
        StatusCode::CREATED,
        Json(ClientEnvelope {
            client,
            message: "Client created successfully".to_string(),
        }),
    ))
}
