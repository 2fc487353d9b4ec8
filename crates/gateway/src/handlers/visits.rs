//! Visit ledger handlers
//!
//! Check-in opens a visit; check-out closes it. An agent has at most
//! one open visit at a time, enforced inside the repository by a
//! conditional insert so concurrent check-ins cannot both succeed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use salestrackr_common::{
    db::Repository,
    errors::{AppError, Result},
    metrics, AuthContext, VisitFilter, VisitRecord,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub client_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    pub visit_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVisitsQuery {
    pub agent_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub active: Option<bool>,
}

/// Client reference embedded in visit responses
#[derive(Debug, Serialize)]
pub struct ClientRef {
    pub name: String,
    pub address: String,
}

/// Agent reference embedded in visit responses
#[derive(Debug, Serialize)]
pub struct AgentRef {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitResponse {
    pub id: Uuid,
    pub client_id: Uuid,
    pub agent_id: Uuid,
    pub check_in_time: chrono::DateTime<chrono::FixedOffset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_out_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    pub client: ClientRef,
    pub agent: AgentRef,
}

impl From<VisitRecord> for VisitResponse {
    fn from(record: VisitRecord) -> Self {
        Self {
            id: record.id,
            client_id: record.client_id,
            agent_id: record.agent_id,
            check_in_time: record.check_in_time,
            check_out_time: record.check_out_time,
            duration_minutes: duration_minutes(record.check_in_time, record.check_out_time),
            client: ClientRef {
                name: record.client_name,
                address: record.client_address,
            },
            agent: AgentRef {
                name: record.agent_name,
                email: record.agent_email,
            },
        }
    }
}

#[derive(Serialize)]
pub struct VisitEnvelope {
    pub visit: VisitResponse,
    pub message: String,
}

#[derive(Serialize)]
pub struct ActiveVisitResponse {
    pub visit: Option<VisitResponse>,
}

#[derive(Serialize)]
pub struct VisitListResponse {
    pub visits: Vec<VisitResponse>,
}

#[derive(Serialize)]
pub struct SingleVisitResponse {
    pub visit: VisitResponse,
}

/// Minutes between check-in and check-out; None while the visit is open
fn duration_minutes(
    check_in: chrono::DateTime<chrono::FixedOffset>,
    check_out: Option<chrono::DateTime<chrono::FixedOffset>>,
) -> Option<i64> {
    check_out.map(|out| (out - check_in).num_minutes())
}

/// Start a visit for the authenticated agent
pub async fn check_in(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<VisitEnvelope>)> {
    let repo = Repository::new(state.db.clone());

    if repo.find_client_by_id(request.client_id).await?.is_none() {
        return Err(AppError::ClientNotFound {
            id: request.client_id.to_string(),
        });
    }

    let record = repo
        .check_in_visit(auth.user_id, request.client_id)
        .await?
        .ok_or(AppError::ActiveVisitExists)?;

    metrics::record_check_in();
    tracing::info!(
        visit_id = %record.id,
        agent_id = %auth.user_id,
        client_id = %request.client_id,
        "Visit checked in"
    );

    Ok((
        StatusCode::CREATED,
        Json(VisitEnvelope {
            visit: record.into(),
            message: "Checked in successfully".to_string(),
        }),
    ))
}

/// Close a visit. Only the agent who opened the visit may close it.
pub async fn check_out(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CheckOutRequest>,
) -> Result<Json<VisitEnvelope>> {
    let repo = Repository::new(state.db.clone());

    let visit = repo
        .find_visit_by_id(request.visit_id)
        .await?
        .ok_or_else(|| AppError::VisitNotFound {
            id: request.visit_id.to_string(),
        })?;

    if visit.agent_id != auth.user_id {
        return Err(AppError::Forbidden {
            message: "You can only check out your own visits".to_string(),
        });
    }

    if !visit.is_open() {
        return Err(AppError::VisitAlreadyClosed);
    }

    // The guarded update settles a concurrent double checkout: exactly
    // one caller sees the row, the rest land here.
    let record = repo
        .close_visit(request.visit_id)
        .await?
        .ok_or(AppError::VisitAlreadyClosed)?;

    metrics::record_check_out();
    tracing::info!(visit_id = %record.id, agent_id = %auth.user_id, "Visit checked out");

    Ok(Json(VisitEnvelope {
        visit: record.into(),
        message: "Checked out successfully".to_string(),
    }))
}

/// The authenticated agent's open visit, or null
pub async fn active_visit(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ActiveVisitResponse>> {
    let repo = Repository::new(state.db.clone());
    let visit = repo.find_active_visit(auth.user_id).await?;

    Ok(Json(ActiveVisitResponse {
        visit: visit.map(Into::into),
    }))
}

/// List visits, most recent first. Filters are AND-combined.
pub async fn list_visits(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(query): Query<ListVisitsQuery>,
) -> Result<Json<VisitListResponse>> {
    let repo = Repository::new(state.db.clone());

    let filter = VisitFilter {
        agent_id: query.agent_id,
        client_id: query.client_id,
        active_only: query.active.unwrap_or(false),
    };

    let visits = repo.list_visits(filter).await?;

    Ok(Json(VisitListResponse {
        visits: visits.into_iter().map(Into::into).collect(),
    }))
}

/// Fetch a single visit by id
pub async fn get_visit(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<SingleVisitResponse>> {
    let repo = Repository::new(state.db.clone());

    let record = repo
        .find_visit_record(id)
        .await?
        .ok_or_else(|| AppError::VisitNotFound { id: id.to_string() })?;

    Ok(Json(SingleVisitResponse {
        visit: record.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn at(minute: u32) -> chrono::DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 1, 9, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_duration_minutes_closed_visit() {
        assert_eq!(duration_minutes(at(0), Some(at(45))), Some(45));
    }

    #[test]
    fn test_duration_minutes_open_visit() {
        assert_eq!(duration_minutes(at(0), None), None);
    }

    #[test]
    fn test_duration_minutes_sub_minute() {
        let check_in = at(0);
        let check_out = check_in + Duration::seconds(59);
        assert_eq!(duration_minutes(check_in, Some(check_out)), Some(0));
    }

    #[test]
    fn test_visit_response_shape() {
        let record = VisitRecord {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            check_in_time: at(0),
            check_out_time: Some(at(30)),
            client_name: "Acme Foods".to_string(),
            client_address: "1 Main St".to_string(),
            agent_name: "Alice".to_string(),
            agent_email: "alice@x.com".to_string(),
        };

        let response = VisitResponse::from(record);
        assert_eq!(response.duration_minutes, Some(30));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["client"]["name"], "Acme Foods");
        assert_eq!(json["agent"]["email"], "alice@x.com");
        assert!(json["checkInTime"].is_string());
    }

    #[test]
    fn test_open_visit_omits_checkout_fields() {
        let record = VisitRecord {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            check_in_time: at(0),
            check_out_time: None,
            client_name: "Acme Foods".to_string(),
            client_address: "1 Main St".to_string(),
            agent_name: "Alice".to_string(),
            agent_email: "alice@x.com".to_string(),
        };

        let json = serde_json::to_value(VisitResponse::from(record)).unwrap();
        assert!(json.get("checkOutTime").is_none());
        assert!(json.get("durationMinutes").is_none());
    }

    #[test]
    fn test_list_query_deserializes_camel_case() {
        let query: ListVisitsQuery =
            serde_json::from_str(r#"{"active":true,"clientId":null}"#).unwrap();
        assert_eq!(query.active, Some(true));
        assert!(query.agent_id.is_none());
    }
}
