use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{ActorType, EventOutcome, EventRecord, EventRecordQuery};
use crate::settlement::{
    self, CreatedSession, ProcessOutcome, ProcessPaymentInput, VerifyOutcome,
};

use super::{caller_id, check_rate_limit};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub booking_id: String,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub url: String,
}

/// POST /payments/session - open a checkout session for a pending booking.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>> {
    let caller = caller_id(&headers);
    check_rate_limit(&state, &caller, "create_session")?;

    let result = settlement::create_session(
        &state,
        Some(&caller),
        &request.booking_id,
        request.success_url.as_deref(),
        request.cancel_url.as_deref(),
    )
    .await;

    match result {
        Ok(CreatedSession { session_id, url }) => {
            Ok(Json(CreateSessionResponse { session_id, url }))
        }
        Err(e) => {
            // Precondition rejections are security-relevant (a duplicate
            // charge attempt on a settled booking): keep them in the trail.
            settlement::audit(
                &state,
                ActorType::Caller,
                Some(&caller),
                "create_session",
                "booking",
                &request.booking_id,
                EventOutcome::Rejected,
                Some(&serde_json::json!({ "reason": e.code() })),
            );
            Err(e)
        }
    }
}

/// GET /payments/verify/{session_id} - synchronous settlement check.
pub async fn verify_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<VerifyOutcome>> {
    let caller = caller_id(&headers);
    check_rate_limit(&state, &caller, "verify_session")?;

    let outcome = settlement::verify_session(&state, Some(&caller), &session_id).await?;
    Ok(Json(outcome))
}

/// POST /payments/process - legacy settlement reporting by transaction id.
pub async fn process_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ProcessPaymentInput>,
) -> Result<Json<ProcessOutcome>> {
    let caller = caller_id(&headers);
    check_rate_limit(&state, &caller, "process_payment")?;

    let outcome = settlement::process_payment(&state, Some(&caller), &input)?;
    Ok(Json(outcome))
}

/// GET /audit/events - forensic query over the audit trail.
pub async fn list_audit_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventRecordQuery>,
) -> Result<Json<Vec<EventRecord>>> {
    let caller = caller_id(&headers);
    check_rate_limit(&state, &caller, "list_audit_events")?;

    let conn = state.audit.get()?;
    let records = queries::list_event_records(&conn, &query)?;
    Ok(Json(records))
}
