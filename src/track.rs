use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use log::{debug, error, info};

use crate::data::visit_model::{ClientEventType, VisitEvent};
use crate::error::AppError;
use crate::AppState;

const INVALID_EVENT_TYPE: &str = "Invalid event type";
const LOG_FAILED: &str = "Failed to log event";

#[derive(Debug, serde::Deserialize)]
pub struct TrackRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct TrackResponse {
    success: bool,
}

/// Records a client-reported event. Unlike page visits the append is awaited
/// so the browser learns whether it was stored.
#[debug_handler]
pub async fn track_handler(
    State(s): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TrackRequest>, JsonRejection>,
) -> Result<Json<TrackResponse>, AppError> {
    let kind = match payload {
        Ok(Json(req)) => req.kind,
        Err(e) => {
            debug!("track: rejected body: {}", e);
            None
        }
    };
    let kind = match kind.as_deref().map(str::parse::<ClientEventType>) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            debug!("track: {}", e);
            return Err(AppError::BadRequest(INVALID_EVENT_TYPE));
        }
        None => return Err(AppError::BadRequest(INVALID_EVENT_TYPE)),
    };

    let event = VisitEvent::client_event(kind, &headers);
    if let Err(e) = s.store.append_event(&event).await {
        error!("Track API error: {:#}", e);
        return Err(AppError::InternalServerError(LOG_FAILED));
    }
    info!("Client event logged: {}", event.summary());

    Ok(Json(TrackResponse { success: true }))
}
