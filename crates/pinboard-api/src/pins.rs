use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, warn};

use pinboard_db::models::{CommentOutcome, NewPin, PinOutcome, ReportOutcome};
use pinboard_types::api::{CommentRequest, CreatePinRequest, CreatePinResponse, ReportPinRequest};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::{AppState, run_db};
use crate::validation;

/// POST /pins
pub async fn create_pin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreatePinRequest>,
) -> ApiResult<(StatusCode, Json<CreatePinResponse>)> {
    validation::title(&req.title)?;
    validation::unix_path("image", &req.image_path)?;

    let outcome = run_db(&state.db, move |db| {
        db.create_pin(
            auth.user_id,
            &NewPin {
                title: &req.title,
                description: &req.description,
                image_path: &req.image_path,
                board_id: req.board_id,
            },
        )
    })
    .await?;

    match outcome {
        PinOutcome::Created(pin_id) => {
            info!(user_id = auth.user_id, pin_id, "Pin created");
            Ok((StatusCode::CREATED, Json(CreatePinResponse { pin_id })))
        }
        PinOutcome::BoardNotFound => Err(ApiError::NotFound("board not found".into())),
    }
}

/// POST /pins/{id}/report
pub async fn report_pin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(pin_id): Path<i64>,
    Json(req): Json<ReportPinRequest>,
) -> ApiResult<StatusCode> {
    let outcome = run_db(&state.db, move |db| {
        db.report_pin(pin_id, auth.user_id, &req.description)
    })
    .await?;

    let (owner_id, pin_title, reports_count) = match outcome {
        ReportOutcome::Reported {
            owner_id,
            pin_title,
            reports_count,
        } => (owner_id, pin_title, reports_count),
        ReportOutcome::AlreadyReported => {
            return Err(ApiError::Conflict("pin already reported".into()));
        }
        ReportOutcome::PinNotFound => return Err(ApiError::NotFound("pin not found".into())),
    };
    info!(pin_id, reporter = auth.user_id, reports_count, "Pin reported");

    if let Err(e) = state
        .fanout
        .pin_reported(owner_id, pin_id, &pin_title, reports_count)
        .await
    {
        warn!(pin_id, owner_id, "Report notification failed: {}", e);
    }
    Ok(StatusCode::CREATED)
}

/// POST /pins/{id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(pin_id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<StatusCode> {
    validation::non_empty("text", &req.text)?;

    let outcome = run_db(&state.db, move |db| db.add_comment(auth.user_id, pin_id, &req.text)).await?;
    match outcome {
        CommentOutcome::Created(_) => Ok(StatusCode::CREATED),
        CommentOutcome::PinNotFound => Err(ApiError::NotFound("pin not found".into())),
    }
}
