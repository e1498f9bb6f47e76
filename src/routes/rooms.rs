use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        envelope::{ApiErrorEnvelope, Envelope},
        extract::ValidJson,
        room::{
            AdvanceRequest, AdvanceResponse, AnswerOutcome, CreateRoomRequest, CreateRoomResponse,
            JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse, PlayerActionRequest,
            QuestionView, RoomSnapshot, SubmitAnswerRequest,
        },
    },
    error::AppError,
    services::{progression, room_service},
    state::SharedState,
};

/// Routes covering the room lifecycle. Successful bodies are wrapped in
/// `{ "success": true, "data": ... }`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(get_room))
        .route("/rooms/{code}/join", post(join_room))
        .route("/rooms/{code}/leave", post(leave_room))
        .route("/rooms/{code}/question", get(current_question))
        .route("/rooms/{code}/start", post(start_game))
        .route("/rooms/{code}/answers", post(submit_answer))
        .route("/rooms/{code}/advance", post(advance))
        .route("/rooms/{code}/end", post(end_game))
        .route("/rooms/{code}/restart", post(restart))
}

/// Open a new room with the caller as host.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = CreateRoomResponse),
        (status = 400, description = "Invalid settings", body = ApiErrorEnvelope),
        (status = 503, description = "Storage unavailable", body = ApiErrorEnvelope)
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    ValidJson(payload): ValidJson<CreateRoomRequest>,
) -> Result<(StatusCode, Envelope<CreateRoomResponse>), AppError> {
    let created = room_service::create_room(&state, payload).await?;
    Ok((StatusCode::CREATED, Envelope(created)))
}

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code (case-insensitive)")),
    responses(
        (status = 200, description = "Authoritative room snapshot", body = RoomSnapshot),
        (status = 404, description = "Unknown room", body = ApiErrorEnvelope)
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Envelope<RoomSnapshot>, AppError> {
    Ok(Envelope(room_service::get_room(&state, &code).await?))
}

/// Join a waiting room as a guest.
#[utoipa::path(
    post,
    path = "/rooms/{code}/join",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinRoomResponse),
        (status = 404, description = "Unknown room", body = ApiErrorEnvelope),
        (status = 409, description = "Room full or already started", body = ApiErrorEnvelope)
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<JoinRoomRequest>,
) -> Result<Envelope<JoinRoomResponse>, AppError> {
    Ok(Envelope(room_service::join_room(&state, &code, payload).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{code}/leave",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    request_body = PlayerActionRequest,
    responses(
        (status = 200, description = "Player removed", body = LeaveRoomResponse),
        (status = 404, description = "Unknown room or player", body = ApiErrorEnvelope)
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<PlayerActionRequest>,
) -> Result<Envelope<LeaveRoomResponse>, AppError> {
    let left = room_service::leave_room(&state, &code, payload.player_id).await?;
    Ok(Envelope(left))
}

/// Question currently open, without its answer key.
#[utoipa::path(
    get,
    path = "/rooms/{code}/question",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code")),
    responses(
        (status = 200, description = "Current question", body = QuestionView),
        (status = 409, description = "Room is not active", body = ApiErrorEnvelope)
    )
)]
pub async fn current_question(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Envelope<QuestionView>, AppError> {
    Ok(Envelope(room_service::current_question(&state, &code).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{code}/start",
    tag = "game",
    params(("code" = String, Path, description = "Room code")),
    request_body = PlayerActionRequest,
    responses(
        (status = 200, description = "Game started; first question", body = QuestionView),
        (status = 403, description = "Caller is not the host", body = ApiErrorEnvelope),
        (status = 409, description = "Room is not waiting", body = ApiErrorEnvelope)
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<PlayerActionRequest>,
) -> Result<Envelope<QuestionView>, AppError> {
    let question = progression::start_game(&state, &code, payload.player_id).await?;
    Ok(Envelope(question))
}

/// Submit the caller's single answer for the current question.
#[utoipa::path(
    post,
    path = "/rooms/{code}/answers",
    tag = "game",
    params(("code" = String, Path, description = "Room code")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerOutcome),
        (status = 409, description = "Duplicate answer or stale question", body = ApiErrorEnvelope)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<SubmitAnswerRequest>,
) -> Result<Envelope<AnswerOutcome>, AppError> {
    Ok(Envelope(progression::submit_answer(&state, &code, payload).await?))
}

/// Close the current question and move on (or finish).
#[utoipa::path(
    post,
    path = "/rooms/{code}/advance",
    tag = "game",
    params(("code" = String, Path, description = "Room code")),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Reveal and next step", body = AdvanceResponse),
        (status = 403, description = "Caller is not the host", body = ApiErrorEnvelope),
        (status = 409, description = "Stale question index", body = ApiErrorEnvelope)
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<AdvanceRequest>,
) -> Result<Envelope<AdvanceResponse>, AppError> {
    Ok(Envelope(progression::advance(&state, &code, payload).await?))
}

#[utoipa::path(
    post,
    path = "/rooms/{code}/end",
    tag = "game",
    params(("code" = String, Path, description = "Room code")),
    request_body = PlayerActionRequest,
    responses(
        (status = 200, description = "Game ended early", body = AdvanceResponse),
        (status = 403, description = "Caller is not the host", body = ApiErrorEnvelope)
    )
)]
pub async fn end_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<PlayerActionRequest>,
) -> Result<Envelope<AdvanceResponse>, AppError> {
    let ended = progression::end_game(&state, &code, payload.player_id).await?;
    Ok(Envelope(ended))
}

#[utoipa::path(
    post,
    path = "/rooms/{code}/restart",
    tag = "game",
    params(("code" = String, Path, description = "Room code")),
    request_body = PlayerActionRequest,
    responses(
        (status = 200, description = "Room back in the lobby", body = RoomSnapshot),
        (status = 409, description = "Room has not finished", body = ApiErrorEnvelope)
    )
)]
pub async fn restart(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    ValidJson(payload): ValidJson<PlayerActionRequest>,
) -> Result<Envelope<RoomSnapshot>, AppError> {
    let room = progression::restart(&state, &code, payload.player_id).await?;
    Ok(Envelope(room))
}
