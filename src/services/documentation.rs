use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the trivia room service.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::current_question,
        crate::routes::rooms::start_game,
        crate::routes::rooms::submit_answer,
        crate::routes::rooms::advance,
        crate::routes::rooms::end_game,
        crate::routes::rooms::restart,
        crate::routes::sse::room_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::envelope::ApiErrorEnvelope,
            crate::dto::envelope::ApiErrorBody,
            crate::dto::envelope::ErrorCode,
            crate::dto::room::RoomSettingsDto,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::CreateRoomResponse,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::JoinRoomResponse,
            crate::dto::room::PlayerActionRequest,
            crate::dto::room::LeaveRoomResponse,
            crate::dto::room::SubmitAnswerRequest,
            crate::dto::room::AnswerOutcome,
            crate::dto::room::AdvanceRequest,
            crate::dto::room::AdvanceResponse,
            crate::dto::room::RoomSnapshot,
            crate::dto::room::PlayerView,
            crate::dto::room::QuestionView,
            crate::dto::room::RevealSummary,
            crate::dto::room::AnswerResultView,
            crate::dto::room::StandingView,
            crate::dto::sse::Handshake,
            crate::dto::sse::RoomChangedEvent,
            crate::dto::sse::RoomClosedEvent,
            crate::dto::sse::ChangeReason,
            crate::state::state_machine::RoomStatus,
            crate::state::room::GameMode,
            crate::state::room::Difficulty,
            crate::state::room::QuestionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room creation, membership and snapshots"),
        (name = "game", description = "Game progression driven by the host and players"),
        (name = "sse", description = "Server-sent room change streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_room_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in ["/rooms", "/rooms/{code}/answers", "/rooms/{code}/events", "/healthcheck"] {
            assert!(paths.iter().any(|p| p == expected), "missing {expected}");
        }
    }
}
