//! Room membership: creation, joining, leaving and read-only projections.

use rand::{Rng, rng};
use tracing::{debug, info};
use validator::Validate;

use crate::{
    dto::{
        room::{
            CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse,
            LeaveRoomResponse, QuestionView, RoomSnapshot,
        },
        sse::ChangeReason,
    },
    error::ServiceError,
    state::{
        SharedState,
        room::{PlayerId, Room, RoomSettings},
        state_machine::RoomStatus,
        transitions::mutate_with_broadcast,
    },
};

/// Characters used in room codes; ambiguous glyphs (0/O, 1/I) are left out.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Canonical form of a user-typed room code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Draw a random room code of `len` characters.
pub fn generate_code(len: usize) -> String {
    let mut rng = rng();
    (0..len.max(1))
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

pub(crate) fn validate_request(request: &impl Validate) -> Result<(), ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))
}

/// Open a room with the requester as host.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<CreateRoomResponse, ServiceError> {
    validate_request(&request)?;
    let CreateRoomRequest {
        host_name,
        avatar,
        settings,
    } = request;
    let settings: RoomSettings = settings.into();

    let available = state
        .question_bank()
        .available(&settings.category, settings.difficulty)
        .await?;
    if available < settings.total_questions as usize {
        return Err(ServiceError::InvalidInput(format!(
            "only {available} question(s) available for category `{}` ({}), {} requested",
            settings.category, settings.difficulty, settings.total_questions
        )));
    }

    let rooms = &state.config().rooms;
    let now = state.now_ms();
    for attempt in 1..=rooms.max_code_attempts.max(1) {
        let room = Room::new(
            generate_code(rooms.code_length),
            settings.clone(),
            host_name.trim().to_owned(),
            avatar.clone(),
            now,
        );

        if state.insert_room(&room).await? {
            info!(room = %room.code, max_players = room.settings.max_players, "room created");
            return Ok(CreateRoomResponse::from_room(&room, now));
        }
        debug!(room = %room.code, attempt, "room code collision; drawing another");
    }

    Err(ServiceError::CodeSpaceExhausted {
        attempts: rooms.max_code_attempts.max(1),
    })
}

/// Add a guest to a waiting room.
pub async fn join_room(
    state: &SharedState,
    code: &str,
    request: JoinRoomRequest,
) -> Result<JoinRoomResponse, ServiceError> {
    validate_request(&request)?;
    let code = normalize_code(code);
    let name = request.name.trim().to_owned();

    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Joined, |room, now| {
        if room.status != RoomStatus::Waiting {
            return Err(ServiceError::InvalidState(format!(
                "room `{}` already started",
                room.code
            )));
        }
        if room.is_full() {
            return Err(ServiceError::RoomFull {
                code: room.code.clone(),
                max_players: room.settings.max_players,
            });
        }
        Ok(room.add_player(name.clone(), request.avatar.clone(), now))
    })
    .await?;

    info!(room = %code, player_id = mutation.value, "player joined");
    Ok(JoinRoomResponse {
        player_id: mutation.value,
        room: RoomSnapshot::from_room(&mutation.room, state.now_ms()),
    })
}

/// Authoritative snapshot of a room.
pub async fn get_room(state: &SharedState, code: &str) -> Result<RoomSnapshot, ServiceError> {
    let room = state.load_room(&normalize_code(code)).await?;
    Ok(RoomSnapshot::from_room(&room, state.now_ms()))
}

/// Remove a player; promotes a new host or deletes the emptied room.
pub async fn leave_room(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<LeaveRoomResponse, ServiceError> {
    let code = normalize_code(code);

    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Left, |room, _| {
        room.remove_player(player_id)
            .map(|(_, promoted)| promoted)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("player {player_id} not in room `{}`", room.code))
            })
    })
    .await?;

    if let Some(host) = mutation.value {
        info!(room = %code, player_id, new_host = host, "host left; promoted next player");
    } else {
        info!(room = %code, player_id, "player left");
    }

    Ok(LeaveRoomResponse {
        left: true,
        new_host_id: mutation.value,
        room_closed: mutation.deleted,
    })
}

/// Question currently open in an active room, without its answer key.
pub async fn current_question(
    state: &SharedState,
    code: &str,
) -> Result<QuestionView, ServiceError> {
    let room = state.load_room(&normalize_code(code)).await?;
    let Some(question_id) = room.current_question_id() else {
        return Err(ServiceError::InvalidState(format!(
            "room `{}` has no open question",
            room.code
        )));
    };

    let question = state.question_bank().find(question_id).await?;
    QuestionView::from_room(&room, &question)
        .ok_or_else(|| ServiceError::Internal("active room without start time".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        dto::room::RoomSettingsDto,
        state::{
            AppState,
            room::{Difficulty, GameMode},
        },
    };

    fn create_request(max_players: u8) -> CreateRoomRequest {
        CreateRoomRequest {
            host_name: "Host".into(),
            avatar: "👾".into(),
            settings: RoomSettingsDto {
                max_players,
                time_limit_seconds: 10,
                total_questions: 2,
                game_mode: GameMode::Classic,
                category: "any".into(),
                difficulty: Difficulty::Mixed,
            },
        }
    }

    fn join(name: &str) -> JoinRoomRequest {
        JoinRoomRequest {
            name: name.into(),
            avatar: "🐢".into(),
        }
    }

    async fn state() -> SharedState {
        AppState::with_memory_store(AppConfig::default(), ManualClock::new(1_000)).await
    }

    #[test]
    fn codes_use_unambiguous_alphabet() {
        for _ in 0..100 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn create_then_join() {
        let state = state().await;
        let created = create_room(&state, create_request(4)).await.unwrap();
        assert_eq!(created.player_id, 1);
        assert_eq!(created.status, RoomStatus::Waiting);

        let joined = join_room(&state, &created.code.to_lowercase(), join("Guest"))
            .await
            .unwrap();
        assert_eq!(joined.player_id, 2);
        assert_eq!(joined.room.players.len(), 2);
        assert_eq!(joined.room.version, 1);
    }

    #[tokio::test]
    async fn create_rejects_unservable_question_count() {
        let state = state().await;
        let mut request = create_request(4);
        request.settings.category = "underwater_basket_weaving".into();
        assert!(matches!(
            create_room(&state, request).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn create_reports_exhausted_code_space() {
        let mut config = AppConfig::default();
        config.rooms.code_length = 1;
        config.rooms.max_code_attempts = 64;
        let state = AppState::with_memory_store(config, ManualClock::new(0)).await;

        let mut exhausted = false;
        for _ in 0..200 {
            match create_room(&state, create_request(2)).await {
                Ok(_) => continue,
                Err(ServiceError::CodeSpaceExhausted { attempts }) => {
                    assert_eq!(attempts, 64);
                    exhausted = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(exhausted);
    }

    #[tokio::test]
    async fn join_full_room_is_capacity_error() {
        let state = state().await;
        let created = create_room(&state, create_request(2)).await.unwrap();
        join_room(&state, &created.code, join("One")).await.unwrap();

        let err = join_room(&state, &created.code, join("Two")).await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomFull { max_players: 2, .. }));
    }

    #[tokio::test]
    async fn join_unknown_room_is_not_found() {
        let state = state().await;
        assert!(matches!(
            join_room(&state, "QQQQQQ", join("x")).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn join_validates_names() {
        let state = state().await;
        let created = create_room(&state, create_request(4)).await.unwrap();
        assert!(matches!(
            join_room(&state, &created.code, join("")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn last_player_leaving_closes_room() {
        let state = state().await;
        let created = create_room(&state, create_request(4)).await.unwrap();
        join_room(&state, &created.code, join("Guest")).await.unwrap();

        let left = leave_room(&state, &created.code, 1).await.unwrap();
        assert_eq!(left.new_host_id, Some(2));
        assert!(!left.room_closed);

        let left = leave_room(&state, &created.code, 2).await.unwrap();
        assert!(left.room_closed);
        assert!(matches!(
            get_room(&state, &created.code).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn waiting_room_has_no_question() {
        let state = state().await;
        let created = create_room(&state, create_request(4)).await.unwrap();
        assert!(matches!(
            current_question(&state, &created.code).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn degraded_state_rejects_reads() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            get_room(&state, "ABCDEF").await,
            Err(ServiceError::Degraded)
        ));
    }
}
