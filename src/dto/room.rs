use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::question_bank::Question,
    dto::{
        format_epoch_ms,
        validation::{validate_avatar, validate_category, validate_player_name},
    },
    state::{
        room::{
            Answer, Difficulty, GameMode, Player, PlayerId, QuestionPhase, Reveal, Room,
            RoomSettings, Standing,
        },
        state_machine::RoomStatus,
    },
};

fn default_game_mode() -> GameMode {
    GameMode::Classic
}

fn default_difficulty() -> Difficulty {
    Difficulty::Mixed
}

/// Game configuration chosen by the host at creation; echoed in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
pub struct RoomSettingsDto {
    /// Total players allowed, host included.
    #[validate(range(min = 2, max = 16))]
    pub max_players: u8,
    #[validate(range(min = 5, max = 120))]
    pub time_limit_seconds: u32,
    #[validate(range(min = 1, max = 50))]
    pub total_questions: u32,
    #[serde(default = "default_game_mode")]
    pub game_mode: GameMode,
    /// Question bank category, `any` for every category.
    #[validate(custom(function = "validate_category"))]
    pub category: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
}

impl From<RoomSettingsDto> for RoomSettings {
    fn from(value: RoomSettingsDto) -> Self {
        Self {
            max_players: value.max_players,
            time_limit_seconds: value.time_limit_seconds,
            total_questions: value.total_questions,
            game_mode: value.game_mode,
            category: value.category.trim().to_owned(),
            difficulty: value.difficulty,
        }
    }
}

impl From<&RoomSettings> for RoomSettingsDto {
    fn from(value: &RoomSettings) -> Self {
        Self {
            max_players: value.max_players,
            time_limit_seconds: value.time_limit_seconds,
            total_questions: value.total_questions,
            game_mode: value.game_mode,
            category: value.category.clone(),
            difficulty: value.difficulty,
        }
    }
}

/// Payload used by a host to open a new room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub host_name: String,
    #[validate(custom(function = "validate_avatar"))]
    pub avatar: String,
    #[validate(nested)]
    pub settings: RoomSettingsDto,
}

/// Payload used by a guest to enter a waiting room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    #[validate(custom(function = "validate_avatar"))]
    pub avatar: String,
}

/// Identifies the player performing a room action (leave, start, end, restart).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, Validate)]
pub struct PlayerActionRequest {
    pub player_id: PlayerId,
}

/// Answer for the current question; `selected_option = null` means the timer ran out.
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    pub player_id: PlayerId,
    /// Question the client believes is current; rejected when stale.
    #[serde(default)]
    pub question_index: Option<u32>,
    #[serde(default)]
    pub selected_option: Option<u8>,
    /// Advisory elapsed time observed by the client.
    #[serde(default)]
    pub client_elapsed_ms: Option<u64>,
}

/// Host request to close the current question.
#[skip_serializing_none]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, Validate)]
pub struct AdvanceRequest {
    pub player_id: PlayerId,
    /// Question the host believes is current; a stale index is rejected.
    #[serde(default)]
    pub question_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub is_host: bool,
    pub score: u32,
    pub has_answered: bool,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            avatar: player.avatar.clone(),
            is_host: player.is_host,
            score: player.score,
            has_answered: player.has_answered,
        }
    }
}

/// One player's result for a revealed question.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerResultView {
    pub player_id: PlayerId,
    /// `null` when the player never answered.
    pub selected_option: Option<u8>,
    pub correct: bool,
    pub points_awarded: u32,
    pub elapsed_ms: u64,
}

impl From<&Answer> for AnswerResultView {
    fn from(answer: &Answer) -> Self {
        Self {
            player_id: answer.player_id,
            selected_option: answer.selected_option,
            correct: answer.correct,
            points_awarded: answer.points_awarded,
            elapsed_ms: answer.elapsed_ms,
        }
    }
}

/// Correct option and per-player results of the question just closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RevealSummary {
    pub question_index: u32,
    pub question_id: String,
    pub correct_option: u8,
    pub results: Vec<AnswerResultView>,
}

impl From<&Reveal> for RevealSummary {
    fn from(reveal: &Reveal) -> Self {
        Self {
            question_index: reveal.question_index,
            question_id: reveal.question_id.clone(),
            correct_option: reveal.correct_option,
            results: reveal.results.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StandingView {
    /// 1-based rank; equal scores share a rank.
    pub rank: u32,
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub score: u32,
}

impl From<Standing> for StandingView {
    fn from(standing: Standing) -> Self {
        Self {
            rank: standing.rank,
            player_id: standing.player_id,
            name: standing.name,
            avatar: standing.avatar,
            score: standing.score,
        }
    }
}

/// Full authoritative room state. Clients re-fetch it after every change signal.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomSnapshot {
    pub code: String,
    pub status: RoomStatus,
    /// Increments on every mutation.
    pub version: u64,
    pub settings: RoomSettingsDto,
    pub current_question_index: u32,
    /// Set if and only if the room is active.
    pub question_start_time_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
    /// Derived sub-phase while active.
    pub question_phase: Option<QuestionPhase>,
    /// Server clock when the snapshot was taken.
    pub server_time_ms: u64,
    pub host_id: Option<PlayerId>,
    pub players: Vec<PlayerView>,
    pub last_reveal: Option<RevealSummary>,
    /// Present once the room is finished.
    pub final_standings: Option<Vec<StandingView>>,
}

impl RoomSnapshot {
    pub fn from_room(room: &Room, now_ms: u64) -> Self {
        let final_standings = (room.status == RoomStatus::Finished).then(|| {
            room.standings()
                .into_iter()
                .map(StandingView::from)
                .collect()
        });

        Self {
            code: room.code.clone(),
            status: room.status,
            version: room.version,
            settings: (&room.settings).into(),
            current_question_index: room.current_question_index,
            question_start_time_ms: room.question_start_time_ms,
            deadline_ms: room.deadline_ms(),
            question_phase: room.question_phase(now_ms),
            server_time_ms: now_ms,
            host_id: room.host_id(),
            players: room.players.values().map(PlayerView::from).collect(),
            last_reveal: room.last_reveal.as_ref().map(RevealSummary::from),
            final_standings,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerView> {
        self.players.iter().find(|player| player.id == id)
    }

    /// Every listed player answered the current question.
    pub fn all_answered(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|player| player.has_answered)
    }
}

/// Current question as shown to players; never carries the answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionView {
    pub question_index: u32,
    pub total_questions: u32,
    pub question_id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub time_limit_seconds: u32,
    pub question_start_time_ms: u64,
    pub deadline_ms: u64,
}

impl QuestionView {
    /// Project the active question of `room`; `None` unless active.
    pub fn from_room(room: &Room, question: &Question) -> Option<Self> {
        let start = room.question_start_time_ms?;
        Some(Self {
            question_index: room.current_question_index,
            total_questions: room.settings.total_questions,
            question_id: question.id.clone(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            time_limit_seconds: room.settings.time_limit_seconds,
            question_start_time_ms: start,
            deadline_ms: start.saturating_add(room.settings.time_limit_ms()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreateRoomResponse {
    pub code: String,
    /// Id of the host player.
    pub player_id: PlayerId,
    pub status: RoomStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    pub room: RoomSnapshot,
}

impl CreateRoomResponse {
    pub fn from_room(room: &Room, now_ms: u64) -> Self {
        Self {
            code: room.code.clone(),
            player_id: room.host_id().unwrap_or_default(),
            status: room.status,
            created_at: format_epoch_ms(room.created_at_ms),
            room: RoomSnapshot::from_room(room, now_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JoinRoomResponse {
    pub player_id: PlayerId,
    pub room: RoomSnapshot,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaveRoomResponse {
    pub left: bool,
    /// Player promoted to host when the host left.
    pub new_host_id: Option<PlayerId>,
    /// The last player left and the room was deleted.
    pub room_closed: bool,
}

/// Result of an answer submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub points: u32,
    /// Cumulative score after this answer.
    pub score: u32,
    /// Server-measured elapsed time used for scoring.
    pub elapsed_ms: u64,
}

/// Result of closing a question: the reveal plus either the next question or final standings.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvanceResponse {
    pub reveal: RevealSummary,
    pub finished: bool,
    pub next_question: Option<QuestionView>,
    pub final_standings: Option<Vec<StandingView>>,
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    fn request() -> CreateRoomRequest {
        serde_json::from_value(serde_json::json!({
            "host_name": "Ada",
            "avatar": "🦊",
            "settings": {
                "max_players": 4,
                "time_limit_seconds": 10,
                "total_questions": 2,
                "category": "any"
            }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let req = request();
        assert_eq!(req.settings.game_mode, GameMode::Classic);
        assert_eq!(req.settings.difficulty, Difficulty::Mixed);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        let mut req = request();
        req.settings.max_players = 1;
        assert!(req.validate().is_err());

        let mut req = request();
        req.settings.time_limit_seconds = 121;
        assert!(req.validate().is_err());

        let mut req = request();
        req.host_name = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_game_mode_fails_to_parse() {
        let parsed: Result<RoomSettingsDto, _> = serde_json::from_value(serde_json::json!({
            "max_players": 4,
            "time_limit_seconds": 10,
            "total_questions": 2,
            "category": "any",
            "game_mode": "battle_royale"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn snapshot_hides_inactive_timing() {
        let room = Room::new(
            "ABCDEF".into(),
            RoomSettingsDto {
                max_players: 4,
                time_limit_seconds: 10,
                total_questions: 2,
                game_mode: GameMode::Speed,
                category: "any".into(),
                difficulty: Difficulty::Easy,
            }
            .into(),
            "Ada".into(),
            "🦊".into(),
            0,
        );
        let json = serde_json::to_value(RoomSnapshot::from_room(&room, 5)).unwrap();
        assert_eq!(json["status"], "waiting");
        assert!(json.get("question_start_time_ms").is_none());
        assert!(json.get("question_phase").is_none());
        assert_eq!(json["host_id"], 1);
    }
}
