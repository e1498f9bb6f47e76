use serde::{Deserialize, Serialize};

use crate::state::{
    room::{Difficulty, GameMode},
    state_machine::RoomStatus,
};

/// Immutable game configuration stored alongside a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSettingsEntity {
    /// Upper bound on the number of players, host included.
    pub max_players: u8,
    /// Seconds each question stays open.
    pub time_limit_seconds: u32,
    /// Number of questions drawn when the game starts.
    pub total_questions: u32,
    /// Display-only game mode.
    pub game_mode: GameMode,
    /// Question bank category.
    pub category: String,
    /// Question bank difficulty.
    pub difficulty: Difficulty,
}

/// Player record persisted inside its room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Identifier unique within the room.
    pub id: u32,
    /// Display name validated at join time.
    pub name: String,
    /// Display avatar validated at join time.
    pub avatar: String,
    /// Whether this player drives the game.
    pub is_host: bool,
    /// Accumulated points.
    pub score: u32,
    /// Whether the player already answered the current question.
    pub has_answered: bool,
    /// Join timestamp (epoch milliseconds).
    pub joined_at_ms: u64,
}

/// One answer for one player and one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    pub question_index: u32,
    pub player_id: u32,
    /// `None` when the player never answered before the question closed.
    pub selected_option: Option<u8>,
    /// Server-measured elapsed time.
    pub elapsed_ms: u64,
    /// Advisory elapsed time reported by the client.
    pub client_elapsed_ms: Option<u64>,
    pub correct: bool,
    pub points_awarded: u32,
}

/// Results of a closed question kept until the next one is revealed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealEntity {
    pub question_index: u32,
    pub question_id: String,
    pub correct_option: u8,
    pub results: Vec<AnswerEntity>,
}

/// Aggregate room entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Short shareable code, primary key.
    pub code: String,
    pub status: RoomStatus,
    pub settings: RoomSettingsEntity,
    pub current_question_index: u32,
    /// Set if and only if the room is active.
    pub question_start_time_ms: Option<u64>,
    /// Question ids drawn from the bank when the game started.
    pub question_ids: Vec<String>,
    /// Players in join order.
    pub players: Vec<PlayerEntity>,
    /// Answers collected for the current question.
    pub answers: Vec<AnswerEntity>,
    pub last_reveal: Option<RevealEntity>,
    /// Next id handed out by a join; never reused.
    pub next_player_id: u32,
    /// Incremented on every successful write; used for compare-and-swap.
    pub version: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

/// Lightweight projection used by the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomListItemEntity {
    pub code: String,
    pub status: RoomStatus,
    pub updated_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

impl From<&RoomEntity> for RoomListItemEntity {
    fn from(entity: &RoomEntity) -> Self {
        Self {
            code: entity.code.clone(),
            status: entity.status,
            updated_at_ms: entity.updated_at_ms,
            finished_at_ms: entity.finished_at_ms,
        }
    }
}
