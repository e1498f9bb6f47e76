use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{
        AnswerEntity, PlayerEntity, RevealEntity, RoomEntity, RoomListItemEntity,
        RoomSettingsEntity,
    },
    state::state_machine::RoomStatus,
};

/// Room as laid out in the `rooms` collection; the code doubles as `_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    code: String,
    status: RoomStatus,
    settings: RoomSettingsEntity,
    current_question_index: u32,
    question_start_time: Option<DateTime>,
    #[serde(default)]
    question_ids: Vec<String>,
    players: Vec<PlayerEntity>,
    #[serde(default)]
    answers: Vec<AnswerEntity>,
    last_reveal: Option<RevealEntity>,
    next_player_id: u32,
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
    finished_at: Option<DateTime>,
}

/// Projection used when listing rooms for the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomListDocument {
    #[serde(rename = "_id")]
    code: String,
    status: RoomStatus,
    updated_at: DateTime,
    finished_at: Option<DateTime>,
}

fn to_datetime(ms: u64) -> DateTime {
    DateTime::from_millis(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn from_datetime(value: DateTime) -> u64 {
    u64::try_from(value.timestamp_millis()).unwrap_or_default()
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            status: value.status,
            settings: value.settings,
            current_question_index: value.current_question_index,
            question_start_time: value.question_start_time_ms.map(to_datetime),
            question_ids: value.question_ids,
            players: value.players,
            answers: value.answers,
            last_reveal: value.last_reveal,
            next_player_id: value.next_player_id,
            version: version_to_bson(value.version),
            created_at: to_datetime(value.created_at_ms),
            updated_at: to_datetime(value.updated_at_ms),
            finished_at: value.finished_at_ms.map(to_datetime),
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            code: value.code,
            status: value.status,
            settings: value.settings,
            current_question_index: value.current_question_index,
            question_start_time_ms: value.question_start_time.map(from_datetime),
            question_ids: value.question_ids,
            players: value.players,
            answers: value.answers,
            last_reveal: value.last_reveal,
            next_player_id: value.next_player_id,
            version: u64::try_from(value.version).unwrap_or_default(),
            created_at_ms: from_datetime(value.created_at),
            updated_at_ms: from_datetime(value.updated_at),
            finished_at_ms: value.finished_at.map(from_datetime),
        }
    }
}

impl From<MongoRoomListDocument> for RoomListItemEntity {
    fn from(value: MongoRoomListDocument) -> Self {
        Self {
            code: value.code,
            status: value.status,
            updated_at_ms: from_datetime(value.updated_at),
            finished_at_ms: value.finished_at.map(from_datetime),
        }
    }
}

pub fn version_to_bson(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

pub fn doc_code(code: &str) -> Document {
    doc! {"_id": code}
}

/// Filter matching the room only while it still carries `version`.
pub fn doc_code_version(code: &str, version: u64) -> Document {
    doc! {"_id": code, "version": version_to_bson(version)}
}
