//! Process-local room store used for single-node deployments and tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use crate::dao::{
    models::{RoomEntity, RoomListItemEntity},
    room_store::RoomStore,
    storage::{StorageError, StorageResult},
};

/// [`RoomStore`] keeping every room in a concurrent map.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, RoomEntity>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, room: RoomEntity) -> bool {
        match self.rooms.entry(room.code.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(room);
                true
            }
        }
    }

    fn replace(&self, room: RoomEntity, expected_version: u64) -> StorageResult<()> {
        // The shard lock held by `get_mut` makes the check-and-write atomic.
        let Some(mut current) = self.rooms.get_mut(&room.code) else {
            return Err(StorageError::VersionConflict {
                code: room.code,
                expected: expected_version,
                actual: None,
            });
        };

        if current.version != expected_version {
            return Err(StorageError::VersionConflict {
                code: room.code,
                expected: expected_version,
                actual: Some(current.version),
            });
        }

        *current = room;
        Ok(())
    }
}

impl RoomStore for MemoryRoomStore {
    fn insert_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let inserted = self.insert(room);
        Box::pin(async move { Ok(inserted) })
    }

    fn find_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let room = self.rooms.get(code).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(room) })
    }

    fn replace_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.replace(room, expected_version);
        Box::pin(async move { result })
    }

    fn delete_room(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.rooms.remove(code).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<RoomListItemEntity>>> {
        let rooms = self
            .rooms
            .iter()
            .map(|entry| RoomListItemEntity::from(entry.value()))
            .collect();
        Box::pin(async move { Ok(rooms) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::RoomSettingsEntity,
        state::{
            room::{Difficulty, GameMode},
            state_machine::RoomStatus,
        },
    };

    fn room(code: &str, version: u64) -> RoomEntity {
        RoomEntity {
            code: code.into(),
            status: RoomStatus::Waiting,
            settings: RoomSettingsEntity {
                max_players: 4,
                time_limit_seconds: 10,
                total_questions: 2,
                game_mode: GameMode::Classic,
                category: "general".into(),
                difficulty: Difficulty::Mixed,
            },
            current_question_index: 0,
            question_start_time_ms: None,
            question_ids: Vec::new(),
            players: Vec::new(),
            answers: Vec::new(),
            last_reveal: None,
            next_player_id: 1,
            version,
            created_at_ms: 0,
            updated_at_ms: 0,
            finished_at_ms: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_taken_codes() {
        let store = MemoryRoomStore::new();
        assert!(store.insert_room(room("ABCDEF", 0)).await.unwrap());
        assert!(!store.insert_room(room("ABCDEF", 7)).await.unwrap());

        let stored = store.find_room("ABCDEF").await.unwrap().unwrap();
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn replace_is_a_compare_and_swap() {
        let store = MemoryRoomStore::new();
        store.insert_room(room("ABCDEF", 0)).await.unwrap();

        store.replace_room(room("ABCDEF", 1), 0).await.unwrap();

        let err = store.replace_room(room("ABCDEF", 1), 0).await.unwrap_err();
        match err {
            StorageError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_of_missing_room_conflicts() {
        let store = MemoryRoomStore::new();
        let err = store.replace_room(room("ZZZZZZ", 1), 0).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict { actual: None, .. }
        ));
    }

    #[tokio::test]
    async fn list_and_delete() {
        let store = MemoryRoomStore::new();
        store.insert_room(room("AAAAAA", 0)).await.unwrap();
        store.insert_room(room("BBBBBB", 0)).await.unwrap();

        assert_eq!(store.list_rooms().await.unwrap().len(), 2);
        assert!(store.delete_room("AAAAAA").await.unwrap());
        assert!(!store.delete_room("AAAAAA").await.unwrap());
        assert_eq!(store.list_rooms().await.unwrap().len(), 1);
    }
}
