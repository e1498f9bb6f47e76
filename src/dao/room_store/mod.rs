pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{RoomEntity, RoomListItemEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the persistence layer holding rooms and their players.
///
/// Writes after creation go through [`RoomStore::replace_room`], a
/// compare-and-swap on [`RoomEntity::version`]: the write succeeds only if the
/// stored version still equals `expected_version`, otherwise it fails with
/// [`StorageError::VersionConflict`](crate::dao::storage::StorageError::VersionConflict).
pub trait RoomStore: Send + Sync {
    /// Insert a brand-new room; returns `false` when the code is already taken.
    fn insert_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_room(&self, code: &str) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    fn replace_room(
        &self,
        room: RoomEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_room(&self, code: &str) -> BoxFuture<'static, StorageResult<bool>>;
    fn list_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<RoomListItemEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
