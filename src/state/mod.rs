pub mod room;
mod sse;
pub mod state_machine;
pub mod transitions;

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::timeout;
use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    dao::{
        models::RoomEntity,
        question_bank::{QuestionBank, StaticQuestionBank},
        room_store::{RoomStore, memory::MemoryRoomStore},
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    state::room::Room,
};

pub use self::sse::{RoomHubs, SseHub};
pub use self::state_machine::{ApplyError, InvalidTransition, Plan, PlanId};

pub type SharedState = Arc<AppState>;

/// Result of a committed room mutation.
#[derive(Debug)]
pub struct Mutation<T> {
    /// Value produced by the mutation closure.
    pub value: T,
    /// Room as written (or as it was when deleted).
    pub room: Room,
    /// The mutation removed the last player and the room was deleted.
    pub deleted: bool,
}

/// Central application state: storage handle, collaborators and per-room plumbing.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    question_bank: Arc<dyn QuestionBank>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
    hubs: RoomHubs,
    room_gates: DashMap<String, Arc<Mutex<()>>>,
    degraded: watch::Sender<bool>,
    mutation_timeout: Duration,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let bank = Arc::new(StaticQuestionBank::new(config.questions.0.clone()));
        Self::with_parts(config, Arc::new(SystemClock), bank)
    }

    /// Build the state from explicit collaborators.
    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        question_bank: Arc<dyn QuestionBank>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            room_store: RwLock::new(None),
            question_bank,
            clock,
            hubs: RoomHubs::new(config.rooms.sse_capacity),
            room_gates: DashMap::new(),
            degraded: degraded_tx,
            mutation_timeout: config.rooms.mutation_timeout(),
            config,
        })
    }

    /// Ready-to-use state backed by the in-memory store.
    pub async fn with_memory_store(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let bank = Arc::new(StaticQuestionBank::new(config.questions.0.clone()));
        let state = Self::with_parts(config, clock, bank);
        state
            .set_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn question_bank(&self) -> &Arc<dyn QuestionBank> {
        &self.question_bank
    }

    /// Current wall-clock time in epoch milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Per-room broadcast hubs feeding the SSE streams.
    pub fn hubs(&self) -> &RoomHubs {
        &self.hubs
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn set_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Store handle, or [`ServiceError::Degraded`] while storage is unhealthy.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Run a store call under the configured timeout.
    pub async fn bounded<T, Fut>(&self, call: Fut) -> Result<T, ServiceError>
    where
        Fut: Future<Output = StorageResult<T>>,
    {
        match timeout(self.mutation_timeout, call).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout),
        }
    }

    /// Read the authoritative room record.
    pub async fn load_room(&self, code: &str) -> Result<Room, ServiceError> {
        let store = self.require_room_store().await?;
        self.bounded(store.find_room(code))
            .await?
            .map(Room::from)
            .ok_or_else(|| room_not_found(code))
    }

    /// Persist a brand-new room; `false` when the code is already taken.
    pub async fn insert_room(&self, room: &Room) -> Result<bool, ServiceError> {
        let store = self.require_room_store().await?;
        self.bounded(store.insert_room(RoomEntity::from(room))).await
    }

    /// Apply `work` to the room atomically.
    ///
    /// Mutations of one room are serialised by a per-room gate, and the write
    /// is a compare-and-swap on the room version. On a lost swap the room is
    /// re-read and `work` re-applied, so `work` must only touch the room.
    /// When `work` fails nothing is written.
    pub async fn mutate_room<T, F>(&self, code: &str, mut work: F) -> Result<Mutation<T>, ServiceError>
    where
        F: FnMut(&mut Room, u64) -> Result<T, ServiceError>,
    {
        let store = self.require_room_store().await?;
        let gate = self.room_gate(code);
        let guard = gate.lock().await;
        let attempts = self.config.rooms.max_mutation_attempts.max(1);

        for attempt in 1..=attempts {
            let Some(entity) = self.bounded(store.find_room(code)).await? else {
                drop(guard);
                drop(gate);
                self.release_gate(code);
                return Err(room_not_found(code));
            };

            let mut room = Room::from(entity);
            let expected = room.version;
            let now = self.now_ms();
            let value = work(&mut room, now)?;
            room.version = expected + 1;
            room.updated_at_ms = now;

            if room.players.is_empty() {
                self.bounded(store.delete_room(code)).await?;
                drop(guard);
                drop(gate);
                self.release_gate(code);
                return Ok(Mutation {
                    value,
                    room,
                    deleted: true,
                });
            }

            let write = store.replace_room(RoomEntity::from(&room), expected);
            match timeout(self.mutation_timeout, write).await {
                Ok(Ok(())) => {
                    return Ok(Mutation {
                        value,
                        room,
                        deleted: false,
                    });
                }
                Ok(Err(StorageError::VersionConflict { actual, .. })) => {
                    debug!(
                        room = %code,
                        attempt,
                        expected,
                        actual = ?actual,
                        "room changed concurrently; retrying mutation"
                    );
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => return Err(ServiceError::Timeout),
            }
        }

        Err(ServiceError::Contended(code.to_owned()))
    }

    /// Delete the room if `should_delete` still holds under the room gate.
    pub async fn delete_room_if<F>(&self, code: &str, should_delete: F) -> Result<bool, ServiceError>
    where
        F: FnOnce(&Room, u64) -> bool,
    {
        let store = self.require_room_store().await?;
        let gate = self.room_gate(code);
        let guard = gate.lock().await;

        let expired = match self.bounded(store.find_room(code)).await? {
            Some(entity) => should_delete(&Room::from(entity), self.now_ms()),
            None => false,
        };
        let deleted = expired && self.bounded(store.delete_room(code)).await?;

        drop(guard);
        drop(gate);
        self.release_gate(code);
        Ok(deleted)
    }

    /// Drop per-room resources once a room is gone.
    pub fn forget_room(&self, code: &str) {
        self.hubs.remove(code);
        self.release_gate(code);
    }

    fn room_gate(&self, code: &str) -> Arc<Mutex<()>> {
        self.room_gates
            .entry(code.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_gate(&self, code: &str) {
        self.room_gates
            .remove_if(code, |_, gate| Arc::strong_count(gate) == 1);
    }
}

fn room_not_found(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("room `{code}` not found"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        clock::ManualClock,
        state::room::{Room, tests::settings},
    };

    async fn state_with_room() -> SharedState {
        let state = AppState::with_memory_store(AppConfig::default(), ManualClock::new(1_000)).await;
        let room = Room::new("ABCDEF".into(), settings(4, 1), "h".into(), "a".into(), 0);
        assert!(state.insert_room(&room).await.unwrap());
        state
    }

    #[tokio::test]
    async fn starts_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());
        assert!(matches!(
            state.load_room("ABCDEF").await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn mutation_bumps_version_and_stamps_time() {
        let state = state_with_room().await;
        let mutation = state
            .mutate_room("ABCDEF", |room, now| {
                Ok(room.add_player("g".into(), "b".into(), now))
            })
            .await
            .unwrap();

        assert_eq!(mutation.value, 2);
        let stored = state.load_room("ABCDEF").await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.updated_at_ms, 1_000);
        assert_eq!(stored.players.len(), 2);
    }

    #[tokio::test]
    async fn failed_mutation_writes_nothing() {
        let state = state_with_room().await;
        let err = state
            .mutate_room("ABCDEF", |room, now| -> Result<(), ServiceError> {
                room.add_player("g".into(), "b".into(), now);
                Err(ServiceError::InvalidState("nope".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        let stored = state.load_room("ABCDEF").await.unwrap();
        assert_eq!(stored.version, 0);
        assert_eq!(stored.players.len(), 1);
    }

    #[tokio::test]
    async fn emptied_room_is_deleted() {
        let state = state_with_room().await;
        let mutation = state
            .mutate_room("ABCDEF", |room, _| Ok(room.remove_player(1).is_some()))
            .await
            .unwrap();

        assert!(mutation.deleted);
        assert!(matches!(
            state.load_room("ABCDEF").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(state.room_gates.is_empty());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = state_with_room().await;
        let err = state
            .mutate_room("ZZZZZZ", |_, _| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(!state.room_gates.contains_key("ZZZZZZ"));
    }

    #[tokio::test]
    async fn lost_swaps_are_retried_transparently() {
        let state = state_with_room().await;
        let store = state.room_store().await.unwrap();
        let calls = AtomicU32::new(0);

        let mutation = state
            .mutate_room("ABCDEF", |room, now| {
                // Simulate a writer in another process winning the first swap.
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let mut rival = RoomEntity::from(&*room);
                    rival.version += 1;
                    futures::executor::block_on(store.replace_room(rival, room.version))
                        .unwrap();
                }
                Ok(room.add_player("g".into(), "b".into(), now))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(mutation.room.version, 2);
        assert_eq!(state.load_room("ABCDEF").await.unwrap().version, 2);
    }
}
