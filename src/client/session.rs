//! Per-player mirror of a room: cached snapshot, current question and the
//! local answer, with the client-side phase derived on demand.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    client::{
        api::{ClientError, RoomApi},
        countdown::{remaining_ms, remaining_seconds},
        retry::{RetryPolicy, retry_transient},
    },
    dto::{
        envelope::ErrorCode,
        room::{AdvanceRequest, AdvanceResponse, AnswerOutcome, QuestionView, RoomSnapshot, SubmitAnswerRequest},
    },
    state::{room::PlayerId, state_machine::RoomStatus},
};

/// Phase shown by the client UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Lobby,
    Playing,
    Answered,
    Revealing,
    Finished,
}

/// Answer given by this client for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAnswer {
    pub question_index: u32,
    pub selected_option: Option<u8>,
    /// `None` when the server reported the question as already answered.
    pub outcome: Option<AnswerOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Accepted(AnswerOutcome),
    /// The server already holds an answer from this player; nothing was resubmitted.
    AlreadyAnswered,
    /// The question moved on; local state was refreshed instead.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Advanced(Box<AdvanceResponse>),
    /// Someone else advanced first; local state was refreshed.
    Absorbed,
}

/// Failures a session surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The room expired or was closed; the player should be sent back to the entry screen.
    #[error("room no longer exists")]
    RoomGone,
    #[error("request rejected: {message}")]
    Rejected { code: ErrorCode, message: String },
    #[error(transparent)]
    Transport(ClientError),
    #[error("session stopped")]
    Stopped,
}

impl From<ClientError> for SessionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Api {
                code: ErrorCode::NotFound,
                ..
            } => SessionError::RoomGone,
            ClientError::Api { code, message } if !code.is_transient() => {
                SessionError::Rejected { code, message }
            }
            other => SessionError::Transport(other),
        }
    }
}

/// Client session state for one player in one room.
pub struct SessionSync {
    api: Arc<dyn RoomApi>,
    code: String,
    player_id: PlayerId,
    retry: RetryPolicy,
    snapshot: Option<RoomSnapshot>,
    question: Option<QuestionView>,
    local_answer: Option<LocalAnswer>,
}

impl SessionSync {
    pub fn new(api: Arc<dyn RoomApi>, code: impl Into<String>, player_id: PlayerId) -> Self {
        Self {
            api,
            code: code.into().trim().to_ascii_uppercase(),
            player_id,
            retry: RetryPolicy::default(),
            snapshot: None,
            question: None,
            local_answer: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn question(&self) -> Option<&QuestionView> {
        self.question.as_ref()
    }

    pub fn local_answer(&self) -> Option<&LocalAnswer> {
        self.local_answer.as_ref()
    }

    /// Re-read the room, retrying transient failures.
    pub async fn resync(&mut self) -> Result<(), SessionError> {
        let api = Arc::clone(&self.api);
        let code = self.code.clone();
        let snapshot = retry_transient(self.retry, || api.get_room(&code)).await?;
        self.apply_snapshot(snapshot).await
    }

    /// Adopt `snapshot`, fetching the question payload when a new question opened.
    /// Snapshots older than the cached one are ignored.
    pub async fn apply_snapshot(&mut self, snapshot: RoomSnapshot) -> Result<(), SessionError> {
        if let Some(current) = &self.snapshot {
            if snapshot.version < current.version {
                debug!(room = %self.code, stale = snapshot.version, current = current.version, "ignoring stale snapshot");
                return Ok(());
            }
        }

        match snapshot.status {
            RoomStatus::Active => {
                let changed = self.question.as_ref().is_none_or(|question| {
                    question.question_index != snapshot.current_question_index
                        || Some(question.question_start_time_ms) != snapshot.question_start_time_ms
                });
                if changed {
                    let api = Arc::clone(&self.api);
                    let code = self.code.clone();
                    match retry_transient(self.retry, || api.current_question(&code)).await {
                        Ok(question) => {
                            debug!(room = %self.code, index = question.question_index, "new question");
                            self.question = Some(question);
                            self.local_answer = None;
                        }
                        Err(err) if err.code() == ErrorCode::State => {
                            debug!(room = %self.code, "room left the question before it was fetched");
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
            RoomStatus::Waiting => {
                self.question = None;
                self.local_answer = None;
            }
            RoomStatus::Finished => {}
        }

        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn answered_current(&self, snapshot: &RoomSnapshot) -> bool {
        let local = self
            .local_answer
            .is_some_and(|answer| answer.question_index == snapshot.current_question_index);
        let remote = snapshot
            .player(self.player_id)
            .is_some_and(|player| player.has_answered);
        local || remote
    }

    fn question_closed(snapshot: &RoomSnapshot, now_ms: u64) -> bool {
        snapshot.all_answered() || snapshot.deadline_ms.is_some_and(|deadline| now_ms >= deadline)
    }

    pub fn phase_at(&self, now_ms: u64) -> ClientPhase {
        let Some(snapshot) = &self.snapshot else {
            return ClientPhase::Lobby;
        };

        match snapshot.status {
            RoomStatus::Waiting => ClientPhase::Lobby,
            RoomStatus::Finished => ClientPhase::Finished,
            RoomStatus::Active if Self::question_closed(snapshot, now_ms) => ClientPhase::Revealing,
            RoomStatus::Active if self.answered_current(snapshot) => ClientPhase::Answered,
            RoomStatus::Active => ClientPhase::Playing,
        }
    }

    /// Milliseconds left on the current question, `None` outside a question.
    pub fn countdown_at(&self, now_ms: u64) -> Option<u64> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.status != RoomStatus::Active {
            return None;
        }
        snapshot.deadline_ms.map(|deadline| remaining_ms(deadline, now_ms))
    }

    /// Whole seconds shown on the countdown, `None` outside a question.
    pub fn countdown_seconds_at(&self, now_ms: u64) -> Option<u64> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.status != RoomStatus::Active {
            return None;
        }
        snapshot.deadline_ms.map(|deadline| remaining_seconds(deadline, now_ms))
    }

    /// Host may close the question once everyone answered or time ran out.
    pub fn can_advance_at(&self, now_ms: u64) -> bool {
        self.snapshot.as_ref().is_some_and(|snapshot| {
            snapshot.status == RoomStatus::Active
                && snapshot.host_id == Some(self.player_id)
                && Self::question_closed(snapshot, now_ms)
        })
    }

    /// Submit once for the current question. Never retried.
    pub async fn submit_answer(
        &mut self,
        selected_option: Option<u8>,
        now_ms: u64,
    ) -> Result<SubmitResult, SessionError> {
        if self.snapshot.is_none() {
            self.resync().await?;
        }
        let (question_index, started) = match &self.snapshot {
            Some(snapshot) => (snapshot.current_question_index, snapshot.question_start_time_ms),
            None => return Err(SessionError::Stopped),
        };
        if self
            .local_answer
            .is_some_and(|answer| answer.question_index == question_index)
        {
            return Ok(SubmitResult::AlreadyAnswered);
        }

        let request = SubmitAnswerRequest {
            player_id: self.player_id,
            question_index: Some(question_index),
            selected_option,
            client_elapsed_ms: started.map(|start| now_ms.saturating_sub(start)),
        };

        match self.api.submit_answer(&self.code, request).await {
            Ok(outcome) => {
                self.local_answer = Some(LocalAnswer {
                    question_index,
                    selected_option,
                    outcome: Some(outcome),
                });
                Ok(SubmitResult::Accepted(outcome))
            }
            Err(err) => match err.code() {
                ErrorCode::Conflict => {
                    info!(room = %self.code, player_id = self.player_id, "answer already recorded");
                    self.local_answer = Some(LocalAnswer {
                        question_index,
                        selected_option,
                        outcome: None,
                    });
                    Ok(SubmitResult::AlreadyAnswered)
                }
                ErrorCode::State => {
                    debug!(room = %self.code, error = %err, "answer rejected as stale; resyncing");
                    self.resync().await?;
                    Ok(SubmitResult::Stale)
                }
                _ => Err(err.into()),
            },
        }
    }

    /// Close the current question as host. A lost race is absorbed silently.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome, SessionError> {
        let question_index = self
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.current_question_index);
        let request = AdvanceRequest {
            player_id: self.player_id,
            question_index,
        };

        match self.api.advance(&self.code, request).await {
            Ok(response) => {
                if let Err(err) = self.resync().await {
                    warn!(room = %self.code, error = %err, "advanced but could not refresh the room");
                }
                Ok(AdvanceOutcome::Advanced(Box::new(response)))
            }
            Err(err) if matches!(err.code(), ErrorCode::State | ErrorCode::Conflict) => {
                debug!(room = %self.code, error = %err, "advance absorbed; state already moved on");
                self.resync().await?;
                Ok(AdvanceOutcome::Absorbed)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        client::{
            api::{ApiResult, PushStream},
            local::LocalRoomApi,
        },
        clock::ManualClock,
        config::AppConfig,
        services::progression,
        state::{AppState, SharedState, room::tests::room_with_guests},
    };

    struct Fixture {
        state: SharedState,
        clock: Arc<ManualClock>,
        api: Arc<dyn RoomApi>,
    }

    impl Fixture {
        async fn new() -> Self {
            let clock = ManualClock::new(1_000);
            let state = AppState::with_memory_store(AppConfig::default(), clock.clone()).await;
            state.insert_room(&room_with_guests(1)).await.unwrap();
            let api: Arc<dyn RoomApi> = Arc::new(LocalRoomApi::new(state.clone()));
            Self { state, clock, api }
        }

        fn session(&self, player_id: PlayerId) -> SessionSync {
            SessionSync::new(self.api.clone(), "abcdef", player_id)
        }

        async fn start(&self) {
            progression::start_game(&self.state, "ABCDEF", 1).await.unwrap();
        }

        fn now(&self) -> u64 {
            self.state.now_ms()
        }
    }

    #[tokio::test]
    async fn lobby_then_playing_with_question() {
        let f = Fixture::new().await;
        let mut guest = f.session(2);
        guest.resync().await.unwrap();
        assert_eq!(guest.phase_at(f.now()), ClientPhase::Lobby);
        assert!(guest.question().is_none());

        f.start().await;
        guest.resync().await.unwrap();
        assert_eq!(guest.phase_at(f.now()), ClientPhase::Playing);
        assert_eq!(guest.question().map(|q| q.question_index), Some(0));
        assert_eq!(guest.countdown_at(f.now()), Some(10_000));
        assert!(!guest.can_advance_at(f.now()));
    }

    #[tokio::test]
    async fn countdown_is_a_pure_projection() {
        let f = Fixture::new().await;
        f.start().await;
        let mut guest = f.session(2);
        guest.resync().await.unwrap();
        let now = f.now();
        assert_eq!(guest.countdown_at(now + 2_500), Some(7_500));
        assert_eq!(guest.countdown_seconds_at(now + 2_500), Some(8));
        assert_eq!(guest.countdown_seconds_at(now + 9_999), Some(1));
        assert_eq!(guest.countdown_at(now + 60_000), Some(0));
        assert_eq!(guest.phase_at(now + 10_000), ClientPhase::Revealing);
    }

    #[tokio::test]
    async fn duplicate_submission_forces_answered_without_resubmitting() {
        let f = Fixture::new().await;
        f.start().await;
        let mut first = f.session(2);
        let mut second = f.session(2);
        first.resync().await.unwrap();
        second.resync().await.unwrap();

        assert!(matches!(
            first.submit_answer(Some(0), f.now()).await.unwrap(),
            SubmitResult::Accepted(_)
        ));
        assert_eq!(
            second.submit_answer(Some(1), f.now()).await.unwrap(),
            SubmitResult::AlreadyAnswered
        );
        assert_eq!(second.phase_at(f.now()), ClientPhase::Answered);
        assert_eq!(
            second.submit_answer(Some(2), f.now()).await.unwrap(),
            SubmitResult::AlreadyAnswered
        );
    }

    #[tokio::test]
    async fn stale_submission_resyncs() {
        let f = Fixture::new().await;
        f.start().await;
        let mut guest = f.session(2);
        guest.resync().await.unwrap();

        progression::end_game(&f.state, "ABCDEF", 1).await.unwrap();
        assert_eq!(
            guest.submit_answer(Some(0), f.now()).await.unwrap(),
            SubmitResult::Stale
        );
        assert_eq!(guest.phase_at(f.now()), ClientPhase::Finished);
    }

    #[tokio::test]
    async fn second_advance_is_absorbed() {
        let f = Fixture::new().await;
        f.start().await;
        let mut host_a = f.session(1);
        let mut host_b = f.session(1);
        host_a.resync().await.unwrap();
        host_b.resync().await.unwrap();
        f.clock.advance(Duration::from_secs(10));
        assert!(host_a.can_advance_at(f.now()));

        assert!(matches!(
            host_a.advance().await.unwrap(),
            AdvanceOutcome::Advanced(_)
        ));
        assert_eq!(host_b.advance().await.unwrap(), AdvanceOutcome::Absorbed);
        assert_eq!(host_b.question().map(|q| q.question_index), Some(1));
        assert_eq!(host_b.phase_at(f.now()), ClientPhase::Playing);
    }

    /// Delegates to the local api, but reads fail once `reads_down` is set.
    struct FlakyReads {
        inner: LocalRoomApi,
        reads_down: Arc<AtomicBool>,
    }

    impl FlakyReads {
        fn unavailable<T: Send + 'static>() -> BoxFuture<'static, ApiResult<T>> {
            Box::pin(async { Err(ClientError::Transport("connection reset".into())) })
        }
    }

    impl RoomApi for FlakyReads {
        fn get_room(&self, code: &str) -> BoxFuture<'static, ApiResult<RoomSnapshot>> {
            if self.reads_down.load(Ordering::SeqCst) {
                return Self::unavailable();
            }
            self.inner.get_room(code)
        }

        fn current_question(&self, code: &str) -> BoxFuture<'static, ApiResult<QuestionView>> {
            if self.reads_down.load(Ordering::SeqCst) {
                return Self::unavailable();
            }
            self.inner.current_question(code)
        }

        fn submit_answer(
            &self,
            code: &str,
            request: SubmitAnswerRequest,
        ) -> BoxFuture<'static, ApiResult<AnswerOutcome>> {
            self.inner.submit_answer(code, request)
        }

        fn advance(
            &self,
            code: &str,
            request: AdvanceRequest,
        ) -> BoxFuture<'static, ApiResult<AdvanceResponse>> {
            self.reads_down.store(true, Ordering::SeqCst);
            self.inner.advance(code, request)
        }

        fn subscribe(&self, code: &str) -> BoxFuture<'static, ApiResult<PushStream>> {
            self.inner.subscribe(code)
        }
    }

    #[tokio::test]
    async fn advance_survives_a_failed_refresh() {
        let f = Fixture::new().await;
        f.start().await;
        let api = Arc::new(FlakyReads {
            inner: LocalRoomApi::new(f.state.clone()),
            reads_down: Arc::new(AtomicBool::new(false)),
        });
        let mut host = SessionSync::new(api.clone(), "abcdef", 1).with_retry(RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
        host.resync().await.unwrap();

        let outcome = host.advance().await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Advanced(_)));
        assert!(api.reads_down.load(Ordering::SeqCst));
        let room = f.state.load_room("ABCDEF").await.unwrap();
        assert_eq!(room.current_question_index, 1);
    }

    #[tokio::test]
    async fn guest_advance_is_surfaced() {
        let f = Fixture::new().await;
        f.start().await;
        let mut guest = f.session(2);
        guest.resync().await.unwrap();
        assert!(matches!(
            guest.advance().await,
            Err(SessionError::Rejected {
                code: ErrorCode::Authorization,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn vanished_room_is_reported_as_gone() {
        let f = Fixture::new().await;
        let mut guest = f.session(2);
        guest.resync().await.unwrap();
        crate::services::room_service::leave_room(&f.state, "ABCDEF", 2).await.unwrap();
        crate::services::room_service::leave_room(&f.state, "ABCDEF", 1).await.unwrap();
        assert_eq!(guest.resync().await, Err(SessionError::RoomGone));
    }
}
