//! In-process [`RoomApi`] calling the services directly.

use std::time::Duration;

use async_stream::stream;
use futures::future::BoxFuture;
use tokio::{
    sync::broadcast::error::RecvError,
    time::{MissedTickBehavior, interval},
};

use crate::{
    client::api::{ApiResult, ClientError, PushEvent, PushStream, RoomApi, decode_push_event},
    dto::{
        room::{
            AdvanceRequest, AdvanceResponse, AnswerOutcome, QuestionView, RoomSnapshot,
            SubmitAnswerRequest,
        },
        sse::{ChangeReason, RoomChangedEvent},
    },
    services::{progression, room_service, sse_service},
    state::SharedState,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Room API served from the same process, used by tests and embedded hosts.
#[derive(Clone)]
pub struct LocalRoomApi {
    state: SharedState,
    keep_alive: Duration,
}

impl LocalRoomApi {
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            keep_alive: KEEP_ALIVE_INTERVAL,
        }
    }

    /// Override how often an idle subscription emits [`PushEvent::KeepAlive`].
    pub fn with_keep_alive(mut self, every: Duration) -> Self {
        self.keep_alive = every;
        self
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl RoomApi for LocalRoomApi {
    fn get_room(&self, code: &str) -> BoxFuture<'static, ApiResult<RoomSnapshot>> {
        let state = self.state.clone();
        let code = code.to_owned();
        Box::pin(async move { Ok(room_service::get_room(&state, &code).await?) })
    }

    fn current_question(&self, code: &str) -> BoxFuture<'static, ApiResult<QuestionView>> {
        let state = self.state.clone();
        let code = code.to_owned();
        Box::pin(async move { Ok(room_service::current_question(&state, &code).await?) })
    }

    fn submit_answer(
        &self,
        code: &str,
        request: SubmitAnswerRequest,
    ) -> BoxFuture<'static, ApiResult<AnswerOutcome>> {
        let state = self.state.clone();
        let code = code.to_owned();
        Box::pin(async move { Ok(progression::submit_answer(&state, &code, request).await?) })
    }

    fn advance(
        &self,
        code: &str,
        request: AdvanceRequest,
    ) -> BoxFuture<'static, ApiResult<AdvanceResponse>> {
        let state = self.state.clone();
        let code = code.to_owned();
        Box::pin(async move { Ok(progression::advance(&state, &code, request).await?) })
    }

    fn subscribe(&self, code: &str) -> BoxFuture<'static, ApiResult<PushStream>> {
        let state = self.state.clone();
        let code = code.to_owned();
        let keep_alive = self.keep_alive;

        Box::pin(async move {
            let (mut receiver, handshake) = sse_service::subscribe_room(&state, &code).await?;
            let code = handshake.code.clone();

            let events = stream! {
                yield Ok(PushEvent::Subscribed(handshake));

                let mut ticker = interval(keep_alive);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;

                loop {
                    let received = tokio::select! {
                        _ = ticker.tick() => None,
                        received = receiver.recv() => Some(received),
                    };

                    match received {
                        None => {
                            yield Ok(PushEvent::KeepAlive);
                        }
                        Some(Ok(event)) => {
                            match decode_push_event(event.event.as_deref(), &event.data) {
                                Ok(Some(decoded)) => {
                                    yield Ok(decoded);
                                }
                                Ok(None) => {}
                                Err(err) => {
                                    yield Err(err);
                                }
                            }
                        }
                        Some(Err(RecvError::Lagged(_))) => {
                            yield Ok(PushEvent::Changed(RoomChangedEvent {
                                code: code.clone(),
                                version: 0,
                                reason: ChangeReason::Resync,
                            }));
                        }
                        Some(Err(RecvError::Closed)) => {
                            yield Err(ClientError::StreamClosed);
                            break;
                        }
                    }
                }
            };

            Ok(Box::pin(events) as PushStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        dto::{envelope::ErrorCode, room::JoinRoomRequest},
        state::{AppState, room::tests::room_with_guests},
    };

    async fn api() -> LocalRoomApi {
        let state = AppState::with_memory_store(AppConfig::default(), ManualClock::new(0)).await;
        state.insert_room(&room_with_guests(0)).await.unwrap();
        LocalRoomApi::new(state)
    }

    #[tokio::test]
    async fn subscription_starts_with_handshake_then_changes() {
        let api = api().await;
        let mut events = api.subscribe("ABCDEF").await.unwrap();

        match events.next().await {
            Some(Ok(PushEvent::Subscribed(handshake))) => assert_eq!(handshake.version, 0),
            other => panic!("expected handshake, got {other:?}"),
        }

        room_service::join_room(
            api.state(),
            "ABCDEF",
            JoinRoomRequest {
                name: "Guest".into(),
                avatar: "🐢".into(),
            },
        )
        .await
        .unwrap();

        match events.next().await {
            Some(Ok(PushEvent::Changed(changed))) => {
                assert_eq!(changed.version, 1);
                assert_eq!(changed.reason, ChangeReason::Joined);
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_room_ends_stream() {
        let api = api().await;
        let mut events = api.subscribe("ABCDEF").await.unwrap();
        events.next().await;

        room_service::leave_room(api.state(), "ABCDEF", 1).await.unwrap();
        assert!(matches!(events.next().await, Some(Ok(PushEvent::Closed(_)))));
        assert_eq!(events.next().await, Some(Err(ClientError::StreamClosed)));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn service_errors_keep_their_code() {
        let api = api().await;
        let err = api.get_room("ZZZZZZ").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
