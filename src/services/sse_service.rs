use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{
        ChangeReason, EVENT_ROOM_CHANGED, EVENT_SUBSCRIBED, Handshake, RoomChangedEvent,
        ServerEvent,
    },
    error::ServiceError,
    services::room_service::normalize_code,
    state::SharedState,
};

/// Open a subscription to a room's change stream.
///
/// The receiver is registered before the room is read so that no mutation
/// committed after the handshake version can be missed.
pub async fn subscribe_room(
    state: &SharedState,
    code: &str,
) -> Result<(broadcast::Receiver<ServerEvent>, Handshake), ServiceError> {
    let code = normalize_code(code);
    let receiver = state.hubs().subscribe(&code);
    let room = match state.load_room(&code).await {
        Ok(room) => room,
        Err(err) => {
            drop(receiver);
            state.hubs().prune_idle();
            return Err(err);
        }
    };

    let handshake = Handshake {
        code,
        version: room.version,
        degraded: state.is_degraded(),
    };
    Ok((receiver, handshake))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn resync_event(code: &str) -> Option<ServerEvent> {
    ServerEvent::json(
        Some(EVENT_ROOM_CHANGED.to_string()),
        &RoomChangedEvent {
            code: code.to_owned(),
            version: 0,
            reason: ChangeReason::Resync,
        },
    )
    .ok()
}

/// Convert a room subscription into an SSE response. The handshake goes out
/// first; a lagging subscriber receives a single resync notice.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    handshake: Handshake,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let code = handshake.code.clone();
        if let Ok(hello) = ServerEvent::json(Some(EVENT_SUBSCRIBED.to_string()), &handshake) {
            if tx.send(Ok(to_event(hello))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    let payload = match recv_result {
                        Ok(payload) => payload,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(room = %code, skipped, "SSE subscriber lagged; asking for resync");
                            match resync_event(&code) {
                                Some(event) => event,
                                None => continue,
                            }
                        }
                    };

                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!(room = %code, "room SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        services::sse_events::broadcast_room_changed,
        state::{AppState, room::tests::room_with_guests},
    };

    #[tokio::test]
    async fn handshake_carries_current_version() {
        let state = AppState::with_memory_store(AppConfig::default(), ManualClock::new(0)).await;
        state.insert_room(&room_with_guests(1)).await.unwrap();

        let (mut receiver, handshake) = subscribe_room(&state, "abcdef").await.unwrap();
        assert_eq!(handshake.code, "ABCDEF");
        assert_eq!(handshake.version, 0);
        assert!(!handshake.degraded);

        broadcast_room_changed(&state, "ABCDEF", 1, ChangeReason::Joined);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_ROOM_CHANGED));
        let parsed: RoomChangedEvent = serde_json::from_str(&event.data).unwrap();
        assert_eq!(parsed.version, 1);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let state = AppState::with_memory_store(AppConfig::default(), ManualClock::new(0)).await;
        assert!(matches!(
            subscribe_room(&state, "NOPE22").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn resync_notice_uses_version_zero() {
        let event = resync_event("ABCDEF").unwrap();
        let parsed: RoomChangedEvent = serde_json::from_str(&event.data).unwrap();
        assert_eq!(parsed.reason, ChangeReason::Resync);
        assert_eq!(parsed.version, 0);
    }
}
