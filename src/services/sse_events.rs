use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{
        ChangeReason, EVENT_ROOM_CHANGED, EVENT_ROOM_CLOSED, RoomChangedEvent, RoomClosedEvent,
        ServerEvent,
    },
    state::SharedState,
};

/// Tell a room's subscribers that a new version is available.
pub fn broadcast_room_changed(state: &SharedState, code: &str, version: u64, reason: ChangeReason) {
    let payload = RoomChangedEvent {
        code: code.to_owned(),
        version,
        reason,
    };
    send_room_event(state, code, EVENT_ROOM_CHANGED, &payload);
}

/// Tell a room's subscribers that the room is gone.
pub fn broadcast_room_closed(state: &SharedState, code: &str) {
    let payload = RoomClosedEvent {
        code: code.to_owned(),
    };
    send_room_event(state, code, EVENT_ROOM_CLOSED, &payload);
}

fn send_room_event(state: &SharedState, code: &str, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.hubs().broadcast(code, event),
        Err(err) => warn!(room = %code, event, error = %err, "failed to serialize room SSE payload"),
    }
}
