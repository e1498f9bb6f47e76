use tracing::info;

use crate::{
    dto::sse::ChangeReason,
    error::ServiceError,
    services::sse_events::{broadcast_room_changed, broadcast_room_closed},
    state::{Mutation, SharedState, room::Room},
};

/// Run a room mutation, then broadcast the resulting change to the room's subscribers.
pub async fn mutate_with_broadcast<T, F>(
    state: &SharedState,
    code: &str,
    reason: ChangeReason,
    work: F,
) -> Result<Mutation<T>, ServiceError>
where
    F: FnMut(&mut Room, u64) -> Result<T, ServiceError>,
{
    let mutation = state.mutate_room(code, work).await?;
    if mutation.deleted {
        info!(room = %code, "last player left; room closed");
        close_room(state, code);
    } else {
        broadcast_room_changed(state, code, mutation.room.version, reason);
    }
    Ok(mutation)
}

/// Publish `room.closed` and release the room's in-process resources.
pub fn close_room(state: &SharedState, code: &str) {
    broadcast_room_closed(state, code);
    state.forget_room(code);
}
