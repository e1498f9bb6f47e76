//! Background garbage collection of finished and abandoned rooms.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    config::RoomsConfig,
    error::ServiceError,
    state::{SharedState, room::Room, state_machine::RoomStatus, transitions::close_room},
};

/// Whether a room has outlived its retention window.
pub fn is_expired(
    status: RoomStatus,
    updated_at_ms: u64,
    finished_at_ms: Option<u64>,
    now_ms: u64,
    config: &RoomsConfig,
) -> bool {
    let retention = config.retention().as_millis() as u64;
    let idle = config.idle_timeout().as_millis() as u64;

    let retired = status == RoomStatus::Finished
        && finished_at_ms.is_some_and(|finished| now_ms >= finished.saturating_add(retention));
    let abandoned = now_ms >= updated_at_ms.saturating_add(idle);
    retired || abandoned
}

/// Delete every expired room once. Returns the number of rooms removed.
pub async fn sweep(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_room_store().await?;
    let rooms = state.bounded(store.list_rooms()).await?;
    let config = state.config().rooms.clone();
    let now = state.now_ms();
    let mut removed = 0;

    for item in rooms {
        if !is_expired(item.status, item.updated_at_ms, item.finished_at_ms, now, &config) {
            continue;
        }

        let deleted = state
            .delete_room_if(&item.code, |room: &Room, now| {
                is_expired(room.status, room.updated_at_ms, room.finished_at_ms, now, &config)
            })
            .await?;
        if deleted {
            info!(room = %item.code, status = ?item.status, "reaped expired room");
            close_room(state, &item.code);
            removed += 1;
        }
    }

    state.hubs().prune_idle();
    Ok(removed)
}

/// Sweep on a fixed interval for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().rooms.reap_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep(&state).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "room sweep finished"),
            Err(ServiceError::Degraded) => debug!("skipping room sweep while degraded"),
            Err(err) => warn!(error = %err, "room sweep failed"),
        }
    }
}
