use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Event name of the handshake sent when a subscription opens.
pub const EVENT_SUBSCRIBED: &str = "subscribed";
/// Event name announcing a new room version.
pub const EVENT_ROOM_CHANGED: &str = "room.changed";
/// Event name announcing that the room no longer exists.
pub const EVENT_ROOM_CLOSED: &str = "room.closed";

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// What kind of mutation produced a new room version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Joined,
    Left,
    Started,
    Answered,
    Advanced,
    Finished,
    Restarted,
    /// Events were dropped for this subscriber; re-fetch unconditionally.
    Resync,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Initial metadata sent to an SSE client when it subscribes to a room.
pub struct Handshake {
    pub code: String,
    /// Room version at subscription time.
    pub version: u64,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Broadcast after every successful mutation. Consumers re-fetch the room.
pub struct RoomChangedEvent {
    pub code: String,
    pub version: u64,
    pub reason: ChangeReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
/// Broadcast when the last player left or the room was reaped.
pub struct RoomClosedEvent {
    pub code: String,
}
