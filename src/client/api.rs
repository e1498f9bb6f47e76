use futures::{future::BoxFuture, stream::BoxStream};
use thiserror::Error;

use crate::{
    dto::{
        envelope::ErrorCode,
        room::{
            AdvanceRequest, AdvanceResponse, AnswerOutcome, QuestionView, RoomSnapshot,
            SubmitAnswerRequest,
        },
        sse::{
            EVENT_ROOM_CHANGED, EVENT_ROOM_CLOSED, EVENT_SUBSCRIBED, Handshake, RoomChangedEvent,
            RoomClosedEvent,
        },
    },
    error::ServiceError,
};

pub type ApiResult<T> = Result<T, ClientError>;

/// Push notifications for one room, starting with the subscription handshake.
pub type PushStream = BoxStream<'static, ApiResult<PushEvent>>;

/// Decoded item of a room change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Subscribed(Handshake),
    Changed(RoomChangedEvent),
    Closed(RoomClosedEvent),
    KeepAlive,
}

/// Failure observed by a client talking to the room service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The service answered with an error envelope.
    #[error("{message}")]
    Api { code: ErrorCode, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("push stream closed")]
    StreamClosed,
    #[error("undecodable payload: {0}")]
    Decode(String),
}

impl ClientError {
    /// Error category, with transport problems counted as transient.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Api { code, .. } => *code,
            ClientError::Transport(_) | ClientError::StreamClosed => ErrorCode::Transient,
            ClientError::Decode(_) => ErrorCode::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code().is_transient()
    }
}

impl From<ServiceError> for ClientError {
    fn from(err: ServiceError) -> Self {
        ClientError::Api {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Operations a player session needs from the room service.
///
/// Every call is an independent future; dropping it cancels the call.
pub trait RoomApi: Send + Sync {
    fn get_room(&self, code: &str) -> BoxFuture<'static, ApiResult<RoomSnapshot>>;
    fn current_question(&self, code: &str) -> BoxFuture<'static, ApiResult<QuestionView>>;
    fn submit_answer(
        &self,
        code: &str,
        request: SubmitAnswerRequest,
    ) -> BoxFuture<'static, ApiResult<AnswerOutcome>>;
    fn advance(
        &self,
        code: &str,
        request: AdvanceRequest,
    ) -> BoxFuture<'static, ApiResult<AdvanceResponse>>;
    /// Open a push subscription. The first item is [`PushEvent::Subscribed`].
    fn subscribe(&self, code: &str) -> BoxFuture<'static, ApiResult<PushStream>>;
}

/// Decode one named server event. Unknown event names yield `None`.
pub fn decode_push_event(event: Option<&str>, data: &str) -> ApiResult<Option<PushEvent>> {
    let decoded = match event {
        Some(EVENT_SUBSCRIBED) => PushEvent::Subscribed(parse(data)?),
        Some(EVENT_ROOM_CHANGED) => PushEvent::Changed(parse(data)?),
        Some(EVENT_ROOM_CLOSED) => PushEvent::Closed(parse(data)?),
        _ => return Ok(None),
    };
    Ok(Some(decoded))
}

fn parse<T: serde::de::DeserializeOwned>(data: &str) -> ApiResult<T> {
    serde_json::from_str(data).map_err(|err| ClientError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::sse::ChangeReason;

    #[test]
    fn decodes_known_events() {
        let changed = decode_push_event(
            Some("room.changed"),
            r#"{"code":"ABCDEF","version":3,"reason":"answered"}"#,
        )
        .unwrap();
        assert_eq!(
            changed,
            Some(PushEvent::Changed(RoomChangedEvent {
                code: "ABCDEF".into(),
                version: 3,
                reason: ChangeReason::Answered,
            }))
        );
        assert_eq!(decode_push_event(Some("info"), "hello").unwrap(), None);
        assert!(matches!(
            decode_push_event(Some("room.closed"), "not json"),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn transport_failures_are_transient() {
        assert!(ClientError::Transport("reset".into()).is_transient());
        assert!(ClientError::from(ServiceError::Degraded).is_transient());
        assert!(!ClientError::from(ServiceError::Conflict("dup".into())).is_transient());
    }
}
