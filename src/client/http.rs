//! [`RoomApi`] over the HTTP surface, including the SSE change stream.

use async_stream::stream;
use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, RequestBuilder, header::ACCEPT};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    client::{
        api::{ApiResult, ClientError, PushEvent, PushStream, RoomApi, decode_push_event},
        sse_decoder::{SseDecoder, SseFrame},
    },
    dto::{
        envelope::ApiEnvelope,
        room::{
            AdvanceRequest, AdvanceResponse, AnswerOutcome, CreateRoomRequest, CreateRoomResponse,
            JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse, PlayerActionRequest,
            QuestionView, RoomSnapshot, SubmitAnswerRequest,
        },
    },
    state::room::PlayerId,
};

/// Client for a remote room service rooted at `base_url`.
#[derive(Clone)]
pub struct HttpRoomApi {
    client: Client,
    base_url: String,
}

impl HttpRoomApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get<T>(&self, path: &str) -> BoxFuture<'static, ApiResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        send(self.client.get(self.url(path)))
    }

    fn post<B, T>(&self, path: &str, body: &B) -> BoxFuture<'static, ApiResult<T>>
    where
        B: Serialize,
        T: DeserializeOwned + Send + 'static,
    {
        send(self.client.post(self.url(path)).json(body))
    }

    pub fn create_room(
        &self,
        request: &CreateRoomRequest,
    ) -> BoxFuture<'static, ApiResult<CreateRoomResponse>> {
        self.post("/rooms", request)
    }

    pub fn join_room(
        &self,
        code: &str,
        request: &JoinRoomRequest,
    ) -> BoxFuture<'static, ApiResult<JoinRoomResponse>> {
        self.post(&format!("/rooms/{code}/join"), request)
    }

    pub fn start_game(
        &self,
        code: &str,
        player_id: PlayerId,
    ) -> BoxFuture<'static, ApiResult<QuestionView>> {
        self.post(&format!("/rooms/{code}/start"), &PlayerActionRequest { player_id })
    }

    pub fn end_game(
        &self,
        code: &str,
        player_id: PlayerId,
    ) -> BoxFuture<'static, ApiResult<AdvanceResponse>> {
        self.post(&format!("/rooms/{code}/end"), &PlayerActionRequest { player_id })
    }

    pub fn restart(
        &self,
        code: &str,
        player_id: PlayerId,
    ) -> BoxFuture<'static, ApiResult<RoomSnapshot>> {
        self.post(&format!("/rooms/{code}/restart"), &PlayerActionRequest { player_id })
    }

    pub fn leave_room(
        &self,
        code: &str,
        player_id: PlayerId,
    ) -> BoxFuture<'static, ApiResult<LeaveRoomResponse>> {
        self.post(&format!("/rooms/{code}/leave"), &PlayerActionRequest { player_id })
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

fn send<T>(request: RequestBuilder) -> BoxFuture<'static, ApiResult<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    Box::pin(async move {
        let response = request.send().await.map_err(transport)?;
        decode_envelope(response).await
    })
}

async fn decode_envelope<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;

    let envelope: ApiEnvelope<T> = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) if status.is_server_error() => {
            return Err(ClientError::Transport(format!("server answered {status}")));
        }
        Err(err) => return Err(ClientError::Decode(err.to_string())),
    };

    match envelope {
        ApiEnvelope {
            success: true,
            data: Some(data),
            ..
        } => Ok(data),
        ApiEnvelope {
            error: Some(error), ..
        } => Err(ClientError::Api {
            code: error.code,
            message: error.message,
        }),
        _ => Err(ClientError::Decode(format!(
            "envelope without data or error (HTTP {status})"
        ))),
    }
}

impl RoomApi for HttpRoomApi {
    fn get_room(&self, code: &str) -> BoxFuture<'static, ApiResult<RoomSnapshot>> {
        self.get(&format!("/rooms/{code}"))
    }

    fn current_question(&self, code: &str) -> BoxFuture<'static, ApiResult<QuestionView>> {
        self.get(&format!("/rooms/{code}/question"))
    }

    fn submit_answer(
        &self,
        code: &str,
        request: SubmitAnswerRequest,
    ) -> BoxFuture<'static, ApiResult<AnswerOutcome>> {
        self.post(&format!("/rooms/{code}/answers"), &request)
    }

    fn advance(
        &self,
        code: &str,
        request: AdvanceRequest,
    ) -> BoxFuture<'static, ApiResult<AdvanceResponse>> {
        self.post(&format!("/rooms/{code}/advance"), &request)
    }

    fn subscribe(&self, code: &str) -> BoxFuture<'static, ApiResult<PushStream>> {
        let request = self
            .client
            .get(self.url(&format!("/rooms/{code}/events")))
            .header(ACCEPT, "text/event-stream");

        Box::pin(async move {
            let response = request.send().await.map_err(transport)?;
            if !response.status().is_success() {
                return match decode_envelope::<serde_json::Value>(response).await {
                    Err(err) => Err(err),
                    Ok(_) => Err(ClientError::Decode("unexpected body on failed subscription".into())),
                };
            }

            let mut body = response.bytes_stream();
            let events = stream! {
                let mut decoder = SseDecoder::new();
                while let Some(chunk) = body.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            yield Err(transport(err));
                            return;
                        }
                    };

                    for frame in decoder.push(&chunk) {
                        match frame {
                            SseFrame::Comment(_) => {
                                yield Ok(PushEvent::KeepAlive);
                            }
                            SseFrame::Event { event, data } => {
                                match decode_push_event(event.as_deref(), &data) {
                                    Ok(Some(decoded)) => {
                                        yield Ok(decoded);
                                    }
                                    Ok(None) => debug!(?event, "ignoring unknown SSE event"),
                                    Err(err) => {
                                        yield Err(err);
                                    }
                                }
                            }
                        }
                    }
                }
                yield Err(ClientError::StreamClosed);
            };

            Ok(Box::pin(events) as PushStream)
        })
    }
}
