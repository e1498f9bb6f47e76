//! "Something changed, re-fetch" signals for one room, delivered over a push
//! subscription with a polling fallback.
//!
//! Exactly one feed is active at a time. The notifier starts on push, falls
//! back to polling whenever the push feed misbehaves, and keeps probing push
//! while polling; a successful probe replaces the poll feed immediately.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, future::BoxFuture};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval, interval_at, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    client::api::{ApiResult, ClientError, PushEvent, PushStream, RoomApi},
    dto::{envelope::ErrorCode, room::RoomSnapshot, sse::Handshake},
};

/// Timing knobs of the notifier.
#[derive(Debug, Clone, Copy)]
pub struct NotifierConfig {
    /// Bound on waiting for the subscription handshake.
    pub handshake_timeout: Duration,
    /// A push feed silent for this long (no event, no keep-alive) is unhealthy.
    pub idle_timeout: Duration,
    pub poll_interval: Duration,
    /// How often push is retried while polling.
    pub push_retry_interval: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(45),
            poll_interval: Duration::from_secs(2),
            push_retry_interval: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Push,
    Polling,
}

/// What a consumer should do next. Every variant except `Closed` means "re-fetch".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignal {
    /// A new room version exists. Poll feeds attach the snapshot they already fetched.
    Changed {
        version: u64,
        snapshot: Option<Box<RoomSnapshot>>,
    },
    /// The delivery mode changed; events may have been missed.
    Resync { mode: DeliveryMode },
    /// The room no longer exists.
    Closed,
}

/// A source of room change signals.
///
/// An `Err` from [`ChangeFeed::next_signal`] means the feed is unhealthy and
/// must be replaced.
pub trait ChangeFeed: Send {
    fn mode(&self) -> DeliveryMode;
    fn next_signal(&mut self) -> BoxFuture<'_, ApiResult<RoomSignal>>;
}

/// Feed backed by the server push stream.
pub struct PushFeed {
    stream: PushStream,
    idle_timeout: Duration,
}

impl PushFeed {
    /// Subscribe and wait for the handshake that confirms delivery is live.
    pub async fn connect(
        api: &dyn RoomApi,
        code: &str,
        config: &NotifierConfig,
    ) -> ApiResult<(Self, Handshake)> {
        let handshake = async {
            let mut stream = api.subscribe(code).await?;
            match stream.next().await {
                Some(Ok(PushEvent::Subscribed(handshake))) => Ok((stream, handshake)),
                Some(Ok(other)) => Err(ClientError::Decode(format!(
                    "expected subscription handshake, got {other:?}"
                ))),
                Some(Err(err)) => Err(err),
                None => Err(ClientError::StreamClosed),
            }
        };

        let (stream, handshake) = timeout(config.handshake_timeout, handshake)
            .await
            .map_err(|_| ClientError::Transport("subscription handshake timed out".into()))??;

        Ok((
            Self {
                stream,
                idle_timeout: config.idle_timeout,
            },
            handshake,
        ))
    }
}

impl ChangeFeed for PushFeed {
    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Push
    }

    fn next_signal(&mut self) -> BoxFuture<'_, ApiResult<RoomSignal>> {
        Box::pin(async move {
            loop {
                let item = timeout(self.idle_timeout, self.stream.next())
                    .await
                    .map_err(|_| ClientError::Transport("push stream went silent".into()))?;

                match item {
                    None => return Err(ClientError::StreamClosed),
                    Some(Err(err)) => return Err(err),
                    Some(Ok(PushEvent::KeepAlive | PushEvent::Subscribed(_))) => continue,
                    Some(Ok(PushEvent::Changed(changed))) => {
                        return Ok(RoomSignal::Changed {
                            version: changed.version,
                            snapshot: None,
                        });
                    }
                    Some(Ok(PushEvent::Closed(_))) => return Ok(RoomSignal::Closed),
                }
            }
        })
    }
}

/// Feed that re-reads the room on a fixed interval and reports version changes.
pub struct PollFeed {
    api: Arc<dyn RoomApi>,
    code: String,
    ticker: Interval,
    last_version: Option<u64>,
}

impl PollFeed {
    pub fn new(api: Arc<dyn RoomApi>, code: impl Into<String>, every: Duration) -> Self {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            api,
            code: code.into(),
            ticker,
            last_version: None,
        }
    }
}

impl ChangeFeed for PollFeed {
    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Polling
    }

    fn next_signal(&mut self) -> BoxFuture<'_, ApiResult<RoomSignal>> {
        Box::pin(async move {
            loop {
                self.ticker.tick().await;
                match self.api.get_room(&self.code).await {
                    Ok(snapshot) if Some(snapshot.version) != self.last_version => {
                        self.last_version = Some(snapshot.version);
                        return Ok(RoomSignal::Changed {
                            version: snapshot.version,
                            snapshot: Some(Box::new(snapshot)),
                        });
                    }
                    Ok(_) => {}
                    Err(err) if err.code() == ErrorCode::NotFound => return Ok(RoomSignal::Closed),
                    Err(err) => debug!(room = %self.code, error = %err, "poll failed; will retry"),
                }
            }
        })
    }
}

/// Owns the active feed in a background task. Dropping it tears everything down.
pub struct ChangeNotifier {
    signals: mpsc::Receiver<RoomSignal>,
    mode: watch::Receiver<DeliveryMode>,
    task: JoinHandle<()>,
}

impl ChangeNotifier {
    pub fn spawn(api: Arc<dyn RoomApi>, code: impl Into<String>, config: NotifierConfig) -> Self {
        let (signal_tx, signals) = mpsc::channel(16);
        let (mode_tx, mode) = watch::channel(DeliveryMode::Polling);
        let task = tokio::spawn(run(api, code.into(), config, signal_tx, mode_tx));
        Self {
            signals,
            mode,
            task,
        }
    }

    /// Next signal; `None` once the room closed and the notifier stopped.
    pub async fn recv(&mut self) -> Option<RoomSignal> {
        self.signals.recv().await
    }

    pub fn mode(&self) -> DeliveryMode {
        *self.mode.borrow()
    }

    pub fn mode_watcher(&self) -> watch::Receiver<DeliveryMode> {
        self.mode.clone()
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Step {
    Signal(ApiResult<RoomSignal>),
    Probe,
}

async fn run(
    api: Arc<dyn RoomApi>,
    code: String,
    config: NotifierConfig,
    signals: mpsc::Sender<RoomSignal>,
    mode: watch::Sender<DeliveryMode>,
) {
    let mut feed: Box<dyn ChangeFeed> = match PushFeed::connect(api.as_ref(), &code, &config).await {
        Ok((push, handshake)) => {
            info!(room = %code, version = handshake.version, "push delivery active");
            Box::new(push)
        }
        Err(err) => {
            warn!(room = %code, error = %err, "push subscription failed; polling instead");
            Box::new(PollFeed::new(api.clone(), code.clone(), config.poll_interval))
        }
    };
    mode.send_replace(feed.mode());
    if signals
        .send(RoomSignal::Resync { mode: feed.mode() })
        .await
        .is_err()
    {
        return;
    }

    let mut probe = interval_at(
        Instant::now() + config.push_retry_interval,
        config.push_retry_interval,
    );
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let step = if feed.mode() == DeliveryMode::Push {
            Step::Signal(feed.next_signal().await)
        } else {
            tokio::select! {
                signal = feed.next_signal() => Step::Signal(signal),
                _ = probe.tick() => Step::Probe,
            }
        };

        let switched_to = match step {
            Step::Signal(Ok(signal)) => {
                let closed = signal == RoomSignal::Closed;
                if signals.send(signal).await.is_err() || closed {
                    return;
                }
                None
            }
            Step::Signal(Err(err)) => {
                warn!(room = %code, error = %err, "push delivery unhealthy; falling back to polling");
                feed = Box::new(PollFeed::new(api.clone(), code.clone(), config.poll_interval));
                probe.reset();
                Some(DeliveryMode::Polling)
            }
            Step::Probe => match PushFeed::connect(api.as_ref(), &code, &config).await {
                Ok((push, handshake)) => {
                    info!(room = %code, version = handshake.version, "push delivery restored; polling stopped");
                    feed = Box::new(push);
                    Some(DeliveryMode::Push)
                }
                Err(err) => {
                    debug!(room = %code, error = %err, "push probe failed; still polling");
                    None
                }
            },
        };

        if let Some(new_mode) = switched_to {
            mode.send_replace(new_mode);
            if signals.send(RoomSignal::Resync { mode: new_mode }).await.is_err() {
                return;
            }
        }
    }
}
