//! Background task that keeps a [`SessionSync`] current and exposes a
//! per-tick [`SessionView`] to the UI layer.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    client::{
        notifier::{ChangeNotifier, DeliveryMode, RoomSignal},
        session::{AdvanceOutcome, ClientPhase, SessionError, SessionSync, SubmitResult},
    },
    clock::Clock,
    dto::room::{QuestionView, RoomSnapshot},
};

/// Default refresh period of the derived view.
pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

/// Everything a UI needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub phase: ClientPhase,
    pub room: Option<RoomSnapshot>,
    pub question: Option<QuestionView>,
    pub remaining_ms: Option<u64>,
    pub remaining_seconds: Option<u64>,
    pub can_advance: bool,
    /// The room is gone; route the player back to the entry screen.
    pub room_lost: bool,
    pub delivery: DeliveryMode,
}

impl SessionView {
    fn project(sync: &SessionSync, now_ms: u64, room_lost: bool, delivery: DeliveryMode) -> Self {
        Self {
            phase: sync.phase_at(now_ms),
            room: sync.snapshot().cloned(),
            question: sync.question().cloned(),
            remaining_ms: sync.countdown_at(now_ms),
            remaining_seconds: sync.countdown_seconds_at(now_ms),
            can_advance: !room_lost && sync.can_advance_at(now_ms),
            room_lost,
            delivery,
        }
    }
}

enum Command {
    Submit {
        selected_option: Option<u8>,
        reply: oneshot::Sender<Result<SubmitResult, SessionError>>,
    },
    Advance {
        reply: oneshot::Sender<Result<AdvanceOutcome, SessionError>>,
    },
}

enum Step {
    Tick,
    Signal(Option<RoomSignal>),
    Command(Option<Command>),
}

/// Handle to a running session. Dropping it stops the task, the notifier and
/// any call in flight.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(
        sync: SessionSync,
        notifier: ChangeNotifier,
        clock: Arc<dyn Clock>,
        tick: Duration,
    ) -> Self {
        let initial = SessionView::project(&sync, clock.now_ms(), false, notifier.mode());
        let (view_tx, view) = watch::channel(initial);
        let (commands, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(drive(sync, notifier, clock, tick, command_rx, view_tx));
        Self {
            commands,
            view,
            task,
        }
    }

    /// Latest projected view.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub async fn submit_answer(
        &self,
        selected_option: Option<u8>,
    ) -> Result<SubmitResult, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                selected_option,
                reply,
            })
            .await
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn advance(&self) -> Result<AdvanceOutcome, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Advance { reply })
            .await
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn drive(
    mut sync: SessionSync,
    mut notifier: ChangeNotifier,
    clock: Arc<dyn Clock>,
    tick: Duration,
    mut commands: mpsc::Receiver<Command>,
    view: watch::Sender<SessionView>,
) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut room_lost = false;

    loop {
        let step = tokio::select! {
            _ = ticker.tick() => Step::Tick,
            signal = notifier.recv(), if !room_lost => Step::Signal(signal),
            command = commands.recv() => Step::Command(command),
        };

        match step {
            Step::Tick => {}
            Step::Signal(None | Some(RoomSignal::Closed)) => {
                info!(room = %sync.code(), "room closed");
                room_lost = true;
            }
            Step::Signal(Some(RoomSignal::Changed {
                snapshot: Some(snapshot),
                ..
            })) => room_lost |= track(sync.apply_snapshot(*snapshot).await, &sync),
            Step::Signal(Some(_)) => room_lost |= track(sync.resync().await, &sync),
            Step::Command(None) => break,
            Step::Command(Some(Command::Submit {
                selected_option,
                reply,
            })) => {
                let result = if room_lost {
                    Err(SessionError::RoomGone)
                } else {
                    sync.submit_answer(selected_option, clock.now_ms()).await
                };
                room_lost |= matches!(result, Err(SessionError::RoomGone));
                let _ = reply.send(result);
            }
            Step::Command(Some(Command::Advance { reply })) => {
                let result = if room_lost {
                    Err(SessionError::RoomGone)
                } else {
                    sync.advance().await
                };
                room_lost |= matches!(result, Err(SessionError::RoomGone));
                let _ = reply.send(result);
            }
        }

        let next = SessionView::project(&sync, clock.now_ms(), room_lost, notifier.mode());
        view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    debug!(room = %sync.code(), "session driver stopped");
}

/// Log a failed refresh; returns whether the room is gone.
fn track(result: Result<(), SessionError>, sync: &SessionSync) -> bool {
    match result {
        Ok(()) => false,
        Err(SessionError::RoomGone) => true,
        Err(err) => {
            warn!(room = %sync.code(), error = %err, "session refresh failed");
            false
        }
    }
}
