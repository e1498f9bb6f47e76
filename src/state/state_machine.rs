use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::room::Room;

/// Persisted lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Lobby: players may join, nobody can answer.
    Waiting,
    /// A question is open or being revealed.
    Active,
    /// Final standings are displayed; the room may be restarted or reaped.
    Finished,
}

/// Indicates why a room transitioned to [`RoomStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The last question was revealed.
    QuestionsExhausted,
    /// The host stopped the game early.
    HostEnded,
}

/// Events that can be applied to a room's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host starts the game from the lobby.
    Start,
    /// Host moves past a revealed question that was not the last one.
    NextQuestion,
    /// Game ends, naturally or by the host.
    Finish(FinishReason),
    /// Host sends everybody back to the lobby for another round.
    Restart,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the room was in when the invalid event was received.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomEvent,
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Room status changed since the plan was created.
    #[error("room status changed during transition (expected {expected:?}, got {actual:?})")]
    PhaseMismatch {
        /// Status when plan was created.
        expected: RoomStatus,
        /// Current status.
        actual: RoomStatus,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied to the room yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan, used in logs.
    pub id: PlanId,
    /// Status the room is currently in.
    pub from: RoomStatus,
    /// Status the room will move to.
    pub to: RoomStatus,
    /// Event that triggered this transition.
    pub event: RoomEvent,
}

/// Validate `event` against the room's current status.
pub fn plan(room: &Room, event: RoomEvent) -> Result<Plan, InvalidTransition> {
    let to = compute_transition(room.status, event)?;
    Ok(Plan {
        id: Uuid::new_v4(),
        from: room.status,
        to,
        event,
    })
}

/// Compute a transition from an event if the transition is valid.
pub fn compute_transition(from: RoomStatus, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
    let next = match (from, event) {
        (RoomStatus::Waiting, RoomEvent::Start) => RoomStatus::Active,
        (RoomStatus::Active, RoomEvent::NextQuestion) => RoomStatus::Active,
        (RoomStatus::Active, RoomEvent::Finish(_)) => RoomStatus::Finished,
        (RoomStatus::Finished, RoomEvent::Restart) => RoomStatus::Waiting,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

impl Plan {
    /// Apply the planned transition and its side effects to `room`.
    ///
    /// Fails without touching the room when its status moved on since the plan
    /// was computed. Concurrent writers are fenced by the store's version check.
    pub fn apply(&self, room: &mut Room, now_ms: u64) -> Result<RoomStatus, ApplyError> {
        if room.status != self.from {
            return Err(ApplyError::PhaseMismatch {
                expected: self.from,
                actual: room.status,
            });
        }

        match self.event {
            RoomEvent::Start => {
                room.current_question_index = 0;
                room.question_start_time_ms = Some(now_ms);
                room.last_reveal = None;
                room.finished_at_ms = None;
                clear_answers(room);
            }
            RoomEvent::NextQuestion => {
                room.current_question_index += 1;
                room.question_start_time_ms = Some(now_ms);
                clear_answers(room);
            }
            RoomEvent::Finish(_) => {
                room.question_start_time_ms = None;
                room.finished_at_ms = Some(now_ms);
                clear_answers(room);
            }
            RoomEvent::Restart => {
                room.current_question_index = 0;
                room.question_start_time_ms = None;
                room.question_ids.clear();
                room.last_reveal = None;
                room.finished_at_ms = None;
                clear_answers(room);
                for player in room.players.values_mut() {
                    player.score = 0;
                }
            }
        }

        room.status = self.to;
        Ok(room.status)
    }
}

fn clear_answers(room: &mut Room) {
    room.answers.clear();
    for player in room.players.values_mut() {
        player.has_answered = false;
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::room::{Answer, tests::room_with_guests};

    fn apply(room: &mut Room, event: RoomEvent, now_ms: u64) -> RoomStatus {
        let plan = plan(room, event).unwrap();
        plan.apply(room, now_ms).unwrap()
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut room = room_with_guests(1);

        assert_eq!(apply(&mut room, RoomEvent::Start, 100), RoomStatus::Active);
        assert_eq!(room.question_start_time_ms, Some(100));
        assert_eq!(room.current_question_index, 0);

        assert_eq!(
            apply(&mut room, RoomEvent::NextQuestion, 200),
            RoomStatus::Active
        );
        assert_eq!(room.current_question_index, 1);
        assert_eq!(room.question_start_time_ms, Some(200));

        assert_eq!(
            apply(
                &mut room,
                RoomEvent::Finish(FinishReason::QuestionsExhausted),
                300
            ),
            RoomStatus::Finished
        );
        assert_eq!(room.question_start_time_ms, None);
        assert_eq!(room.finished_at_ms, Some(300));

        assert_eq!(apply(&mut room, RoomEvent::Restart, 400), RoomStatus::Waiting);
        assert_eq!(room.finished_at_ms, None);
    }

    #[test]
    fn next_question_clears_answer_flags() {
        let mut room = room_with_guests(1);
        apply(&mut room, RoomEvent::Start, 0);
        room.record_answer(Answer {
            question_index: 0,
            player_id: 2,
            selected_option: Some(1),
            elapsed_ms: 10,
            client_elapsed_ms: None,
            correct: true,
            points_awarded: 199,
        });
        assert!(room.players[1].has_answered);

        apply(&mut room, RoomEvent::NextQuestion, 50);
        assert!(room.answers.is_empty());
        assert!(room.players.values().all(|p| !p.has_answered));
        assert_eq!(room.players[1].score, 199);
    }

    #[test]
    fn restart_resets_scores() {
        let mut room = room_with_guests(2);
        apply(&mut room, RoomEvent::Start, 0);
        room.players[2].score = 420;
        room.question_ids = vec!["a".into(), "b".into()];
        apply(&mut room, RoomEvent::Finish(FinishReason::HostEnded), 10);
        apply(&mut room, RoomEvent::Restart, 20);

        assert!(room.players.values().all(|p| p.score == 0));
        assert!(room.question_ids.is_empty());
        assert!(room.invariants_hold());
    }

    #[test]
    fn invalid_transition_returns_error() {
        let room = room_with_guests(1);
        let err = plan(&room, RoomEvent::NextQuestion).unwrap_err();
        assert_eq!(err.from, RoomStatus::Waiting);
        assert_eq!(err.event, RoomEvent::NextQuestion);

        assert!(plan(&room, RoomEvent::Finish(FinishReason::HostEnded)).is_err());
        assert!(plan(&room, RoomEvent::Restart).is_err());
    }

    #[test]
    fn stale_plan_is_rejected() {
        let mut room = room_with_guests(1);
        let stale = plan(&room, RoomEvent::Start).unwrap();
        stale.apply(&mut room, 0).unwrap();
        let before = room.clone();

        let err = stale.apply(&mut room, 5).unwrap_err();
        assert_eq!(
            err,
            ApplyError::PhaseMismatch {
                expected: RoomStatus::Waiting,
                actual: RoomStatus::Active
            }
        );
        assert_eq!(room, before);
    }

    #[test]
    fn start_time_is_set_iff_active_across_random_sequences() {
        let events = [
            RoomEvent::Start,
            RoomEvent::NextQuestion,
            RoomEvent::Finish(FinishReason::QuestionsExhausted),
            RoomEvent::Finish(FinishReason::HostEnded),
            RoomEvent::Restart,
        ];
        let mut rng = StdRng::seed_from_u64(0x7121_71a);

        for _ in 0..200 {
            let mut room = room_with_guests(rng.random_range(0..4));
            let mut now = 0;
            for _ in 0..40 {
                now += rng.random_range(0..5_000);
                let event = events[rng.random_range(0..events.len())];
                if event == RoomEvent::NextQuestion && room.is_last_question() {
                    continue;
                }
                if let Ok(plan) = plan(&room, event) {
                    plan.apply(&mut room, now).unwrap();
                    room.version += 1;
                }
                assert_eq!(
                    room.question_start_time_ms.is_some(),
                    room.status == RoomStatus::Active
                );
                assert!(room.invariants_hold());
            }
        }
    }
}
