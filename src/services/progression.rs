//! Progression controller: the only writer of a room's status, question
//! pointer and question start time, plus answer submission.
//!
//! Each operation pre-reads the room to fetch what it needs from the question
//! bank, then re-validates everything inside the atomic room mutation.

use tracing::{debug, info};

use crate::{
    dao::question_bank::Question,
    dto::{
        room::{
            AdvanceRequest, AdvanceResponse, AnswerOutcome, QuestionView, RevealSummary,
            RoomSnapshot, StandingView, SubmitAnswerRequest,
        },
        sse::ChangeReason,
    },
    error::ServiceError,
    services::{room_service::normalize_code, scoring::ScoringRules},
    state::{
        SharedState,
        room::{Answer, PlayerId, Room},
        state_machine::{self, FinishReason, RoomEvent, RoomStatus},
        transitions::mutate_with_broadcast,
    },
};

fn ensure_host(room: &Room, player_id: PlayerId) -> Result<(), ServiceError> {
    match room.player(player_id) {
        None => Err(ServiceError::NotFound(format!(
            "player {player_id} not in room `{}`",
            room.code
        ))),
        Some(player) if !player.is_host => Err(ServiceError::Unauthorized(format!(
            "only the host can drive room `{}`",
            room.code
        ))),
        Some(_) => Ok(()),
    }
}

fn ensure_active(room: &Room) -> Result<(), ServiceError> {
    if room.status != RoomStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "room `{}` is {:?}, not active",
            room.code, room.status
        )));
    }
    Ok(())
}

/// The open question a request was checked against before the bank lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenQuestion {
    index: u32,
    question_id: Option<String>,
    started_at_ms: Option<u64>,
}

impl OpenQuestion {
    fn of(room: &Room) -> Self {
        Self {
            index: room.current_question_index,
            question_id: room.current_question_id().map(str::to_owned),
            started_at_ms: room.question_start_time_ms,
        }
    }
}

/// Reject requests addressed to a question other than the current one.
///
/// The index alone repeats after a restart, so the question id and start time
/// observed during the pre-read must still match as well.
fn ensure_question(
    room: &Room,
    requested: Option<u32>,
    observed: &OpenQuestion,
) -> Result<(), ServiceError> {
    if let Some(requested) = requested {
        if requested != room.current_question_index {
            return Err(ServiceError::InvalidState(format!(
                "question {requested} is no longer open (current is {})",
                room.current_question_index
            )));
        }
    }
    if OpenQuestion::of(room) != *observed {
        return Err(ServiceError::InvalidState(format!(
            "question {} closed while the request was in flight",
            observed.index
        )));
    }
    Ok(())
}

async fn current_question(state: &SharedState, room: &Room) -> Result<Question, ServiceError> {
    let id = room
        .current_question_id()
        .ok_or_else(|| ServiceError::Internal(format!("room `{}` lost its questions", room.code)))?;
    Ok(state.question_bank().find(id).await?)
}

async fn question_at(state: &SharedState, room: &Room, index: u32) -> Result<Question, ServiceError> {
    let id = room.question_ids.get(index as usize).ok_or_else(|| {
        ServiceError::Internal(format!("room `{}` has no question {index}", room.code))
    })?;
    Ok(state.question_bank().find(id).await?)
}

fn final_standings(room: &Room) -> Vec<StandingView> {
    room.standings().into_iter().map(StandingView::from).collect()
}

/// Host starts the game; returns the first question.
pub async fn start_game(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<QuestionView, ServiceError> {
    let code = normalize_code(code);
    let snapshot = state.load_room(&code).await?;
    ensure_host(&snapshot, player_id)?;
    state_machine::plan(&snapshot, RoomEvent::Start)?;

    let questions = state
        .question_bank()
        .draw(
            &snapshot.settings.category,
            snapshot.settings.difficulty,
            snapshot.settings.total_questions as usize,
        )
        .await?;
    let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    let min_players = state.config().rooms.min_players_to_start;

    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Started, |room, now| {
        ensure_host(room, player_id)?;
        let plan = state_machine::plan(room, RoomEvent::Start)?;
        if room.players.len() < min_players {
            return Err(ServiceError::InvalidInput(format!(
                "at least {min_players} players are needed to start (room has {})",
                room.players.len()
            )));
        }
        room.question_ids = question_ids.clone();
        plan.apply(room, now)?;
        Ok(plan.id)
    })
    .await?;

    info!(room = %code, plan_id = %mutation.value, players = mutation.room.players.len(), "game started");
    let first = questions
        .first()
        .ok_or_else(|| ServiceError::Internal("question bank returned no question".into()))?;
    QuestionView::from_room(&mutation.room, first)
        .ok_or_else(|| ServiceError::Internal("started room without start time".into()))
}

/// Record a player's single answer for the current question.
pub async fn submit_answer(
    state: &SharedState,
    code: &str,
    request: SubmitAnswerRequest,
) -> Result<AnswerOutcome, ServiceError> {
    let code = normalize_code(code);
    let snapshot = state.load_room(&code).await?;
    ensure_active(&snapshot)?;
    let observed = OpenQuestion::of(&snapshot);
    let question = current_question(state, &snapshot).await?;
    let rules = ScoringRules::from(state.config().scoring);
    let SubmitAnswerRequest {
        player_id,
        question_index,
        selected_option,
        client_elapsed_ms,
    } = request;

    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Answered, |room, now| {
        ensure_active(room)?;
        ensure_question(room, question_index, &observed)?;
        let Some(player) = room.player(player_id) else {
            return Err(ServiceError::NotFound(format!(
                "player {player_id} not in room `{}`",
                room.code
            )));
        };
        if player.has_answered || room.answer_for(player_id).is_some() {
            return Err(ServiceError::Conflict(format!(
                "player {player_id} already answered question {}",
                room.current_question_index
            )));
        }
        if let Some(option) = selected_option {
            if usize::from(option) >= question.options.len() {
                return Err(ServiceError::InvalidInput(format!(
                    "option {option} out of range (question has {})",
                    question.options.len()
                )));
            }
        }

        let elapsed_ms = room.elapsed_ms(now);
        let correct = selected_option == Some(question.correct_option);
        let points = rules.score(correct, elapsed_ms, room.settings.time_limit_seconds);
        let score = room
            .record_answer(Answer {
                question_index: room.current_question_index,
                player_id,
                selected_option,
                elapsed_ms,
                client_elapsed_ms,
                correct,
                points_awarded: points,
            })
            .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} vanished")))?;

        Ok(AnswerOutcome {
            correct,
            points,
            score,
            elapsed_ms,
        })
    })
    .await?;

    debug!(
        room = %code,
        player_id,
        question = observed.index,
        correct = mutation.value.correct,
        points = mutation.value.points,
        "answer recorded"
    );
    Ok(mutation.value)
}

/// Host closes the current question: builds the reveal, then either opens the
/// next question or finishes the game.
pub async fn advance(
    state: &SharedState,
    code: &str,
    request: AdvanceRequest,
) -> Result<AdvanceResponse, ServiceError> {
    let code = normalize_code(code);
    let snapshot = state.load_room(&code).await?;
    ensure_host(&snapshot, request.player_id)?;
    ensure_active(&snapshot)?;
    let observed = OpenQuestion::of(&snapshot);
    let question = current_question(state, &snapshot).await?;
    let next = if snapshot.is_last_question() {
        None
    } else {
        Some(question_at(state, &snapshot, observed.index + 1).await?)
    };

    let reason = if next.is_some() {
        ChangeReason::Advanced
    } else {
        ChangeReason::Finished
    };
    let mutation = mutate_with_broadcast(state, &code, reason, |room, now| {
        ensure_host(room, request.player_id)?;
        ensure_active(room)?;
        ensure_question(room, request.question_index, &observed)?;

        let event = if room.is_last_question() {
            RoomEvent::Finish(FinishReason::QuestionsExhausted)
        } else {
            RoomEvent::NextQuestion
        };
        let plan = state_machine::plan(room, event)?;
        let reveal = room.build_reveal(question.id.clone(), question.correct_option, now);
        plan.apply(room, now)?;
        room.last_reveal = Some(reveal);
        Ok(plan.to)
    })
    .await?;

    let room = &mutation.room;
    let reveal = room
        .last_reveal
        .as_ref()
        .map(RevealSummary::from)
        .ok_or_else(|| ServiceError::Internal("advance produced no reveal".into()))?;

    if mutation.value == RoomStatus::Finished {
        info!(room = %code, "last question revealed; game finished");
        return Ok(AdvanceResponse {
            reveal,
            finished: true,
            next_question: None,
            final_standings: Some(final_standings(room)),
        });
    }

    let next = next.ok_or_else(|| ServiceError::Internal("next question missing".into()))?;
    info!(room = %code, question = room.current_question_index, "advanced to next question");
    Ok(AdvanceResponse {
        reveal,
        finished: false,
        next_question: QuestionView::from_room(room, &next),
        final_standings: None,
    })
}

/// Host stops an active game early, revealing the current question.
pub async fn end_game(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<AdvanceResponse, ServiceError> {
    let code = normalize_code(code);
    let snapshot = state.load_room(&code).await?;
    ensure_host(&snapshot, player_id)?;
    ensure_active(&snapshot)?;
    let observed = OpenQuestion::of(&snapshot);
    let question = current_question(state, &snapshot).await?;

    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Finished, |room, now| {
        ensure_host(room, player_id)?;
        ensure_active(room)?;
        ensure_question(room, None, &observed)?;
        let plan = state_machine::plan(room, RoomEvent::Finish(FinishReason::HostEnded))?;
        let reveal = room.build_reveal(question.id.clone(), question.correct_option, now);
        plan.apply(room, now)?;
        room.last_reveal = Some(reveal);
        Ok(())
    })
    .await?;

    info!(room = %code, "host ended the game");
    let room = &mutation.room;
    Ok(AdvanceResponse {
        reveal: room
            .last_reveal
            .as_ref()
            .map(RevealSummary::from)
            .ok_or_else(|| ServiceError::Internal("end produced no reveal".into()))?,
        finished: true,
        next_question: None,
        final_standings: Some(final_standings(room)),
    })
}

/// Host sends a finished room back to the lobby with zeroed scores.
pub async fn restart(
    state: &SharedState,
    code: &str,
    player_id: PlayerId,
) -> Result<RoomSnapshot, ServiceError> {
    let code = normalize_code(code);
    let mutation = mutate_with_broadcast(state, &code, ChangeReason::Restarted, |room, now| {
        ensure_host(room, player_id)?;
        let plan = state_machine::plan(room, RoomEvent::Restart)?;
        plan.apply(room, now)?;
        Ok(())
    })
    .await?;

    info!(room = %code, "room restarted");
    Ok(RoomSnapshot::from_room(&mutation.room, state.now_ms()))
}
