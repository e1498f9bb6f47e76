//! Runtime representation of a room, its players and the answers collected for
//! the current question.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dao::models::{AnswerEntity, PlayerEntity, RevealEntity, RoomEntity, RoomSettingsEntity},
    state::state_machine::RoomStatus,
};

/// Identifier of a player, unique inside its room only.
pub type PlayerId = u32;

/// Identifier handed to the player creating the room.
pub const FIRST_PLAYER_ID: PlayerId = 1;

/// Display-only flavour of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Classic,
    Speed,
    Marathon,
}

/// Difficulty requested from the question bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    /// Matches every difficulty.
    Mixed,
}

impl Difficulty {
    /// Whether a question of difficulty `other` may be drawn for this setting.
    pub fn accepts(self, other: Difficulty) -> bool {
        self == Difficulty::Mixed || self == other
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Mixed => "mixed",
        };
        f.write_str(label)
    }
}

/// Derived sub-phase of an active room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuestionPhase {
    /// The question window is open and some players have not answered yet.
    CollectingAnswers,
    /// Every player answered or the deadline passed; waiting for the host.
    Revealing,
}

/// Immutable configuration chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub max_players: u8,
    pub time_limit_seconds: u32,
    pub total_questions: u32,
    pub game_mode: GameMode,
    pub category: String,
    pub difficulty: Difficulty,
}

impl RoomSettings {
    /// Length of the question window in milliseconds.
    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_seconds) * 1_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub is_host: bool,
    pub score: u32,
    pub has_answered: bool,
    pub joined_at_ms: u64,
}

/// Answer record for one player and one question. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub question_index: u32,
    pub player_id: PlayerId,
    pub selected_option: Option<u8>,
    pub elapsed_ms: u64,
    pub client_elapsed_ms: Option<u64>,
    pub correct: bool,
    pub points_awarded: u32,
}

impl Answer {
    /// Record standing in for a player who never answered before the question closed.
    pub fn missing(question_index: u32, player_id: PlayerId, elapsed_ms: u64) -> Self {
        Self {
            question_index,
            player_id,
            selected_option: None,
            elapsed_ms,
            client_elapsed_ms: None,
            correct: false,
            points_awarded: 0,
        }
    }
}

/// Outcome of a closed question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reveal {
    pub question_index: u32,
    pub question_id: String,
    pub correct_option: u8,
    /// One entry per player present when the question closed, in join order.
    pub results: Vec<Answer>,
}

/// Ranked entry of the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// 1-based rank; players with equal scores share a rank.
    pub rank: u32,
    pub player_id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub score: u32,
}

/// Authoritative room record as manipulated by the services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub settings: RoomSettings,
    pub current_question_index: u32,
    pub question_start_time_ms: Option<u64>,
    pub question_ids: Vec<String>,
    /// Players keyed by id, kept in join order.
    pub players: IndexMap<PlayerId, Player>,
    /// Answers collected for `current_question_index`.
    pub answers: Vec<Answer>,
    pub last_reveal: Option<Reveal>,
    pub next_player_id: PlayerId,
    pub version: u64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

impl Room {
    /// Create a waiting room whose only player is its host.
    pub fn new(
        code: String,
        settings: RoomSettings,
        host_name: String,
        host_avatar: String,
        now_ms: u64,
    ) -> Self {
        let mut room = Self {
            code,
            status: RoomStatus::Waiting,
            settings,
            current_question_index: 0,
            question_start_time_ms: None,
            question_ids: Vec::new(),
            players: IndexMap::new(),
            answers: Vec::new(),
            last_reveal: None,
            next_player_id: FIRST_PLAYER_ID,
            version: 0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            finished_at_ms: None,
        };
        let host = room.add_player(host_name, host_avatar, now_ms);
        if let Some(player) = room.players.get_mut(&host) {
            player.is_host = true;
        }
        room
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.players
            .values()
            .find(|player| player.is_host)
            .map(|player| player.id)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.player(id).is_some_and(|player| player.is_host)
    }

    /// Whether the room already holds `max_players` players, host included.
    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.settings.max_players)
    }

    /// Append a guest and return the freshly allocated id.
    pub fn add_player(&mut self, name: String, avatar: String, now_ms: u64) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.players.insert(
            id,
            Player {
                id,
                name,
                avatar,
                is_host: false,
                score: 0,
                has_answered: false,
                joined_at_ms: now_ms,
            },
        );
        id
    }

    /// Remove a player, promoting the earliest-joined remaining player when the
    /// host leaves. Returns the removed player and the id of a newly promoted host.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<(Player, Option<PlayerId>)> {
        let removed = self.players.shift_remove(&id)?;
        self.answers.retain(|answer| answer.player_id != id);

        let mut promoted = None;
        if removed.is_host {
            if let Some((next_id, next)) = self.players.first_mut() {
                next.is_host = true;
                promoted = Some(*next_id);
            }
        }

        Some((removed, promoted))
    }

    /// Instant after which the current question stops accepting points.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.question_start_time_ms
            .map(|start| start.saturating_add(self.settings.time_limit_ms()))
    }

    /// Every present player answered the current question.
    pub fn all_answered(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|player| player.has_answered)
    }

    /// Derived sub-phase; `None` unless the room is active.
    pub fn question_phase(&self, now_ms: u64) -> Option<QuestionPhase> {
        if self.status != RoomStatus::Active {
            return None;
        }
        let expired = self.deadline_ms().is_some_and(|deadline| now_ms >= deadline);
        if expired || self.all_answered() {
            Some(QuestionPhase::Revealing)
        } else {
            Some(QuestionPhase::CollectingAnswers)
        }
    }

    pub fn current_question_id(&self) -> Option<&str> {
        if self.status != RoomStatus::Active {
            return None;
        }
        self.question_ids
            .get(self.current_question_index as usize)
            .map(String::as_str)
    }

    /// Whether the current question is the last one of the game.
    pub fn is_last_question(&self) -> bool {
        self.current_question_index + 1 >= self.settings.total_questions
    }

    /// Server-side elapsed time since the current question opened.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.question_start_time_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or_default()
    }

    pub fn answer_for(&self, player_id: PlayerId) -> Option<&Answer> {
        self.answers
            .iter()
            .find(|answer| answer.player_id == player_id)
    }

    /// Store an answer, flag the player and credit the points. Returns the new score.
    pub fn record_answer(&mut self, answer: Answer) -> Option<u32> {
        let player = self.players.get_mut(&answer.player_id)?;
        player.has_answered = true;
        player.score = player.score.saturating_add(answer.points_awarded);
        let score = player.score;
        self.answers.push(answer);
        Some(score)
    }

    /// Results of the current question, padding players who never answered.
    pub fn build_reveal(&self, question_id: String, correct_option: u8, now_ms: u64) -> Reveal {
        let elapsed = self
            .elapsed_ms(now_ms)
            .min(self.settings.time_limit_ms());
        let results = self
            .players
            .keys()
            .map(|id| {
                self.answer_for(*id).cloned().unwrap_or_else(|| {
                    Answer::missing(self.current_question_index, *id, elapsed)
                })
            })
            .collect();

        Reveal {
            question_index: self.current_question_index,
            question_id,
            correct_option,
            results,
        }
    }

    /// Scoreboard ordered by descending score, ties broken by ascending id.
    pub fn standings(&self) -> Vec<Standing> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

        let mut standings: Vec<Standing> = Vec::with_capacity(players.len());
        for (position, player) in players.into_iter().enumerate() {
            let rank = match standings.last() {
                Some(previous) if previous.score == player.score => previous.rank,
                _ => position as u32 + 1,
            };
            standings.push(Standing {
                rank,
                player_id: player.id,
                name: player.name.clone(),
                avatar: player.avatar.clone(),
                score: player.score,
            });
        }
        standings
    }

    /// Structural invariants every persisted room satisfies.
    pub fn invariants_hold(&self) -> bool {
        let timed = self.question_start_time_ms.is_some() == (self.status == RoomStatus::Active);
        let in_bounds = self.status != RoomStatus::Active
            || self.current_question_index < self.settings.total_questions;
        let single_host =
            self.players.is_empty() || self.players.values().filter(|p| p.is_host).count() == 1;
        let ids_below_counter = self.players.keys().all(|id| *id < self.next_player_id);
        let one_answer_each = self
            .players
            .values()
            .all(|p| self.answers.iter().filter(|a| a.player_id == p.id).count() <= 1);

        timed && in_bounds && single_host && ids_below_counter && one_answer_each
    }
}

impl From<RoomSettingsEntity> for RoomSettings {
    fn from(value: RoomSettingsEntity) -> Self {
        Self {
            max_players: value.max_players,
            time_limit_seconds: value.time_limit_seconds,
            total_questions: value.total_questions,
            game_mode: value.game_mode,
            category: value.category,
            difficulty: value.difficulty,
        }
    }
}

impl From<&RoomSettings> for RoomSettingsEntity {
    fn from(value: &RoomSettings) -> Self {
        Self {
            max_players: value.max_players,
            time_limit_seconds: value.time_limit_seconds,
            total_questions: value.total_questions,
            game_mode: value.game_mode,
            category: value.category.clone(),
            difficulty: value.difficulty,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            avatar: value.avatar,
            is_host: value.is_host,
            score: value.score,
            has_answered: value.has_answered,
            joined_at_ms: value.joined_at_ms,
        }
    }
}

impl From<&Player> for PlayerEntity {
    fn from(value: &Player) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            avatar: value.avatar.clone(),
            is_host: value.is_host,
            score: value.score,
            has_answered: value.has_answered,
            joined_at_ms: value.joined_at_ms,
        }
    }
}

impl From<AnswerEntity> for Answer {
    fn from(value: AnswerEntity) -> Self {
        Self {
            question_index: value.question_index,
            player_id: value.player_id,
            selected_option: value.selected_option,
            elapsed_ms: value.elapsed_ms,
            client_elapsed_ms: value.client_elapsed_ms,
            correct: value.correct,
            points_awarded: value.points_awarded,
        }
    }
}

impl From<&Answer> for AnswerEntity {
    fn from(value: &Answer) -> Self {
        Self {
            question_index: value.question_index,
            player_id: value.player_id,
            selected_option: value.selected_option,
            elapsed_ms: value.elapsed_ms,
            client_elapsed_ms: value.client_elapsed_ms,
            correct: value.correct,
            points_awarded: value.points_awarded,
        }
    }
}

impl From<RevealEntity> for Reveal {
    fn from(value: RevealEntity) -> Self {
        Self {
            question_index: value.question_index,
            question_id: value.question_id,
            correct_option: value.correct_option,
            results: value.results.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&Reveal> for RevealEntity {
    fn from(value: &Reveal) -> Self {
        Self {
            question_index: value.question_index,
            question_id: value.question_id.clone(),
            correct_option: value.correct_option,
            results: value.results.iter().map(Into::into).collect(),
        }
    }
}

impl From<RoomEntity> for Room {
    fn from(value: RoomEntity) -> Self {
        Self {
            code: value.code,
            status: value.status,
            settings: value.settings.into(),
            current_question_index: value.current_question_index,
            question_start_time_ms: value.question_start_time_ms,
            question_ids: value.question_ids,
            players: value
                .players
                .into_iter()
                .map(|player| (player.id, Player::from(player)))
                .collect(),
            answers: value.answers.into_iter().map(Into::into).collect(),
            last_reveal: value.last_reveal.map(Into::into),
            next_player_id: value.next_player_id,
            version: value.version,
            created_at_ms: value.created_at_ms,
            updated_at_ms: value.updated_at_ms,
            finished_at_ms: value.finished_at_ms,
        }
    }
}

impl From<&Room> for RoomEntity {
    fn from(value: &Room) -> Self {
        Self {
            code: value.code.clone(),
            status: value.status,
            settings: (&value.settings).into(),
            current_question_index: value.current_question_index,
            question_start_time_ms: value.question_start_time_ms,
            question_ids: value.question_ids.clone(),
            players: value.players.values().map(Into::into).collect(),
            answers: value.answers.iter().map(Into::into).collect(),
            last_reveal: value.last_reveal.as_ref().map(Into::into),
            next_player_id: value.next_player_id,
            version: value.version,
            created_at_ms: value.created_at_ms,
            updated_at_ms: value.updated_at_ms,
            finished_at_ms: value.finished_at_ms,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings(max_players: u8, total_questions: u32) -> RoomSettings {
        RoomSettings {
            max_players,
            time_limit_seconds: 10,
            total_questions,
            game_mode: GameMode::Classic,
            category: "any".into(),
            difficulty: Difficulty::Mixed,
        }
    }

    pub(crate) fn room_with_guests(guests: usize) -> Room {
        let mut room = Room::new("ABCDEF".into(), settings(8, 3), "host".into(), "🦊".into(), 0);
        for n in 0..guests {
            room.add_player(format!("guest{n}"), "🐢".into(), 10 + n as u64);
        }
        room
    }

    #[test]
    fn new_room_has_single_host() {
        let room = room_with_guests(0);
        assert_eq!(room.host_id(), Some(FIRST_PLAYER_ID));
        assert_eq!(room.next_player_id, 2);
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.invariants_hold());
    }

    #[test]
    fn ids_are_never_reused() {
        let mut room = room_with_guests(2);
        room.remove_player(3);
        let id = room.add_player("late".into(), "🐙".into(), 99);
        assert_eq!(id, 4);
    }

    #[test]
    fn host_leaving_promotes_earliest_guest() {
        let mut room = room_with_guests(2);
        let (removed, promoted) = room.remove_player(FIRST_PLAYER_ID).unwrap();
        assert!(removed.is_host);
        assert_eq!(promoted, Some(2));
        assert_eq!(room.host_id(), Some(2));
        assert!(room.invariants_hold());
    }

    #[test]
    fn guest_leaving_keeps_host() {
        let mut room = room_with_guests(2);
        let (_, promoted) = room.remove_player(2).unwrap();
        assert_eq!(promoted, None);
        assert_eq!(room.host_id(), Some(FIRST_PLAYER_ID));
        assert!(room.remove_player(2).is_none());
    }

    #[test]
    fn capacity_counts_the_host() {
        let mut room = Room::new("ABCDEF".into(), settings(2, 1), "h".into(), "a".into(), 0);
        assert!(!room.is_full());
        room.add_player("g".into(), "b".into(), 1);
        assert!(room.is_full());
    }

    #[test]
    fn standings_share_ranks_on_ties() {
        let mut room = room_with_guests(3);
        room.players[0].score = 150;
        room.players[1].score = 200;
        room.players[2].score = 150;
        room.players[3].score = 10;

        let ranks: Vec<(PlayerId, u32)> = room
            .standings()
            .iter()
            .map(|s| (s.player_id, s.rank))
            .collect();
        assert_eq!(ranks, vec![(2, 1), (1, 2), (3, 2), (4, 4)]);
    }

    #[test]
    fn phase_is_derived_from_answers_and_deadline() {
        let mut room = room_with_guests(1);
        assert_eq!(room.question_phase(0), None);

        room.status = RoomStatus::Active;
        room.question_start_time_ms = Some(1_000);
        assert_eq!(
            room.question_phase(2_000),
            Some(QuestionPhase::CollectingAnswers)
        );
        assert_eq!(room.question_phase(11_000), Some(QuestionPhase::Revealing));

        for player in room.players.values_mut() {
            player.has_answered = true;
        }
        assert_eq!(room.question_phase(2_000), Some(QuestionPhase::Revealing));
    }

    #[test]
    fn reveal_pads_missing_answers() {
        let mut room = room_with_guests(1);
        room.status = RoomStatus::Active;
        room.question_start_time_ms = Some(0);
        room.record_answer(Answer {
            question_index: 0,
            player_id: 1,
            selected_option: Some(2),
            elapsed_ms: 500,
            client_elapsed_ms: Some(450),
            correct: true,
            points_awarded: 195,
        });

        let reveal = room.build_reveal("q1".into(), 2, 60_000);
        assert_eq!(reveal.results.len(), 2);
        assert_eq!(reveal.results[0].points_awarded, 195);
        let missing = &reveal.results[1];
        assert_eq!(missing.player_id, 2);
        assert_eq!(missing.selected_option, None);
        assert_eq!(missing.points_awarded, 0);
        assert_eq!(missing.elapsed_ms, 10_000);
        assert!(!room.players[1].has_answered);
    }

    #[test]
    fn entity_conversion_preserves_join_order() {
        let room = room_with_guests(3);
        let entity = RoomEntity::from(&room);
        let ids: Vec<u32> = entity.players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(Room::from(entity), room);
    }
}
