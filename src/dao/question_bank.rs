//! Question bank collaborator: supplies ordered questions with their answer key.
//!
//! Rooms only persist question ids; the answer key never leaves the bank
//! except to score an answer or build a reveal.

use std::sync::Arc;

use futures::future::BoxFuture;
use rand::{rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::room::Difficulty;

/// Category matching every question.
pub const ANY_CATEGORY: &str = "any";

/// Multiple-choice question including its answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options` of the right answer.
    pub correct_option: u8,
    pub category: String,
    pub difficulty: Difficulty,
}

impl Question {
    fn matches(&self, category: &str, difficulty: Difficulty) -> bool {
        let category_ok = category.eq_ignore_ascii_case(ANY_CATEGORY)
            || self.category.eq_ignore_ascii_case(category);
        category_ok && difficulty.accepts(self.difficulty)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuestionBankError {
    #[error("question bank holds {available} matching question(s), {requested} requested")]
    Insufficient { requested: usize, available: usize },
    #[error("unknown question `{0}`")]
    UnknownQuestion(String),
    #[error("question bank unavailable: {0}")]
    Unavailable(String),
}

/// Source of questions consumed when a game starts and when answers are scored.
pub trait QuestionBank: Send + Sync {
    /// Draw `count` distinct questions for the category and difficulty.
    fn draw(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> BoxFuture<'static, Result<Vec<Question>, QuestionBankError>>;

    /// Look a question up by id.
    fn find(&self, id: &str) -> BoxFuture<'static, Result<Question, QuestionBankError>>;

    /// Number of questions that could be drawn for the category and difficulty.
    fn available(
        &self,
        category: &str,
        difficulty: Difficulty,
    ) -> BoxFuture<'static, Result<usize, QuestionBankError>>;
}

/// Bank serving a fixed list of questions loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticQuestionBank {
    questions: Arc<Vec<Question>>,
}

impl StaticQuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: Arc::new(questions),
        }
    }

    fn matching(&self, category: &str, difficulty: Difficulty) -> Vec<&Question> {
        self.questions
            .iter()
            .filter(|question| question.matches(category, difficulty))
            .collect()
    }
}

impl QuestionBank for StaticQuestionBank {
    fn draw(
        &self,
        category: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> BoxFuture<'static, Result<Vec<Question>, QuestionBankError>> {
        let mut candidates = self.matching(category, difficulty);
        let result = if candidates.len() < count {
            Err(QuestionBankError::Insufficient {
                requested: count,
                available: candidates.len(),
            })
        } else {
            candidates.shuffle(&mut rng());
            Ok(candidates.into_iter().take(count).cloned().collect())
        };
        Box::pin(async move { result })
    }

    fn find(&self, id: &str) -> BoxFuture<'static, Result<Question, QuestionBankError>> {
        let result = self
            .questions
            .iter()
            .find(|question| question.id == id)
            .cloned()
            .ok_or_else(|| QuestionBankError::UnknownQuestion(id.to_owned()));
        Box::pin(async move { result })
    }

    fn available(
        &self,
        category: &str,
        difficulty: Difficulty,
    ) -> BoxFuture<'static, Result<usize, QuestionBankError>> {
        let count = self.matching(category, difficulty).len();
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn question(id: &str, category: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.into(),
            prompt: format!("prompt {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option: 1,
            category: category.into(),
            difficulty,
        }
    }

    fn bank() -> StaticQuestionBank {
        StaticQuestionBank::new(vec![
            question("q1", "games", Difficulty::Easy),
            question("q2", "games", Difficulty::Hard),
            question("q3", "Music", Difficulty::Easy),
            question("q4", "games", Difficulty::Easy),
        ])
    }

    #[tokio::test]
    async fn draw_filters_by_category_and_difficulty() {
        let drawn = bank().draw("GAMES", Difficulty::Easy, 2).await.unwrap();
        let ids: HashSet<_> = drawn.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["q1", "q4"]));
    }

    #[tokio::test]
    async fn any_and_mixed_match_everything() {
        assert_eq!(bank().available("any", Difficulty::Mixed).await.unwrap(), 4);
        assert_eq!(bank().available("games", Difficulty::Mixed).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn draw_reports_shortage() {
        let err = bank().draw("music", Difficulty::Easy, 2).await.unwrap_err();
        assert_eq!(
            err,
            QuestionBankError::Insufficient {
                requested: 2,
                available: 1
            }
        );
    }

    #[tokio::test]
    async fn find_by_id() {
        assert_eq!(bank().find("q3").await.unwrap().category, "Music");
        assert!(matches!(
            bank().find("nope").await,
            Err(QuestionBankError::UnknownQuestion(_))
        ));
    }
}
