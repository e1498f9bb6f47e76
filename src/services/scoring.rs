//! Time-bonus scoring engine.
//!
//! `points = round(base * (1 + bonus))` for a correct answer inside the window,
//! with `bonus = clamp((limit - elapsed) / limit, 0, 1) * multiplier`.
//! Wrong answers, missing answers and answers at or after the deadline score 0.

use crate::config::ScoringConfig;

/// Constants of the scoring formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRules {
    pub base_score: u32,
    pub time_bonus_multiplier: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringConfig::default().into()
    }
}

impl From<ScoringConfig> for ScoringRules {
    fn from(value: ScoringConfig) -> Self {
        Self {
            base_score: value.base_score,
            time_bonus_multiplier: value.time_bonus_multiplier.max(0.0),
        }
    }
}

impl ScoringRules {
    /// Fraction of the window left when the answer arrived, scaled by the multiplier.
    pub fn time_bonus(&self, elapsed_ms: u64, time_limit_seconds: u32) -> f64 {
        let limit_ms = u64::from(time_limit_seconds) * 1_000;
        if limit_ms == 0 {
            return 0.0;
        }
        let remaining = limit_ms.saturating_sub(elapsed_ms) as f64 / limit_ms as f64;
        remaining.clamp(0.0, 1.0) * self.time_bonus_multiplier
    }

    /// Points awarded for one answer. Pure and deterministic.
    pub fn score(&self, is_correct: bool, elapsed_ms: u64, time_limit_seconds: u32) -> u32 {
        let limit_ms = u64::from(time_limit_seconds) * 1_000;
        if !is_correct || elapsed_ms >= limit_ms {
            return 0;
        }

        let bonus = self.time_bonus(elapsed_ms, time_limit_seconds);
        let points = (f64::from(self.base_score) * (1.0 + bonus)).round();
        points.min(f64::from(u32::MAX)) as u32
    }
}

/// Score with the default constants.
pub fn score(is_correct: bool, elapsed_ms: u64, time_limit_seconds: u32) -> u32 {
    ScoringRules::default().score(is_correct, elapsed_ms, time_limit_seconds)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn wrong_answers_score_nothing() {
        assert_eq!(score(false, 0, 10), 0);
        assert_eq!(score(false, 9_999, 10), 0);
    }

    #[test]
    fn instant_answer_doubles_base() {
        assert_eq!(score(true, 0, 10), 200);
    }

    #[test]
    fn bonus_decays_linearly() {
        assert_eq!(score(true, 2_000, 10), 180);
        assert_eq!(score(true, 8_000, 10), 120);
        assert_eq!(score(true, 5_000, 10), 150);
    }

    #[test]
    fn deadline_is_the_floor() {
        assert_eq!(score(true, 10_000, 10), 0);
        assert_eq!(score(true, 60_000, 10), 0);
        assert_eq!(score(true, 9_999, 10), 100);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        let rules = ScoringRules {
            base_score: 1,
            time_bonus_multiplier: 1.0,
        };
        // 1 * (1 + 0.5) = 1.5 -> 2
        assert_eq!(rules.score(true, 5_000, 10), 2);
    }

    #[test]
    fn multiplier_scales_bonus() {
        let rules = ScoringRules {
            base_score: 100,
            time_bonus_multiplier: 0.5,
        };
        assert_eq!(rules.score(true, 0, 10), 150);
        assert_eq!(rules.time_bonus(5_000, 10), 0.25);
    }

    #[test]
    fn zero_time_limit_never_awards_points() {
        assert_eq!(score(true, 0, 0), 0);
    }

    #[test]
    fn faster_is_never_worse() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..2_000 {
            let limit = rng.random_range(1..=120u32);
            let a = rng.random_range(0..=u64::from(limit) * 1_200);
            let b = rng.random_range(0..=u64::from(limit) * 1_200);
            let (fast, slow) = if a <= b { (a, b) } else { (b, a) };
            assert!(score(true, fast, limit) >= score(true, slow, limit));
            assert_eq!(score(true, fast, limit), score(true, fast, limit));
        }
    }
}
