//! Application-level configuration loading: scoring constants, room limits and
//! the built-in question bank.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{dao::question_bank::Question, state::room::Difficulty};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RETRO_TRIVIA_CONFIG_PATH";

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub rooms: RoomsConfig,
    pub questions: QuestionsConfig,
}

/// Constants of the time-bonus scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_score: u32,
    pub time_bonus_multiplier: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 100,
            time_bonus_multiplier: 1.0,
        }
    }
}

/// Room limits and background housekeeping settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    /// Players (host included) required before the host may start.
    pub min_players_to_start: usize,
    pub code_length: usize,
    /// Fresh codes tried before room creation gives up.
    pub max_code_attempts: u32,
    /// Upper bound for a single store round trip.
    pub mutation_timeout_ms: u64,
    /// Compare-and-swap attempts before a mutation reports contention.
    pub max_mutation_attempts: u32,
    pub retention_secs: u64,
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    /// Buffered events per room before slow SSE subscribers lag.
    pub sse_capacity: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            min_players_to_start: 2,
            code_length: 6,
            max_code_attempts: 16,
            mutation_timeout_ms: 5_000,
            max_mutation_attempts: 8,
            retention_secs: 30 * 60,
            idle_timeout_secs: 2 * 60 * 60,
            reap_interval_secs: 60,
            sse_capacity: 16,
        }
    }
}

impl RoomsConfig {
    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// Question bank contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct QuestionsConfig(pub Vec<Question>);

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self(default_questions())
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        questions = config.questions.0.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn q(
    id: &str,
    category: &str,
    difficulty: Difficulty,
    prompt: &str,
    options: [&str; 4],
    correct_option: u8,
) -> Question {
    Question {
        id: id.to_owned(),
        prompt: prompt.to_owned(),
        options: options.iter().map(|option| (*option).to_owned()).collect(),
        correct_option,
        category: category.to_owned(),
        difficulty,
    }
}

/// Built-in sample bank shipped with the binary.
fn default_questions() -> Vec<Question> {
    use Difficulty::{Easy, Hard, Medium};

    vec![
        q(
            "retro-001",
            "video_games",
            Easy,
            "Which company created the Game Boy?",
            ["Sega", "Nintendo", "Atari", "Sony"],
            1,
        ),
        q(
            "retro-002",
            "video_games",
            Easy,
            "What colour is Pac-Man?",
            ["Yellow", "Red", "Blue", "Green"],
            0,
        ),
        q(
            "retro-003",
            "video_games",
            Medium,
            "In which year was the original Tetris released?",
            ["1979", "1984", "1989", "1991"],
            1,
        ),
        q(
            "retro-004",
            "video_games",
            Medium,
            "Which console introduced Sonic the Hedgehog?",
            ["Master System", "Mega Drive", "Saturn", "Game Gear"],
            1,
        ),
        q(
            "retro-005",
            "video_games",
            Hard,
            "What was the codename of the Nintendo 64 during development?",
            ["Project Reality", "Dolphin", "Revolution", "Ultra Famicom"],
            0,
        ),
        q(
            "retro-006",
            "video_games",
            Hard,
            "Which CPU powered the Atari 2600?",
            ["Zilog Z80", "MOS 6507", "Motorola 68000", "Intel 8088"],
            1,
        ),
        q(
            "retro-007",
            "music",
            Easy,
            "Which band released the album 'Thriller'?",
            ["Queen", "Michael Jackson", "ABBA", "Prince"],
            1,
        ),
        q(
            "retro-008",
            "music",
            Medium,
            "Which synthesizer is famous for the sound of 80s synth-pop?",
            ["Yamaha DX7", "Moog Minimoog", "Roland TB-303", "Mellotron"],
            0,
        ),
        q(
            "retro-009",
            "music",
            Hard,
            "Which format did Philips and Sony launch together in 1982?",
            ["MiniDisc", "Compact Disc", "DAT", "Laserdisc"],
            1,
        ),
        q(
            "retro-010",
            "movies",
            Easy,
            "Which movie features the DeLorean time machine?",
            ["Tron", "Back to the Future", "WarGames", "Ghostbusters"],
            1,
        ),
        q(
            "retro-011",
            "movies",
            Medium,
            "Which film was the first to use extensive computer graphics in 1982?",
            ["Tron", "Blade Runner", "The Last Starfighter", "E.T."],
            0,
        ),
        q(
            "retro-012",
            "movies",
            Hard,
            "Who directed 'Blade Runner' (1982)?",
            ["James Cameron", "Ridley Scott", "John Carpenter", "Steven Spielberg"],
            1,
        ),
        q(
            "retro-013",
            "computers",
            Easy,
            "What does 'RAM' stand for?",
            [
                "Read Access Memory",
                "Random Access Memory",
                "Rapid Array Module",
                "Run Any Machine",
            ],
            1,
        ),
        q(
            "retro-014",
            "computers",
            Medium,
            "Which home computer was the best-selling single model of all time?",
            ["ZX Spectrum", "Commodore 64", "Apple II", "Amiga 500"],
            1,
        ),
        q(
            "retro-015",
            "computers",
            Hard,
            "How many kilobytes of RAM did the original IBM PC ship with at minimum?",
            ["16", "64", "128", "640"],
            0,
        ),
        q(
            "retro-016",
            "computers",
            Easy,
            "Which company made the Macintosh?",
            ["IBM", "Apple", "Commodore", "Atari"],
            1,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "rooms": { "code_length": 4 } }"#).unwrap();
        assert_eq!(config.rooms.code_length, 4);
        assert_eq!(config.rooms.min_players_to_start, 2);
        assert_eq!(config.scoring, ScoringConfig::default());
        assert!(!config.questions.0.is_empty());
    }

    #[test]
    fn built_in_questions_are_well_formed() {
        let questions = default_questions();
        for question in &questions {
            assert!(usize::from(question.correct_option) < question.options.len());
        }
        let mut ids: Vec<_> = questions.iter().map(|q| q.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), questions.len());
    }
}
