//! Settings and connection bootstrap for the MongoDB room store.

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::{info, warn};

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "retro_trivia";
const APP_NAME: &str = "retro-trivia-sync";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(4);

/// Where the room collection lives and how hard to try reaching it.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
    /// Pings attempted by [`MongoConfig::open`] before giving up.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse `uri` and fill in the client settings room traffic relies on.
    ///
    /// Room mutations run under a short per-call timeout, so server selection
    /// and connection setup are capped below it unless the URI says otherwise.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options.connect_timeout.get_or_insert(Duration::from_secs(2));
        options
            .server_selection_timeout
            .get_or_insert(Duration::from_secs(2));
        options.retry_writes.get_or_insert(true);

        Ok(Self {
            options,
            database_name: db_name.unwrap_or(DEFAULT_DATABASE).to_owned(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        })
    }

    /// Reads `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        let mut config = Self::from_uri(&uri, db.as_deref()).await?;
        if let Ok(raw) = std::env::var("MONGO_CONNECT_ATTEMPTS") {
            config.connect_attempts = parse_attempts(&raw)?;
        }
        Ok(config)
    }

    /// Build a client and wait until the room database answers a ping.
    pub(super) async fn open(&self) -> MongoResult<Database> {
        let client = Client::with_options(self.options.clone())
            .map_err(|source| MongoDaoError::ClientConstruction { source })?;
        let database = client.database(&self.database_name);
        let mut delay = FIRST_RETRY_DELAY;
        let mut attempt = 1;

        loop {
            match database.run_command(doc! { "ping": 1 }).await {
                Ok(_) => {
                    info!(database = %self.database_name, attempt, "room database reachable");
                    return Ok(database);
                }
                Err(source) if attempt >= self.connect_attempts => {
                    return Err(MongoDaoError::InitialPing {
                        attempts: attempt,
                        source,
                    });
                }
                Err(err) => {
                    warn!(database = %self.database_name, attempt, error = %err, "room database ping failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
            }
        }
    }
}

fn parse_attempts(raw: &str) -> MongoResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(attempts) if attempts > 0 => Ok(attempts),
        _ => Err(MongoDaoError::InvalidSetting {
            var: "MONGO_CONNECT_ATTEMPTS",
            value: raw.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fills_in_room_defaults() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(config.database_name, "retro_trivia");
        assert_eq!(config.options.app_name.as_deref(), Some("retro-trivia-sync"));
        assert_eq!(config.options.connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.connect_attempts, 5);
    }

    #[tokio::test]
    async fn uri_settings_win_over_defaults() {
        let config = MongoConfig::from_uri(
            "mongodb://localhost:27017/?appName=arcade&connectTimeoutMS=9000",
            Some("trivia_test"),
        )
        .await
        .unwrap();
        assert_eq!(config.database_name, "trivia_test");
        assert_eq!(config.options.app_name.as_deref(), Some("arcade"));
        assert_eq!(config.options.connect_timeout, Some(Duration::from_secs(9)));
    }

    #[test]
    fn connect_attempts_must_be_positive() {
        assert_eq!(parse_attempts(" 3 ").unwrap(), 3);
        assert!(parse_attempts("0").is_err());
        assert!(parse_attempts("many").is_err());
    }
}
