pub mod db;

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Deserializer};
use tokio::task::JoinError;

/// Reads an optional ISO-8601 timestamp with offset and normalizes it to UTC.
/// Absent and `null` both map to `None`.
pub fn deserialize_optional_utc<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_utc(&s).map_err(serde::de::Error::custom))
        .transpose()
}

pub fn parse_utc(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s.trim()).map(|t| t.with_timezone(&Utc))
}

/// Logs a background task that ended abnormally. Returns whether it ended
/// cleanly.
pub fn log_join(task: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!(task = task; "Task panicked: {}", e);
            false
        }
        Err(e) => {
            warn!(task = task; "Task did not finish: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_panicked_tasks() {
        let clean = tokio::spawn(async {});
        assert!(log_join("clean", clean.await));

        let panicked = tokio::spawn(async { panic!("event loop blew up") });
        assert!(!log_join("event loop", panicked.await));

        let aborted = tokio::spawn(std::future::pending::<()>());
        aborted.abort();
        assert!(!log_join("api", aborted.await));
    }
}
