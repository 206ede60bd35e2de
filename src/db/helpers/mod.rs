use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::db::models::Role;
use crate::session::SessionStatus;

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_role(value: &str) -> Result<Role> {
    match value {
        "teacher" => Ok(Role::Teacher),
        "student" => Ok(Role::Student),
        other => Err(anyhow!("unknown role {other}")),
    }
}

pub fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "NotStarted" => Ok(SessionStatus::NotStarted),
        "InProgress" => Ok(SessionStatus::InProgress),
        "Completed" => Ok(SessionStatus::Completed),
        "Failed" => Ok(SessionStatus::Failed),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

/// Hex SHA-256 of `salt || password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_salt() {
        let a = hash_password("salt-a", "hunter2");
        let b = hash_password("salt-b", "hunter2");
        assert_ne!(a, b);
        assert_eq!(a, hash_password("salt-a", "hunter2"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SessionStatus::NotStarted,
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("Cancelled").is_err());
    }
}
