use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{hash_password, parse_datetime, parse_role},
    models::{Identity, Role},
};
use crate::stores::IdentityStore;

fn row_to_identity(row: &Row) -> Result<Identity> {
    let role: String = row.get("role")?;
    let created_at: String = row.get("created_at")?;

    Ok(Identity {
        id: row.get("id")?,
        username: row.get("username")?,
        role: parse_role(&role)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_identity(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity> {
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            username: username.trim().to_string(),
            role,
            created_at: Utc::now(),
        };
        let salt = Uuid::new_v4().simple().to_string();
        let hash = hash_password(&salt, password);
        let record = identity.clone();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO identities (id, username, password_salt, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.username,
                    salt,
                    hash,
                    record.role.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to create identity {}", record.username))?;
            Ok(())
        })
        .await?;

        Ok(identity)
    }

    pub async fn find_identity(&self, username: &str, password: &str) -> Result<Option<Identity>> {
        let username = username.trim().to_string();
        let password = password.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password_salt, password_hash, role, created_at
                 FROM identities
                 WHERE username = ?1",
            )?;
            let found = stmt
                .query_row(params![username], |row| {
                    let salt: String = row.get("password_salt")?;
                    let hash: String = row.get("password_hash")?;
                    Ok((salt, hash, row_to_identity(row)))
                })
                .optional()?;

            match found {
                Some((salt, hash, identity)) if hash_password(&salt, &password) == hash => {
                    identity.map(Some)
                }
                _ => Ok(None),
            }
        })
        .await
    }
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_by_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>> {
        self.find_identity(username, password).await
    }

    async fn create(&self, username: &str, password: &str, role: Role) -> Result<Identity> {
        self.insert_identity(username, password, role).await
    }
}
