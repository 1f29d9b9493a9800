use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Profile, ProfileStore, ProfileUpdate, StoreError};
use crate::auth::Role;
use crate::config::DatabaseConfig;

const SELECT_PROFILE: &str = r#"
    SELECT id::text AS id, email, full_name, role::text AS role,
           avatar_url, phone, created_at, updated_at
    FROM profiles
"#;

/// `profiles` rows straight from the Postgres database behind the hosted service.
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL not configured".into()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await
            .map_err(map_sqlx)?;

        tracing::info!("Connected profile store to Postgres");
        Ok(Self { pool })
    }
}

/// Primary key for an identity id. Ids that are not UUIDs match no row.
fn profile_key(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("Profile {}", id))
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        id: row.try_get("id").map_err(map_sqlx)?,
        email: row.try_get("email").map_err(map_sqlx)?,
        full_name: row.try_get("full_name").map_err(map_sqlx)?,
        role: row.try_get("role").map_err(map_sqlx)?,
        avatar_url: row.try_get("avatar_url").map_err(map_sqlx)?,
        phone: row.try_get("phone").map_err(map_sqlx)?,
        created_at: row.try_get::<Option<DateTime<Utc>>, _>("created_at").map_err(map_sqlx)?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at").map_err(map_sqlx)?,
    })
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let Some(key) = profile_key(id) else {
            return Ok(None);
        };
        let query = format!("{} WHERE id = $1", SELECT_PROFILE);
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn create_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO profiles (id, email, full_name, role, created_at, updated_at)
            VALUES ($1::uuid, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .bind(&profile.role)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if inserted.rows_affected() == 0 {
            tracing::debug!("Profile {} already existed, keeping stored row", profile.id);
        }

        self.get_profile(&profile.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Profile {}", profile.id)))
    }

    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<Profile, StoreError> {
        let key = profile_key(id).ok_or_else(|| not_found(id))?;
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($2, full_name),
                avatar_url = COALESCE($3, avatar_url),
                phone = COALESCE($4, phone),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(key)
        .bind(&update.full_name)
        .bind(&update.avatar_url)
        .bind(&update.phone)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        self.get_profile(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn set_role(&self, id: &str, role: Role) -> Result<Profile, StoreError> {
        let key = profile_key(id).ok_or_else(|| not_found(id))?;
        let result = sqlx::query("UPDATE profiles SET role = $2, updated_at = now() WHERE id = $1")
            .bind(key)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        self.get_profile(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let query = format!("{} ORDER BY created_at DESC", SELECT_PROFILE);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_key_accepts_only_uuids() {
        let key = profile_key("6f1c2a4e-9d55-4c3b-8f0e-1b2a3c4d5e6f").unwrap();
        assert_eq!(key.to_string(), "6f1c2a4e-9d55-4c3b-8f0e-1b2a3c4d5e6f");
        assert!(profile_key("user-42").is_none());
        assert!(profile_key("").is_none());
    }
}
