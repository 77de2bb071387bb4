use async_trait::async_trait;
use sqlx::PgPool;

use crate::config::Config;
use crate::models::{Credential, CredentialUpsert};
use crate::{crypto, Result};

/// Storage boundary for spotify credential records. Lookup and upsert
/// are both keyed by the unique `spotify_id`; the trait deals in
/// plaintext tokens and implementations decide how they rest.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_spotify_id(&self, spotify_id: &str) -> Result<Option<Credential>>;
    async fn find_by_user(&self, user_id: i64) -> Result<Option<Credential>>;
    async fn upsert(&self, upsert: &CredentialUpsert) -> Result<Credential>;
}

#[derive(sqlx::FromRow, Debug)]
struct CredentialRow {
    user_id: i64,
    spotify_id: String,
    // aes-256-gcm encrypted + hex encoded, alongside the hex encoded
    // nonce each value was sealed with
    access_token: String,
    access_nonce: String,
    refresh_token: String,
    refresh_nonce: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Postgres-backed credential store. Tokens are encrypted with the
/// application key before they hit the table.
pub struct PgStore {
    pool: PgPool,
    enc_key: String,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            enc_key: config.enc_key.clone(),
        }
    }

    fn decrypt_row(&self, row: CredentialRow) -> Result<Credential> {
        let access_token = crypto::decrypt(
            &crypto::Enc {
                value: row.access_token,
                nonce: row.access_nonce,
            },
            &self.enc_key,
        )?;
        let refresh_token = crypto::decrypt(
            &crypto::Enc {
                value: row.refresh_token,
                nonce: row.refresh_nonce,
            },
            &self.enc_key,
        )?;
        Ok(Credential {
            user_id: row.user_id,
            spotify_id: row.spotify_id,
            access_token,
            refresh_token,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_spotify_id(&self, spotify_id: &str) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "
            select user_id, spotify_id,
                   access_token, access_nonce,
                   refresh_token, refresh_nonce,
                   expires_at
            from spotify_tokens
            where spotify_id = $1
            ",
        )
        .bind(spotify_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| self.decrypt_row(r)).transpose()
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "
            select user_id, spotify_id,
                   access_token, access_nonce,
                   refresh_token, refresh_nonce,
                   expires_at
            from spotify_tokens
            where user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| self.decrypt_row(r)).transpose()
    }

    async fn upsert(&self, upsert: &CredentialUpsert) -> Result<Credential> {
        let access = crypto::encrypt(&upsert.access_token, &self.enc_key)?;
        let refresh = crypto::encrypt(&upsert.refresh_token, &self.enc_key)?;
        // user_id is intentionally left untouched on conflict: when two
        // first-time logins for the same spotify account race, the
        // identity that won the initial insert keeps the record and the
        // loser's tokens simply overwrite. A single statement keeps the
        // lookup-or-create window inside one transactional boundary.
        let row = sqlx::query_as::<_, CredentialRow>(
            "
            insert into
            spotify_tokens (
                user_id, spotify_id,
                access_token, access_nonce,
                refresh_token, refresh_nonce,
                expires_at
            )
            values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (spotify_id) do update set
            access_token = excluded.access_token, access_nonce = excluded.access_nonce,
            refresh_token = excluded.refresh_token, refresh_nonce = excluded.refresh_nonce,
            expires_at = excluded.expires_at,
            modified = now()
            returning user_id, spotify_id,
                      access_token, access_nonce,
                      refresh_token, refresh_nonce,
                      expires_at
            ",
        )
        .bind(upsert.user_id)
        .bind(&upsert.spotify_id)
        .bind(&access.value)
        .bind(&access.nonce)
        .bind(&refresh.value)
        .bind(&refresh.nonce)
        .bind(upsert.expires_at)
        .fetch_one(&self.pool)
        .await?;
        self.decrypt_row(row)
    }
}
